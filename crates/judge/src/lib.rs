//! External judge gateway.
//!
//! Wraps local and hosted model endpoints behind one contract: an ordered
//! chain of [`JudgeBackend`] strategies tried with bounded retry and
//! backoff, hosted credential rotation on rate limits, and a two-stage
//! response decoder. The gateway never returns an error to its caller;
//! exhaustion is reported as [`JudgeOutcome::Unavailable`].

pub mod api;
pub mod backend;
pub mod config;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod judgments;
pub mod prompts;
pub mod retry;
pub mod rotation;

pub use backend::{BackendKind, Capability, JudgeBackend, JudgeImage, JudgeRequest};
pub use config::JudgeConfig;
pub use decode::DecodeStage;
pub use error::BackendError;
pub use gateway::{JudgeGateway, JudgeOutcome, UnavailableReason};
pub use retry::RetryPolicy;
pub use rotation::JudgeRotation;
