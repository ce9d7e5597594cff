//! Koma core: pure domain logic for manga panel sequence validation.
//!
//! Contains the panel input types, versioned thresholds, the pairwise
//! visual analyzer, and the emotion/pose fingerprint matchers. Nothing in
//! this crate performs network I/O; judge calls live in `koma-judge`.

pub mod error;
pub mod fingerprint;
pub mod issues;
pub mod scores;
pub mod thresholds;
pub mod types;
pub mod visual;

pub use error::CoreError;
pub use thresholds::{ValidationConfig, THRESHOLDS_VERSION};
pub use types::{Artifact, PanelEntry, PanelSequence, SceneMetadata};
