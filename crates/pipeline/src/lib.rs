//! Coherence validation pipeline.
//!
//! Drives one validation run over a panel sequence: overlapping windows
//! scored from pairwise visual metrics and a multimodal judge, narrative
//! thread analyses over the sequence metadata, per-panel fingerprint
//! checks, and a persisted run report.

pub mod aggregator;
pub mod orchestrator;
pub mod report;
pub mod thread;
pub mod verdict;
pub mod window;

pub use aggregator::{SequenceAggregator, SequenceAssessment};
pub use orchestrator::ValidationOrchestrator;
pub use report::{PersistedReport, ReportError, ValidationReport};
pub use thread::NarrativeThreadTracker;
pub use verdict::{CoherenceVerdict, Recommendation, RecommendationCategory, ThreadReport, WindowResult};
pub use window::{build_windows, Window};
