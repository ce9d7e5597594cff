//! Pairwise visual consistency analysis.
//!
//! Each submodule computes one continuity signal; [`analyzer`] combines them
//! into a [`PairAnalysis`].

pub mod analyzer;
pub mod histogram;
pub mod lighting;
pub mod loader;
pub mod phash;
pub mod presence;
pub mod structural;

pub use analyzer::{is_abrupt_scene_change, PairAnalysis, VisualAnalyzer};
pub use loader::{load_image, ImageLoadError};
pub use phash::{DctHasher, PerceptualHasher};
pub use presence::{FeatureDetector, Region, SkinToneDetector};
