//! Versioned validation thresholds.
//!
//! Every cutoff the analyzers, aggregator, and orchestrator compare against
//! lives in [`ValidationConfig`]. Bump [`THRESHOLDS_VERSION`] whenever a
//! default changes so persisted reports can be traced to the values that
//! produced them.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Version tag written into every report.
pub const THRESHOLDS_VERSION: &str = "2026.1";

/// Smallest allowed window length.
pub const MIN_WINDOW_LENGTH: usize = 3;
/// Largest allowed window length.
pub const MAX_WINDOW_LENGTH: usize = 5;
/// Default window length.
pub const DEFAULT_WINDOW_LENGTH: usize = 3;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Configuration` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Configuration(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate a window length against `[MIN_WINDOW_LENGTH, MAX_WINDOW_LENGTH]`.
pub fn validate_window_length(length: usize) -> Result<(), CoreError> {
    if !(MIN_WINDOW_LENGTH..=MAX_WINDOW_LENGTH).contains(&length) {
        return Err(CoreError::Configuration(format!(
            "window_length must be between {MIN_WINDOW_LENGTH} and {MAX_WINDOW_LENGTH}, got {length}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BandCutoffs
// ---------------------------------------------------------------------------

/// Lower bounds of the excellent / good / fair assessment bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BandCutoffs {
    #[validate(range(min = 0.0, max = 1.0))]
    pub excellent: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub good: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub fair: f64,
}

impl Default for BandCutoffs {
    fn default() -> Self {
        Self {
            excellent: 0.8,
            good: 0.6,
            fair: 0.4,
        }
    }
}

// ---------------------------------------------------------------------------
// VisualThresholds
// ---------------------------------------------------------------------------

/// Cutoffs used by the pairwise visual analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VisualThresholds {
    /// A pair is an abrupt scene change when SSIM is below this...
    #[validate(range(min = 0.0, max = 1.0))]
    pub abrupt_ssim: f64,
    /// ...and histogram correlation is below this.
    #[validate(range(min = 0.0, max = 1.0))]
    pub abrupt_histogram: f64,
    /// Maximum mean-luma delta (0-255 scale) for consistent lighting.
    #[validate(range(min = 0.0, max = 255.0))]
    pub lighting_max_luma_delta: f64,
    /// Minimum luma-histogram correlation for consistent lighting.
    #[validate(range(min = 0.0, max = 1.0))]
    pub lighting_min_correlation: f64,
    /// SSIM below this counts as a degenerate, near-zero similarity.
    #[validate(range(min = 0.0, max = 1.0))]
    pub near_zero_similarity: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub default_confidence: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub degenerate_confidence: f64,
}

impl Default for VisualThresholds {
    fn default() -> Self {
        Self {
            abrupt_ssim: 0.3,
            abrupt_histogram: 0.5,
            lighting_max_luma_delta: 30.0,
            lighting_min_correlation: 0.7,
            near_zero_similarity: 0.05,
            default_confidence: 0.8,
            degenerate_confidence: 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationConfig
// ---------------------------------------------------------------------------

/// All tunable thresholds for one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ValidationConfig {
    /// Number of consecutive panels per coherence window.
    #[validate(range(min = 3, max = 5))]
    pub window_length: usize,
    /// Weight of the judge score in a window composite; the local visual
    /// score gets the remainder.
    #[validate(range(min = 0.0, max = 1.0))]
    pub window_judge_weight: f64,
    /// Weight of the sequence score in the run verdict; the thread score
    /// gets the remainder.
    #[validate(range(min = 0.0, max = 1.0))]
    pub run_sequence_weight: f64,
    /// Minimum overall confidence for a fingerprint match to pass.
    #[validate(range(min = 0.0, max = 1.0))]
    pub fingerprint_pass_threshold: f64,
    /// Overall or thread scores below this request human review.
    #[validate(range(min = 0.0, max = 1.0))]
    pub human_review_threshold: f64,
    /// Window composites below this are reported as low scoring.
    #[validate(range(min = 0.0, max = 1.0))]
    pub low_window_threshold: f64,
    #[validate(nested)]
    pub visual: VisualThresholds,
    #[validate(nested)]
    pub bands: BandCutoffs,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            window_judge_weight: 0.6,
            run_sequence_weight: 0.6,
            fingerprint_pass_threshold: 0.7,
            human_review_threshold: 0.6,
            low_window_threshold: 0.5,
            visual: VisualThresholds::default(),
            bands: BandCutoffs::default(),
        }
    }
}

impl ValidationConfig {
    /// Weight of the local visual score in a window composite.
    pub fn window_visual_weight(&self) -> f64 {
        1.0 - self.window_judge_weight
    }

    /// Weight of the thread score in the run verdict.
    pub fn run_thread_weight(&self) -> f64 {
        1.0 - self.run_sequence_weight
    }

    /// Check field ranges and cross-field ordering.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Configuration(format!("invalid thresholds: {e}")))?;

        if !(self.bands.excellent >= self.bands.good && self.bands.good >= self.bands.fair) {
            return Err(CoreError::Configuration(format!(
                "band cutoffs must be descending, got excellent={} good={} fair={}",
                self.bands.excellent, self.bands.good, self.bands.fair
            )));
        }
        if self.visual.degenerate_confidence > self.visual.default_confidence {
            return Err(CoreError::Configuration(
                "degenerate_confidence must not exceed default_confidence".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
