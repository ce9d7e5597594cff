//! Pairwise visual continuity between two adjacent panels.
//!
//! [`VisualAnalyzer`] holds only configuration and shared, immutable
//! capabilities, so one instance can be used from any number of threads.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::issues::{Issue, IssueCategory};
use crate::scores::{clamp_unit, NEUTRAL_SCORE};
use crate::thresholds::VisualThresholds;
use crate::visual::histogram::histogram_correlation;
use crate::visual::lighting::{compare_lighting, LightingComparison};
use crate::visual::loader::{common_grayscale, load_image};
use crate::visual::phash::{perceptual_similarity, DctHasher, PerceptualHasher};
use crate::visual::presence::{
    FeatureDetector, PresenceComparison, PresenceObservation, SkinToneDetector,
};
use crate::visual::structural::{structural_similarity, StructuralMethod};

/// Weight of each metric in [`PairAnalysis::continuity_score`].
const WEIGHT_SSIM: f64 = 0.35;
const WEIGHT_HISTOGRAM: f64 = 0.25;
const WEIGHT_PERCEPTUAL: f64 = 0.25;
const WEIGHT_LIGHTING: f64 = 0.15;
/// Deducted from the continuity score when character presence flips.
const PRESENCE_CHANGE_PENALTY: f64 = 0.1;

/// Abrupt scene change: both structural and color similarity collapsed.
pub fn is_abrupt_scene_change(ssim: f64, histogram_correlation: f64, t: &VisualThresholds) -> bool {
    ssim < t.abrupt_ssim && histogram_correlation < t.abrupt_histogram
}

// ---------------------------------------------------------------------------
// PairAnalysis
// ---------------------------------------------------------------------------

/// Continuity metrics for one adjacent pair. All scores are in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalysis {
    pub ssim: f64,
    pub structural_method: StructuralMethod,
    pub histogram_correlation: f64,
    pub perceptual_similarity: f64,
    pub lighting_consistency: bool,
    /// `None` when the images could not be compared.
    pub lighting: Option<LightingComparison>,
    pub character_presence_delta: f64,
    /// `None` when no detector is configured or the images could not be loaded.
    pub character_presence: Option<PresenceComparison>,
    pub abrupt_scene_change: bool,
    pub confidence: f64,
    pub issues: Vec<Issue>,
}

impl PairAnalysis {
    /// Lowest-confidence result for a pair whose images could not be read.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            ssim: NEUTRAL_SCORE,
            structural_method: StructuralMethod::Neutral,
            histogram_correlation: NEUTRAL_SCORE,
            perceptual_similarity: NEUTRAL_SCORE,
            lighting_consistency: false,
            lighting: None,
            character_presence_delta: 0.0,
            character_presence: None,
            abrupt_scene_change: false,
            confidence: 0.0,
            issues: vec![Issue::new(IssueCategory::ImageUnavailable, reason)],
        }
    }

    /// Whether this pair carries no usable signal.
    pub fn is_unavailable(&self) -> bool {
        self.confidence <= 0.0
    }

    pub fn presence_changed(&self) -> bool {
        self.character_presence
            .is_some_and(|p| p.presence_changed)
    }

    /// Single continuity score in `[0, 1]` blending every metric.
    pub fn continuity_score(&self) -> f64 {
        let lighting = if self.lighting_consistency { 1.0 } else { 0.0 };
        let mut score = WEIGHT_SSIM * self.ssim
            + WEIGHT_HISTOGRAM * self.histogram_correlation
            + WEIGHT_PERCEPTUAL * self.perceptual_similarity
            + WEIGHT_LIGHTING * lighting;
        if self.presence_changed() {
            score -= PRESENCE_CHANGE_PENALTY;
        }
        clamp_unit(score)
    }
}

// ---------------------------------------------------------------------------
// VisualAnalyzer
// ---------------------------------------------------------------------------

/// Stateless pairwise visual continuity analyzer.
#[derive(Clone)]
pub struct VisualAnalyzer {
    thresholds: VisualThresholds,
    hasher: Option<Arc<dyn PerceptualHasher>>,
    detector: Option<Arc<dyn FeatureDetector>>,
}

impl Default for VisualAnalyzer {
    fn default() -> Self {
        Self::new(VisualThresholds::default())
    }
}

impl VisualAnalyzer {
    /// Analyzer with the built-in DCT hasher and skin-tone detector.
    pub fn new(thresholds: VisualThresholds) -> Self {
        Self {
            thresholds,
            hasher: Some(Arc::new(DctHasher)),
            detector: Some(Arc::new(SkinToneDetector::default())),
        }
    }

    /// Replace (or remove) the perceptual hasher.
    pub fn with_hasher(mut self, hasher: Option<Arc<dyn PerceptualHasher>>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace (or remove) the character feature detector.
    pub fn with_detector(mut self, detector: Option<Arc<dyn FeatureDetector>>) -> Self {
        self.detector = detector;
        self
    }

    pub fn thresholds(&self) -> &VisualThresholds {
        &self.thresholds
    }

    /// Load and compare two images. Never fails: unreadable images produce
    /// [`PairAnalysis::unavailable`].
    pub fn analyze(&self, first: &Path, second: &Path) -> PairAnalysis {
        let a = match load_image(first) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %first.display(), error = %e, "Could not load panel image");
                return PairAnalysis::unavailable(format!("could not load image: {e}"));
            }
        };
        let b = match load_image(second) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %second.display(), error = %e, "Could not load panel image");
                return PairAnalysis::unavailable(format!("could not load image: {e}"));
            }
        };
        self.analyze_images(&a, &b)
    }

    /// Compare two decoded images.
    pub fn analyze_images(&self, a: &DynamicImage, b: &DynamicImage) -> PairAnalysis {
        let t = &self.thresholds;

        let (gray_a, gray_b) = common_grayscale(a, b);
        let structural = structural_similarity(&gray_a, &gray_b);

        let rgb_a = a.to_rgb8();
        let rgb_b = b.to_rgb8();
        let histogram = histogram_correlation(&rgb_a, &rgb_b);
        let perceptual = perceptual_similarity(self.hasher.as_deref(), a, b);
        let lighting = compare_lighting(&rgb_a, &rgb_b, t);

        let presence = self.detector.as_deref().map(|d| {
            PresenceComparison::new(
                PresenceObservation::from_regions(&d.detect(a)),
                PresenceObservation::from_regions(&d.detect(b)),
            )
        });

        let abrupt = is_abrupt_scene_change(structural.value, histogram, t);
        let confidence = if structural.value < t.near_zero_similarity {
            t.degenerate_confidence
        } else {
            t.default_confidence
        };

        let mut issues = Vec::new();
        if abrupt {
            issues.push(Issue::new(
                IssueCategory::AbruptSceneChange,
                format!(
                    "abrupt scene change (ssim {:.2}, histogram {:.2})",
                    structural.value, histogram
                ),
            ));
        }
        if let Some(p) = presence.filter(|p| p.presence_changed) {
            issues.push(Issue::new(
                IssueCategory::CharacterPresenceChange,
                format!(
                    "character presence changed ({} -> {} regions)",
                    p.first.region_count, p.second.region_count
                ),
            ));
        }
        if !lighting.consistent {
            issues.push(Issue::new(
                IssueCategory::LightingInconsistency,
                format!(
                    "lighting shift (luma delta {:.1}, correlation {:.2})",
                    lighting.mean_luma_delta, lighting.luma_histogram_correlation
                ),
            ));
        }

        tracing::debug!(
            ssim = structural.value,
            method = ?structural.method,
            histogram,
            perceptual,
            lighting_consistent = lighting.consistent,
            abrupt,
            "Pair analysed",
        );

        PairAnalysis {
            ssim: clamp_unit(structural.value),
            structural_method: structural.method,
            histogram_correlation: clamp_unit(histogram),
            perceptual_similarity: clamp_unit(perceptual),
            lighting_consistency: lighting.consistent,
            lighting: Some(lighting),
            character_presence_delta: presence.map_or(0.0, |p| clamp_unit(p.delta)),
            character_presence: presence,
            abrupt_scene_change: abrupt,
            confidence,
            issues,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
