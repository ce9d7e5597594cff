//! Pose vocabulary and the silhouette-shape detector.

use std::sync::Arc;

use image::DynamicImage;

use crate::fingerprint::{
    Detection, FingerprintKind, FingerprintMatcher, LabelVocabulary, VisualLabelDetector,
};
use crate::types::SceneMetadata;
use crate::visual::lighting::luma;
use crate::visual::loader::downscale_rgb;

pub const NEUTRAL_POSE: &str = "neutral";

fn intended_pose(metadata: &SceneMetadata) -> Option<&str> {
    metadata.intended_pose.as_deref()
}

pub static POSE_VOCABULARY: LabelVocabulary = LabelVocabulary {
    kind: FingerprintKind::Pose,
    neutral: NEUTRAL_POSE,
    explicit_label: intended_pose,
    keywords: &[
        ("standing", &["standing", "stands", "stand", "upright", "stood"]),
        ("sitting", &["sitting", "sits", "sit", "seated", "sat"]),
        ("walking", &["walking", "walks", "walk", "strolling", "strolls", "steps"]),
        ("running", &["running", "runs", "run", "sprinting", "sprints", "dashing", "dashes", "chasing"]),
        ("lying", &["lying", "lies", "lying down", "reclining", "asleep", "sleeping", "collapsed"]),
        ("kneeling", &["kneeling", "kneels", "kneel", "crouching", "crouches"]),
        ("fighting", &["fighting", "fights", "fight", "punch", "punches", "kick", "kicks", "attack", "attacks", "sword", "combat"]),
    ],
    punctuation: &[],
    synonym_groups: &[
        &["standing", "upright", "stand"],
        &["sitting", "seated", "sit"],
        &["walking", "strolling", "walk"],
        &["running", "sprinting", "dashing", "run"],
        &["lying", "reclining", "lying down", "sleeping"],
        &["kneeling", "crouching", "kneel"],
        &["fighting", "combat", "attacking", "action"],
    ],
    cross_pairs: &[
        ("standing", "walking", 0.7),
        ("walking", "running", 0.7),
        ("running", "fighting", 0.6),
        ("kneeling", "sitting", 0.6),
    ],
};

// ---------------------------------------------------------------------------
// SilhouettePoseDetector
// ---------------------------------------------------------------------------

/// Classifies the silhouette that stands out from the panel border by the
/// aspect ratio of its bounding box.
#[derive(Debug, Clone)]
pub struct SilhouettePoseDetector {
    /// Longest edge the image is reduced to before scanning.
    pub working_size: u32,
    /// Luma distance from the border mean for a pixel to count as figure.
    pub foreground_delta: f64,
    /// Smallest figure area, as a fraction of the image.
    pub min_foreground_ratio: f64,
}

impl Default for SilhouettePoseDetector {
    fn default() -> Self {
        Self {
            working_size: 128,
            foreground_delta: 40.0,
            min_foreground_ratio: 0.02,
        }
    }
}

impl SilhouettePoseDetector {
    /// `(label, confidence)` for a bounding box with the given height/width
    /// ratio.
    fn classify(aspect: f64) -> (&'static str, f64) {
        if aspect >= 1.6 {
            ("standing", 0.55)
        } else if aspect >= 0.9 {
            ("sitting", 0.45)
        } else if aspect >= 0.55 {
            ("running", 0.4)
        } else {
            ("lying", 0.5)
        }
    }
}

impl VisualLabelDetector for SilhouettePoseDetector {
    fn name(&self) -> &str {
        "silhouette_pose"
    }

    fn detect(&self, img: &DynamicImage) -> Option<Detection> {
        let rgb = downscale_rgb(img, self.working_size);
        let (w, h) = rgb.dimensions();
        if w < 3 || h < 3 {
            return None;
        }

        let lumas: Vec<f64> = rgb.pixels().map(|p| luma(p[0], p[1], p[2]) as f64).collect();
        let at = |x: u32, y: u32| lumas[(y * w + x) as usize];

        let mut border = Vec::with_capacity(2 * (w + h) as usize);
        for x in 0..w {
            border.push(at(x, 0));
            border.push(at(x, h - 1));
        }
        for y in 1..h - 1 {
            border.push(at(0, y));
            border.push(at(w - 1, y));
        }
        let background = border.iter().sum::<f64>() / border.len() as f64;

        let (mut count, mut min_x, mut max_x, mut min_y, mut max_y) = (0usize, w, 0, h, 0);
        for y in 0..h {
            for x in 0..w {
                if (at(x, y) - background).abs() > self.foreground_delta {
                    count += 1;
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y);
                }
            }
        }
        if (count as f64) < self.min_foreground_ratio * (w * h) as f64 {
            return None;
        }

        let aspect = (max_y - min_y + 1) as f64 / (max_x - min_x + 1) as f64;
        let (label, confidence) = Self::classify(aspect);
        Some(Detection {
            label: label.to_string(),
            confidence,
        })
    }
}

/// Pose matcher with the built-in detector.
pub fn pose_matcher(pass_threshold: f64) -> FingerprintMatcher {
    FingerprintMatcher::new(
        &POSE_VOCABULARY,
        Some(Arc::new(SilhouettePoseDetector::default())),
        pass_threshold,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
