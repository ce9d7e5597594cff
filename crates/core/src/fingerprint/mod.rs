//! Emotion and pose fingerprint matching.
//!
//! Both matchers share one implementation, [`FingerprintMatcher`], and differ
//! only in their [`LabelVocabulary`] and visual detector:
//!
//! 1. `extract_intended` reads the explicit label, or scores dialogue and
//!    description text against the vocabulary's keyword table.
//! 2. `detect_visual` runs the pluggable [`VisualLabelDetector`].
//! 3. `match_labels` compares the two labels (exact, synonym group, or
//!    curated cross-label pair).
//! 4. `validate` combines detection and match confidence into a report.

pub mod emotion;
pub mod pose;

use std::path::Path;
use std::sync::{Arc, LazyLock};

use image::DynamicImage;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scores::clamp_unit;
use crate::types::SceneMetadata;
use crate::visual::load_image;

/// Match confidence for two labels in the same synonym group.
pub const SYNONYM_MATCH_CONFIDENCE: f64 = 0.8;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("valid regex"));

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Which dimension a matcher fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    Emotion,
    Pose,
}

/// Static label tables for one fingerprint dimension.
pub struct LabelVocabulary {
    pub kind: FingerprintKind,
    /// Label returned when nothing can be extracted or detected.
    pub neutral: &'static str,
    /// Reads the explicit label from metadata, if the field is set.
    pub explicit_label: fn(&SceneMetadata) -> Option<&str>,
    /// `(label, keywords)`; earlier labels win ties.
    pub keywords: &'static [(&'static str, &'static [&'static str])],
    /// `(pattern, label, weight)` punctuation signals applied to dialogue.
    pub punctuation: &'static [(&'static str, &'static str, f64)],
    /// Groups of interchangeable labels; the first entry is canonical.
    pub synonym_groups: &'static [&'static [&'static str]],
    /// `(canonical_a, canonical_b, confidence)` related-label pairs.
    pub cross_pairs: &'static [(&'static str, &'static str, f64)],
}

/// Lower-case and trim a label.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

impl LabelVocabulary {
    fn group_of(&self, label: &str) -> Option<&'static [&'static str]> {
        self.synonym_groups
            .iter()
            .copied()
            .find(|group| group.contains(&label))
    }

    /// Canonical form of a label: its synonym group's head, or itself.
    pub fn canonical(&self, label: &str) -> String {
        let label = normalize_label(label);
        match self.group_of(&label) {
            Some(group) => group[0].to_string(),
            None => label,
        }
    }

    fn cross_pair_confidence(&self, a: &str, b: &str) -> Option<f64> {
        self.cross_pairs
            .iter()
            .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
            .map(|(_, _, c)| *c)
    }

    /// Score text against the keyword table (and punctuation signals on
    /// `dialogue`). Returns the highest-scoring label, or `None` if nothing
    /// matched.
    pub fn score_text(&self, dialogue: &str, description: &str) -> Option<&'static str> {
        let joined = format!("{dialogue} {description}").to_lowercase();
        let words: Vec<&str> = WORD_RE.find_iter(&joined).map(|m| m.as_str()).collect();
        let padded = format!(" {} ", words.join(" "));

        let mut best: Option<(&'static str, f64)> = None;
        for (label, keywords) in self.keywords {
            let mut score: f64 = keywords
                .iter()
                .map(|k| padded.matches(&format!(" {k} ")).count() as f64)
                .sum();
            score += self
                .punctuation
                .iter()
                .filter(|(_, l, _)| l == label)
                .map(|(pattern, _, weight)| dialogue.matches(*pattern).count() as f64 * weight)
                .sum::<f64>();

            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((*label, score));
            }
        }
        best.map(|(label, _)| label)
    }
}

// ---------------------------------------------------------------------------
// Detection & matching results
// ---------------------------------------------------------------------------

/// A label detected from pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
}

/// Outcome of comparing intended and detected labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelMatch {
    pub is_match: bool,
    pub confidence: f64,
}

impl LabelMatch {
    const NONE: Self = Self {
        is_match: false,
        confidence: 0.0,
    };
}

/// Detects a label from image pixels.
pub trait VisualLabelDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Detected label and confidence, or `None` when the image offers no
    /// usable signal.
    fn detect(&self, img: &DynamicImage) -> Option<Detection>;
}

/// Per-panel verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStatus {
    Pass,
    Fail,
    /// Nothing could be detected, so the intent was not checked.
    Unverified,
}

/// Per-artifact emotion or pose validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintReport {
    pub kind: FingerprintKind,
    pub intended: String,
    pub detected: String,
    pub detection_confidence: f64,
    pub match_confidence: f64,
    pub overall_confidence: f64,
    pub is_match: bool,
    pub status: FingerprintStatus,
    /// Why the panel image could not be read, when it could not.
    pub image_error: Option<String>,
}

// ---------------------------------------------------------------------------
// FingerprintMatcher
// ---------------------------------------------------------------------------

/// Intent-vs-detection matcher for one vocabulary.
#[derive(Clone)]
pub struct FingerprintMatcher {
    vocabulary: &'static LabelVocabulary,
    detector: Option<Arc<dyn VisualLabelDetector>>,
    pass_threshold: f64,
}

impl FingerprintMatcher {
    pub fn new(
        vocabulary: &'static LabelVocabulary,
        detector: Option<Arc<dyn VisualLabelDetector>>,
        pass_threshold: f64,
    ) -> Self {
        Self {
            vocabulary,
            detector,
            pass_threshold,
        }
    }

    pub fn vocabulary(&self) -> &'static LabelVocabulary {
        self.vocabulary
    }

    pub fn kind(&self) -> FingerprintKind {
        self.vocabulary.kind
    }

    fn neutral_detection(&self) -> Detection {
        Detection {
            label: self.vocabulary.neutral.to_string(),
            confidence: 0.0,
        }
    }

    /// Intended label: the explicit field if set, else the best keyword
    /// match, else the neutral label.
    pub fn extract_intended(&self, metadata: &SceneMetadata) -> String {
        if let Some(label) = (self.vocabulary.explicit_label)(metadata) {
            let label = normalize_label(label);
            if !label.is_empty() {
                return label;
            }
        }
        self.vocabulary
            .score_text(&metadata.dialogue_text, &metadata.description)
            .unwrap_or(self.vocabulary.neutral)
            .to_string()
    }

    /// Detect a label from the image at `path`. Never fails: missing
    /// images and absent detectors give `(neutral, 0.0)`.
    pub fn detect_visual(&self, path: &Path) -> Detection {
        self.detect_from(path).0
    }

    /// Detection plus the load error, if the image could not be read.
    fn detect_from(&self, path: &Path) -> (Detection, Option<String>) {
        let Some(detector) = self.detector.as_deref() else {
            return (self.neutral_detection(), None);
        };
        match load_image(path) {
            Ok(img) => (self.detect_image(detector, &img), None),
            Err(e) => {
                tracing::warn!(
                    kind = ?self.vocabulary.kind,
                    path = %path.display(),
                    error = %e,
                    "Fingerprint detection skipped",
                );
                (self.neutral_detection(), Some(e.to_string()))
            }
        }
    }

    fn detect_image(&self, detector: &dyn VisualLabelDetector, img: &DynamicImage) -> Detection {
        match detector.detect(img) {
            Some(d) => Detection {
                label: normalize_label(&d.label),
                confidence: clamp_unit(d.confidence),
            },
            None => self.neutral_detection(),
        }
    }

    /// Compare intended and detected labels.
    pub fn match_labels(&self, intended: &str, detected: &str) -> LabelMatch {
        let a = normalize_label(intended);
        let b = normalize_label(detected);
        if a.is_empty() || b.is_empty() {
            return LabelMatch::NONE;
        }
        if a == b {
            return LabelMatch {
                is_match: true,
                confidence: 1.0,
            };
        }
        if let Some(group) = self.vocabulary.group_of(&a) {
            if group.contains(&b.as_str()) {
                return LabelMatch {
                    is_match: true,
                    confidence: SYNONYM_MATCH_CONFIDENCE,
                };
            }
        }
        let (ca, cb) = (self.vocabulary.canonical(&a), self.vocabulary.canonical(&b));
        match self.vocabulary.cross_pair_confidence(&ca, &cb) {
            Some(confidence) => LabelMatch {
                is_match: true,
                confidence,
            },
            None => LabelMatch::NONE,
        }
    }

    /// Full intent-vs-detection report for one panel.
    pub fn validate(&self, path: &Path, metadata: &SceneMetadata) -> FingerprintReport {
        let intended = self.extract_intended(metadata);
        let (detected, image_error) = self.detect_from(path);
        FingerprintReport {
            image_error,
            ..self.report(intended, detected)
        }
    }

    fn report(&self, intended: String, detected: Detection) -> FingerprintReport {
        let matched = self.match_labels(&intended, &detected.label);
        let overall = clamp_unit((detected.confidence + matched.confidence) / 2.0);
        let status = if detected.confidence <= 0.0 {
            FingerprintStatus::Unverified
        } else if matched.is_match && overall >= self.pass_threshold {
            FingerprintStatus::Pass
        } else {
            FingerprintStatus::Fail
        };

        FingerprintReport {
            kind: self.vocabulary.kind,
            intended,
            detected: detected.label,
            detection_confidence: detected.confidence,
            match_confidence: matched.confidence,
            overall_confidence: overall,
            is_match: matched.is_match,
            status,
            image_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::emotion::EMOTION_VOCABULARY;
    use super::*;

    struct Fixed(&'static str, f64);

    impl VisualLabelDetector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _img: &DynamicImage) -> Option<Detection> {
            Some(Detection {
                label: self.0.to_string(),
                confidence: self.1,
            })
        }
    }

    fn matcher(detector: Option<Arc<dyn VisualLabelDetector>>) -> FingerprintMatcher {
        FingerprintMatcher::new(&EMOTION_VOCABULARY, detector, 0.7)
    }

    #[test]
    fn report_averages_confidences() {
        let m = matcher(None);
        let report = m.report(
            "happy".into(),
            Detection {
                label: "happy".into(),
                confidence: 0.6,
            },
        );
        assert!((report.overall_confidence - 0.8).abs() < 1e-9);
        assert_eq!(report.status, FingerprintStatus::Pass);
    }

    #[test]
    fn report_fails_below_threshold() {
        let m = matcher(None);
        let report = m.report(
            "happy".into(),
            Detection {
                label: "joy".into(),
                confidence: 0.4,
            },
        );
        assert!(report.is_match);
        assert!((report.overall_confidence - 0.6).abs() < 1e-9);
        assert_eq!(report.status, FingerprintStatus::Fail);
    }

    #[test]
    fn undetected_is_unverified() {
        let dir = tempfile::tempdir().unwrap();
        let report = matcher(Some(Arc::new(Fixed("happy", 0.9))))
            .validate(&dir.path().join("missing.png"), &SceneMetadata::default());
        assert_eq!(report.status, FingerprintStatus::Unverified);
        assert_eq!(report.detected, "neutral");
        assert!(report.image_error.is_some());
    }

    #[test]
    fn validate_uses_detector_on_readable_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();

        let metadata = SceneMetadata {
            intended_emotion: Some("Happy".into()),
            ..Default::default()
        };
        let report = matcher(Some(Arc::new(Fixed("HAPPY", 0.9)))).validate(&path, &metadata);
        assert_eq!(report.intended, "happy");
        assert_eq!(report.detected, "happy");
        assert!(report.is_match);
        assert_eq!(report.status, FingerprintStatus::Pass);
    }

    #[test]
    fn canonical_resolves_synonyms() {
        assert_eq!(EMOTION_VOCABULARY.canonical("Joy"), "happy");
        assert_eq!(EMOTION_VOCABULARY.canonical("bewildered"), "bewildered");
    }

    #[test]
    fn empty_labels_never_match() {
        assert_eq!(matcher(None).match_labels("", "happy"), LabelMatch::NONE);
    }
}
