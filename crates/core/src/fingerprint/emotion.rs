//! Emotion vocabulary, valence table, and the brightness/contrast detector.

use std::sync::Arc;

use image::DynamicImage;

use crate::fingerprint::{
    Detection, FingerprintKind, FingerprintMatcher, LabelVocabulary, VisualLabelDetector,
};
use crate::types::SceneMetadata;
use crate::visual::lighting::luma;
use crate::visual::loader::downscale_rgb;
use crate::visual::presence::{FeatureDetector, SkinToneDetector};

pub const NEUTRAL_EMOTION: &str = "neutral";

fn intended_emotion(metadata: &SceneMetadata) -> Option<&str> {
    metadata.intended_emotion.as_deref()
}

pub static EMOTION_VOCABULARY: LabelVocabulary = LabelVocabulary {
    kind: FingerprintKind::Emotion,
    neutral: NEUTRAL_EMOTION,
    explicit_label: intended_emotion,
    keywords: &[
        ("happy", &["happy", "smile", "smiles", "smiling", "laugh", "laughs", "laughing", "joy", "joyful", "glad", "cheerful", "grin", "grins", "delighted"]),
        ("sad", &["sad", "cry", "cries", "crying", "tears", "sorrow", "lonely", "grief", "mourn", "unhappy", "devastated", "heartbroken"]),
        ("angry", &["angry", "furious", "rage", "shout", "shouts", "yell", "yells", "glare", "glares", "mad", "annoyed"]),
        ("surprised", &["surprised", "shocked", "gasp", "gasps", "astonished", "unexpected", "startled"]),
        ("fearful", &["afraid", "scared", "fear", "terrified", "tremble", "trembles", "panic", "nervous"]),
        ("excited", &["excited", "thrilled", "eager", "cheer", "cheers", "amazing", "can't wait"]),
        ("calm", &["calm", "peaceful", "quiet", "serene", "relaxed", "gentle"]),
        ("determined", &["determined", "resolve", "resolute", "focused", "won't give up", "never give up"]),
    ],
    punctuation: &[
        ("?!", "surprised", 1.0),
        ("!", "excited", 0.5),
        ("...", "sad", 0.5),
    ],
    synonym_groups: &[
        &["happy", "joy", "joyful", "cheerful", "glad", "delighted", "content", "pleased"],
        &["sad", "sorrowful", "unhappy", "melancholy", "depressed", "devastated", "heartbroken", "grieving"],
        &["angry", "furious", "mad", "enraged", "irritated", "annoyed"],
        &["surprised", "shocked", "astonished", "amazed", "startled"],
        &["fearful", "afraid", "scared", "terrified", "anxious", "nervous"],
        &["excited", "thrilled", "eager", "enthusiastic", "energetic"],
        &["calm", "peaceful", "serene", "relaxed", "composed"],
        &["determined", "resolute", "focused", "confident"],
    ],
    cross_pairs: &[
        ("happy", "excited", 0.7),
        ("surprised", "excited", 0.7),
        ("calm", "neutral", 0.7),
        ("surprised", "fearful", 0.6),
        ("angry", "determined", 0.6),
        ("sad", "fearful", 0.6),
    ],
};

/// Emotional valence of a canonical emotion: `1` positive, `-1` negative,
/// `0` neutral or unknown.
pub fn valence(label: &str) -> i8 {
    match EMOTION_VOCABULARY.canonical(label).as_str() {
        "happy" | "excited" => 1,
        "sad" | "angry" | "fearful" => -1,
        _ => 0,
    }
}

/// Whether moving from `from` to `to` flips strongly positive to strongly
/// negative (or the reverse).
pub fn is_valence_reversal(from: &str, to: &str) -> bool {
    valence(from) * valence(to) < 0
}

// ---------------------------------------------------------------------------
// BrightnessEmotionDetector
// ---------------------------------------------------------------------------

/// Guesses mood from overall brightness and contrast, with a small
/// confidence bonus when a face-like region is present.
#[derive(Clone)]
pub struct BrightnessEmotionDetector {
    faces: Option<Arc<dyn FeatureDetector>>,
}

/// Confidence added when at least one face region is detected.
const FACE_BONUS: f64 = 0.1;

impl Default for BrightnessEmotionDetector {
    fn default() -> Self {
        Self {
            faces: Some(Arc::new(SkinToneDetector::default())),
        }
    }
}

impl BrightnessEmotionDetector {
    pub fn new(faces: Option<Arc<dyn FeatureDetector>>) -> Self {
        Self { faces }
    }

    fn classify(mean: f64, stddev: f64) -> (&'static str, f64) {
        if mean > 170.0 && stddev > 50.0 {
            ("excited", 0.55)
        } else if mean > 150.0 {
            ("happy", 0.5)
        } else if mean < 70.0 && stddev > 60.0 {
            ("angry", 0.45)
        } else if mean < 80.0 {
            ("sad", 0.5)
        } else if stddev < 20.0 {
            ("calm", 0.4)
        } else {
            (NEUTRAL_EMOTION, 0.35)
        }
    }
}

impl VisualLabelDetector for BrightnessEmotionDetector {
    fn name(&self) -> &str {
        "brightness_emotion"
    }

    fn detect(&self, img: &DynamicImage) -> Option<Detection> {
        let rgb = downscale_rgb(img, 128);
        let samples: Vec<f64> = rgb.pixels().map(|p| luma(p[0], p[1], p[2]) as f64).collect();
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let stddev = (samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        let (label, mut confidence) = Self::classify(mean, stddev);
        if let Some(faces) = &self.faces {
            if !faces.detect(img).is_empty() {
                confidence += FACE_BONUS;
            }
        }
        Some(Detection {
            label: label.to_string(),
            confidence,
        })
    }
}

/// Emotion matcher with the built-in detector.
pub fn emotion_matcher(pass_threshold: f64) -> FingerprintMatcher {
    FingerprintMatcher::new(
        &EMOTION_VOCABULARY,
        Some(Arc::new(BrightnessEmotionDetector::default())),
        pass_threshold,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
