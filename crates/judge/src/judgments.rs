//! Typed judgments decoded from judge responses.
//!
//! Each type documents the JSON keys it requires in strict mode. Optional
//! keys fall back to empty or neutral values so a partially filled object
//! still counts as a strict decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use koma_core::scores::clamp_unit;

use crate::decode::{CoarseVerdict, JudgeVerdict, Sentiment};

/// Longest excerpt of a prose response kept as `detailed_analysis`.
const MAX_EXCERPT_CHARS: usize = 500;

fn excerpt(text: &str) -> String {
    text.trim().chars().take(MAX_EXCERPT_CHARS).collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("description")
                .or_else(|| map.get("issue"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .or_else(|| Some(item.to_string())),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn score_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_unit),
        Value::String(s) => s.trim().parse::<f64>().ok().map(clamp_unit),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Multimodal window judgment
// ---------------------------------------------------------------------------

/// Multimodal judgment of one window.
///
/// Required: `overall_coherence.coherence_score` (or a top-level
/// `coherence_score`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultimodalJudgment {
    pub coherence_score: f64,
    pub visual_consistency: Option<Value>,
    pub scene_transitions: Option<Value>,
    pub character_analysis: Option<Value>,
    pub issues_detected: Vec<String>,
    pub recommend_human_review: bool,
    pub detailed_analysis: String,
}

impl JudgeVerdict for MultimodalJudgment {
    fn from_json(value: &Value) -> Option<Self> {
        let coherence_score = value
            .get("overall_coherence")
            .and_then(|o| o.get("coherence_score"))
            .or_else(|| value.get("coherence_score"))
            .and_then(score_field)?;

        Some(Self {
            coherence_score,
            visual_consistency: value.get("visual_consistency").cloned(),
            scene_transitions: value.get("scene_transitions").cloned(),
            character_analysis: value.get("character_analysis").cloned(),
            issues_detected: string_list(value.get("issues_detected")),
            recommend_human_review: value
                .get("recommend_human_review")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            detailed_analysis: value
                .get("detailed_analysis")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn from_coarse(verdict: &CoarseVerdict, text: &str) -> Self {
        Self {
            coherence_score: verdict.score,
            visual_consistency: None,
            scene_transitions: None,
            character_analysis: None,
            issues_detected: Vec::new(),
            recommend_human_review: verdict.sentiment == Sentiment::Inconsistent,
            detailed_analysis: excerpt(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Narrative thread judgments
// ---------------------------------------------------------------------------

/// Speaker identity and consistency across dialogue.
///
/// Required: `consistent` (bool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerJudgment {
    /// `None` when the judge did not state a count.
    pub speaker_count: Option<usize>,
    pub speakers: Vec<String>,
    pub consistent: bool,
    pub threading: String,
}

impl JudgeVerdict for SpeakerJudgment {
    fn from_json(value: &Value) -> Option<Self> {
        let consistent = value
            .get("consistent")
            .or_else(|| value.get("speaker_consistency"))
            .and_then(Value::as_bool)?;
        let speakers = string_list(value.get("speakers"));
        let speaker_count = value
            .get("speaker_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .or_else(|| (!speakers.is_empty()).then_some(speakers.len()));

        Some(Self {
            speaker_count,
            speakers,
            consistent,
            threading: value
                .get("threading")
                .and_then(Value::as_str)
                .unwrap_or("clear")
                .to_string(),
        })
    }

    fn from_coarse(verdict: &CoarseVerdict, _text: &str) -> Self {
        Self {
            speaker_count: None,
            speakers: Vec::new(),
            consistent: verdict.sentiment != Sentiment::Inconsistent,
            threading: "unclear".to_string(),
        }
    }
}

/// Character labels and continuity across scene descriptions.
///
/// Required: `continuity` (bool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterJudgment {
    pub characters: Vec<String>,
    pub continuity: bool,
    pub unexpected_appearance: bool,
}

impl JudgeVerdict for CharacterJudgment {
    fn from_json(value: &Value) -> Option<Self> {
        let continuity = value
            .get("continuity")
            .or_else(|| value.get("character_continuity"))
            .and_then(Value::as_bool)?;
        Some(Self {
            characters: string_list(value.get("characters")),
            continuity,
            unexpected_appearance: value
                .get("unexpected_appearance")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    fn from_coarse(verdict: &CoarseVerdict, _text: &str) -> Self {
        Self {
            characters: Vec::new(),
            continuity: verdict.sentiment != Sentiment::Inconsistent,
            unexpected_appearance: false,
        }
    }
}

/// Emotional arc coherence.
///
/// Required: `coherence_score` (number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionJudgment {
    pub coherence_score: f64,
    pub flow_quality: String,
}

impl JudgeVerdict for EmotionJudgment {
    fn from_json(value: &Value) -> Option<Self> {
        let coherence_score = value.get("coherence_score").and_then(score_field)?;
        let flow_quality = value
            .get("flow_quality")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                if coherence_score >= 0.6 {
                    "natural".to_string()
                } else {
                    "jarring".to_string()
                }
            });
        Some(Self {
            coherence_score,
            flow_quality,
        })
    }

    fn from_coarse(verdict: &CoarseVerdict, _text: &str) -> Self {
        let flow_quality = match verdict.sentiment {
            Sentiment::Consistent => "natural",
            Sentiment::Inconsistent => "jarring",
            Sentiment::Mixed => "uneven",
        };
        Self {
            coherence_score: verdict.score,
            flow_quality: flow_quality.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decode::{decode, DecodeStage};

    // -- MultimodalJudgment ---------------------------------------------------

    #[test]
    fn multimodal_full_object() {
        let text = json!({
            "visual_consistency": {"score": 0.9},
            "scene_transitions": "smooth",
            "character_analysis": {"consistent": true},
            "overall_coherence": {"coherence_score": 0.82},
            "issues_detected": ["hair colour changes in panel 2", {"description": "sky turns red"}],
            "recommend_human_review": false,
            "detailed_analysis": "Fine."
        })
        .to_string();
        let decoded = decode::<MultimodalJudgment>(&text).unwrap();
        assert_eq!(decoded.stage, DecodeStage::StrictJson);
        assert_eq!(decoded.value.coherence_score, 0.82);
        assert_eq!(
            decoded.value.issues_detected,
            vec!["hair colour changes in panel 2", "sky turns red"]
        );
        assert_eq!(decoded.value.scene_transitions, Some(json!("smooth")));
    }

    #[test]
    fn multimodal_score_out_of_range_is_clamped() {
        let j = MultimodalJudgment::from_json(&json!({"coherence_score": 7})).unwrap();
        assert_eq!(j.coherence_score, 1.0);
    }

    #[test]
    fn multimodal_without_score_is_not_strict() {
        assert!(MultimodalJudgment::from_json(&json!({"issues_detected": []})).is_none());
    }

    #[test]
    fn multimodal_prose_fallback() {
        let decoded =
            decode::<MultimodalJudgment>("The transition into panel 3 is abrupt and jarring.")
                .unwrap();
        assert_eq!(decoded.stage, DecodeStage::KeywordFallback);
        assert_eq!(decoded.value.coherence_score, 0.35);
        assert!(decoded.value.recommend_human_review);
        assert!(decoded.value.detailed_analysis.starts_with("The transition"));
    }

    // -- narrative judgments --------------------------------------------------

    #[test]
    fn speaker_count_from_list() {
        let j = SpeakerJudgment::from_json(&json!({
            "speakers": ["Aiko", "Ren"],
            "consistent": true
        }))
        .unwrap();
        assert_eq!(j.speaker_count, Some(2));
        assert_eq!(j.threading, "clear");
    }

    #[test]
    fn speaker_prose_is_unclear() {
        let decoded = decode::<SpeakerJudgment>("Speakers seem consistent.").unwrap();
        assert!(decoded.value.consistent);
        assert_eq!(decoded.value.threading, "unclear");
        assert_eq!(decoded.value.speaker_count, None);
    }

    #[test]
    fn character_requires_continuity() {
        assert!(CharacterJudgment::from_json(&json!({"characters": ["hero"]})).is_none());
        let j = CharacterJudgment::from_json(&json!({
            "characters": ["hero", "villain"],
            "continuity": false,
            "unexpected_appearance": true
        }))
        .unwrap();
        assert!(!j.continuity);
        assert!(j.unexpected_appearance);
    }

    #[test]
    fn emotion_flow_defaults_from_score() {
        let j = EmotionJudgment::from_json(&json!({"coherence_score": "0.3"})).unwrap();
        assert_eq!(j.flow_quality, "jarring");
        let j = EmotionJudgment::from_json(&json!({"coherence_score": 0.9, "flow_quality": "Natural"}))
            .unwrap();
        assert_eq!(j.flow_quality, "natural");
    }
}
