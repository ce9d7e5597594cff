//! Two-stage judge response decoder.
//!
//! Judges are asked for a JSON object but frequently wrap it in prose or
//! answer in prose only. Decoding therefore runs in two stages:
//!
//! 1. **Strict JSON**: take the text from the first `{` to the last `}`,
//!    parse it, and hand the object to [`JudgeVerdict::from_json`].
//! 2. **Keyword fallback**: when stage 1 yields nothing, scan the text for
//!    continuity vocabulary and an explicit `score` figure and build a
//!    [`CoarseVerdict`]:
//!
//! | Signal                                                        | Verdict        | Default score |
//! |---------------------------------------------------------------|----------------|---------------|
//! | positive words only (consistent, coherent, smooth, ...)       | `Consistent`   | 0.75          |
//! | negative words only (inconsistent, abrupt, jarring, ...)      | `Inconsistent` | 0.35          |
//! | both                                                          | `Mixed`        | 0.5           |
//! | `score: 0.8` style figure                                     | from the score | the figure    |
//!
//! "not consistent" and similar negations count as negative. A response
//! with neither words nor a score is undecodable.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use koma_core::scores::clamp_unit;

pub const CONSISTENT_SCORE: f64 = 0.75;
pub const INCONSISTENT_SCORE: f64 = 0.35;
pub const MIXED_SCORE: f64 = 0.5;

static POSITIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(consistent|coherent|smooth|continuous|natural|seamless)\b")
        .expect("valid regex")
});

static NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(inconsistent|incoherent|abrupt|jarring|discontinuity|discontinuous|contradicts?|contradictory|mismatch(?:ed)?)\b",
    )
    .expect("valid regex")
});

static NEGATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:not|isn't|is not|never|lacks?)\s+(?:very\s+)?(consistent|coherent|smooth|continuous|natural|seamless)\b")
        .expect("valid regex")
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)score"?\s*(?:is|of|:|=)?\s*(0(?:\.\d+)?|1(?:\.0+)?)\b"#).expect("valid regex")
});

/// Which decoder stage produced a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStage {
    StrictJson,
    KeywordFallback,
}

/// Coarse sentiment recovered from prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Consistent,
    Inconsistent,
    Mixed,
}

/// Result of the keyword fallback decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseVerdict {
    pub sentiment: Sentiment,
    pub score: f64,
}

/// A judgment type that can be decoded from either stage.
pub trait JudgeVerdict: Sized {
    /// Build from a parsed JSON object; `None` if required keys are missing.
    fn from_json(value: &serde_json::Value) -> Option<Self>;

    /// Build from a coarse keyword verdict and the raw text.
    fn from_coarse(verdict: &CoarseVerdict, text: &str) -> Self;
}

/// A decoded judgment and the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub stage: DecodeStage,
}

/// Parse the span from the first `{` to the last `}` as a JSON object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Explicit `score` figure in prose, if any.
pub fn extract_score(text: &str) -> Option<f64> {
    SCORE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(clamp_unit)
}

/// Stage 2 decoder. `None` when the text carries no usable signal.
pub fn keyword_verdict(text: &str) -> Option<CoarseVerdict> {
    let negated = NEGATED_RE.find_iter(text).count();
    let positive = POSITIVE_RE.find_iter(text).count().saturating_sub(negated);
    let negative = NEGATIVE_RE.find_iter(text).count() + negated;
    let score = extract_score(text);

    let sentiment = match (positive > 0, negative > 0) {
        (true, false) => Some(Sentiment::Consistent),
        (false, true) => Some(Sentiment::Inconsistent),
        (true, true) => Some(Sentiment::Mixed),
        (false, false) => None,
    };

    match (sentiment, score) {
        (Some(sentiment), Some(score)) => Some(CoarseVerdict { sentiment, score }),
        (Some(sentiment), None) => Some(CoarseVerdict {
            sentiment,
            score: match sentiment {
                Sentiment::Consistent => CONSISTENT_SCORE,
                Sentiment::Inconsistent => INCONSISTENT_SCORE,
                Sentiment::Mixed => MIXED_SCORE,
            },
        }),
        (None, Some(score)) => Some(CoarseVerdict {
            sentiment: if score >= 0.6 {
                Sentiment::Consistent
            } else if score < 0.4 {
                Sentiment::Inconsistent
            } else {
                Sentiment::Mixed
            },
            score,
        }),
        (None, None) => None,
    }
}

/// Run both stages in order.
pub fn decode<T: JudgeVerdict>(text: &str) -> Option<Decoded<T>> {
    if let Some(value) = extract_json_object(text).as_ref().and_then(T::from_json) {
        return Some(Decoded {
            value,
            stage: DecodeStage::StrictJson,
        });
    }
    keyword_verdict(text).map(|verdict| Decoded {
        value: T::from_coarse(&verdict, text),
        stage: DecodeStage::KeywordFallback,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
