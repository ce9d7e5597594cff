//! Run-level result types.
//!
//! Everything here is built once by the aggregator, tracker, or
//! orchestrator and never mutated afterwards. None of it carries
//! timestamps or run IDs, so two runs over identical inputs with identical
//! judge outcomes serialize identically.

use serde::{Deserialize, Serialize};

use koma_core::fingerprint::FingerprintReport;
use koma_core::issues::{Issue, IssueSummary};
use koma_core::scores::AssessmentBand;
use koma_core::visual::PairAnalysis;
use koma_judge::gateway::JudgeProvenance;

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// What the multimodal judge said about a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSignal {
    pub score: f64,
    pub recommend_human_review: bool,
    pub detailed_analysis: String,
}

/// Coherence result for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window_index: usize,
    pub window_indices: Vec<usize>,
    /// Pair analyses in order; pair `k` compares panels `k` and `k + 1` of
    /// the window.
    pub pair_analyses: Vec<PairAnalysis>,
    /// Confidence-weighted mean of pair continuity scores.
    pub visual_signal: f64,
    /// `None` when no judgment was available.
    pub narrative_signal: Option<NarrativeSignal>,
    pub judge: JudgeProvenance,
    pub coherence_score: f64,
    /// Scored from local signals only.
    pub reduced_confidence: bool,
    pub issues: Vec<Issue>,
}

// ---------------------------------------------------------------------------
// Narrative threads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerAnalysis {
    pub speaker_count: usize,
    pub speakers: Vec<String>,
    pub consistent: bool,
    /// `clear` or `unclear`.
    pub threading: String,
    pub source: JudgeProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAnalysis {
    pub characters: Vec<String>,
    pub continuity: bool,
    pub unexpected_appearance: bool,
    pub source: JudgeProvenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalAnalysis {
    /// Intended emotion per panel.
    pub emotions: Vec<String>,
    pub coherence_score: f64,
    /// `natural`, `monotone`, `jarring`, or a judge-supplied tag.
    pub flow_quality: String,
    /// Adjacent positive/negative valence flips.
    pub valence_reversals: usize,
    pub source: JudgeProvenance,
}

/// Cross-cutting speaker, character, and emotional-arc analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub speaker_analysis: SpeakerAnalysis,
    pub character_analysis: CharacterAnalysis,
    pub emotional_analysis: EmotionalAnalysis,
    pub thread_score: f64,
    pub thread_quality: AssessmentBand,
}

impl ThreadReport {
    pub fn sources(&self) -> [&JudgeProvenance; 3] {
        [
            &self.speaker_analysis.source,
            &self.character_analysis.source,
            &self.emotional_analysis.source,
        ]
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Recommendation themes; the verdict carries at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    InputCompleteness,
    VisualContinuity,
    CharacterConsistency,
    NarrativeFlow,
    LowScoringWindows,
    CharacterExpression,
    JudgeCoverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub message: String,
}

/// Emotion and pose fingerprint results for one panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelFingerprints {
    pub panel_index: usize,
    pub scene_index: u32,
    pub chapter_index: u32,
    pub emotion: FingerprintReport,
    pub pose: FingerprintReport,
}

/// Run-level coherence verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceVerdict {
    pub overall_score: f64,
    pub assessment_band: AssessmentBand,
    pub sequence_score: f64,
    pub window_results: Vec<WindowResult>,
    pub thread_report: ThreadReport,
    /// Run-level issues, one entry per category.
    pub issue_summary: Vec<IssueSummary>,
    pub recommendations: Vec<Recommendation>,
    pub recommend_human_review: bool,
    /// Why human review was recommended; empty when it was not.
    pub review_reasons: Vec<String>,
    pub panel_fingerprints: Vec<PanelFingerprints>,
}
