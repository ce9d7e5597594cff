//! Validation orchestrator.
//!
//! One run: windows, narrative threads, per-panel fingerprints, then a
//! single [`CoherenceVerdict`]. Only configuration problems and
//! cancellation abort a run; everything else degrades into the verdict's
//! issue list.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use koma_core::error::CoreError;
use koma_core::fingerprint::emotion::emotion_matcher;
use koma_core::fingerprint::pose::pose_matcher;
use koma_core::fingerprint::{FingerprintKind, FingerprintMatcher, FingerprintStatus};
use koma_core::issues::{summarize_by_category, Issue, IssueCategory, IssueSummary};
use koma_core::scores::{clamp_unit, AssessmentBand};
use koma_core::thresholds::ValidationConfig;
use koma_core::types::PanelSequence;
use koma_core::visual::VisualAnalyzer;
use koma_judge::gateway::{JudgeGateway, UnavailableReason};

use crate::aggregator::{run_blocking, SequenceAggregator, SequenceAssessment};
use crate::thread::NarrativeThreadTracker;
use crate::verdict::{
    CoherenceVerdict, PanelFingerprints, Recommendation, RecommendationCategory, ThreadReport,
};

pub struct ValidationOrchestrator {
    aggregator: SequenceAggregator,
    tracker: NarrativeThreadTracker,
    emotion: FingerprintMatcher,
    pose: FingerprintMatcher,
    config: ValidationConfig,
}

impl ValidationOrchestrator {
    /// Wire the pipeline. Fails if `config` is out of range.
    pub fn new(
        analyzer: Arc<VisualAnalyzer>,
        gateway: Arc<JudgeGateway>,
        config: ValidationConfig,
    ) -> Result<Self, CoreError> {
        config.check()?;
        let emotion = emotion_matcher(config.fingerprint_pass_threshold);
        let pose = pose_matcher(config.fingerprint_pass_threshold);
        Ok(Self {
            aggregator: SequenceAggregator::new(analyzer, Arc::clone(&gateway), config.clone()),
            tracker: NarrativeThreadTracker::new(gateway, emotion.clone(), config.clone()),
            emotion,
            pose,
            config,
        })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Load a JSON manifest and validate it.
    pub async fn run_manifest(
        &self,
        manifest: &Path,
        cancel: &CancellationToken,
    ) -> Result<CoherenceVerdict, CoreError> {
        let sequence = PanelSequence::from_manifest(manifest)?;
        self.run(&sequence, cancel).await
    }

    /// Validate one panel sequence.
    pub async fn run(
        &self,
        sequence: &PanelSequence,
        cancel: &CancellationToken,
    ) -> Result<CoherenceVerdict, CoreError> {
        tracing::info!(panels = sequence.len(), "Validation run started");

        let assessment = self.aggregator.assess(sequence, cancel).await?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let thread_report = self.tracker.track(&sequence.metadata()).await;
        let panel_fingerprints = self.fingerprints(sequence).await?;

        let verdict = self.merge(assessment, thread_report, panel_fingerprints);

        tracing::info!(
            overall_score = verdict.overall_score,
            band = verdict.assessment_band.as_str(),
            human_review = verdict.recommend_human_review,
            issues = verdict.issue_summary.len(),
            "Validation run finished",
        );
        Ok(verdict)
    }

    async fn fingerprints(&self, sequence: &PanelSequence) -> Result<Vec<PanelFingerprints>, CoreError> {
        let entries = sequence.entries().to_vec();
        let emotion = self.emotion.clone();
        let pose = self.pose.clone();
        run_blocking(move || {
            entries
                .iter()
                .enumerate()
                .map(|(panel_index, entry)| {
                    let path = &entry.artifact.image_reference;
                    PanelFingerprints {
                        panel_index,
                        scene_index: entry.artifact.scene_index,
                        chapter_index: entry.artifact.chapter_index,
                        emotion: emotion.validate(path, &entry.metadata),
                        pose: pose.validate(path, &entry.metadata),
                    }
                })
                .collect()
        })
        .await
    }

    /// Blend the sequence and thread scores and derive the run-level fields.
    pub fn merge(
        &self,
        assessment: SequenceAssessment,
        thread_report: ThreadReport,
        panel_fingerprints: Vec<PanelFingerprints>,
    ) -> CoherenceVerdict {
        let config = &self.config;
        let overall_score = clamp_unit(
            config.run_sequence_weight * assessment.sequence_score
                + config.run_thread_weight() * thread_report.thread_score,
        );
        let assessment_band = AssessmentBand::classify(overall_score, &config.bands);

        let mut run_issues = thread_issues(&thread_report);
        run_issues.extend(fingerprint_issues(&panel_fingerprints));
        let issue_summary = summarize_by_category(
            assessment
                .window_results
                .iter()
                .flat_map(|w| w.issues.iter().map(move |i| (Some(w.window_index), i)))
                .chain(run_issues.iter().map(|i| (None, i))),
        );
        let recommendations = recommendations(&issue_summary, &thread_report, &panel_fingerprints);

        let thread_exhausted = thread_report
            .sources()
            .iter()
            .any(|s| s.unavailable == Some(UnavailableReason::Exhausted));
        let mut review_reasons = Vec::new();
        if overall_score < config.human_review_threshold {
            review_reasons.push(format!(
                "overall score {overall_score:.2} below {:.2}",
                config.human_review_threshold
            ));
        }
        if assessment.judge_exhausted() || thread_exhausted {
            review_reasons.push("judge chain exhausted during the run".to_string());
        }
        let judge_flagged: Vec<usize> = assessment
            .window_results
            .iter()
            .filter(|w| {
                w.narrative_signal
                    .as_ref()
                    .is_some_and(|n| n.recommend_human_review)
            })
            .map(|w| w.window_index)
            .collect();
        if !judge_flagged.is_empty() {
            review_reasons.push(format!(
                "judge recommended review for windows {}",
                windows_label(&judge_flagged)
            ));
        }
        if thread_report.thread_score < config.human_review_threshold {
            review_reasons.push(format!(
                "thread score {:.2} below {:.2}",
                thread_report.thread_score, config.human_review_threshold
            ));
        }

        CoherenceVerdict {
            overall_score,
            assessment_band,
            sequence_score: assessment.sequence_score,
            window_results: assessment.window_results,
            thread_report,
            issue_summary,
            recommendations,
            recommend_human_review: !review_reasons.is_empty(),
            review_reasons,
            panel_fingerprints,
        }
    }
}

// ---------------------------------------------------------------------------
// Run-level issues
// ---------------------------------------------------------------------------

/// Thread checks that fell back to heuristics because no judge answered.
/// Skipped checks had nothing to judge and are not reported.
fn thread_issues(threads: &ThreadReport) -> Vec<Issue> {
    let sources = [
        ("speaker", &threads.speaker_analysis.source),
        ("character", &threads.character_analysis.source),
        ("emotion", &threads.emotional_analysis.source),
    ];
    sources
        .into_iter()
        .filter_map(|(thread, source)| {
            let why = match source.unavailable? {
                UnavailableReason::NotConfigured => "no text judge configured".to_string(),
                UnavailableReason::Exhausted => {
                    format!("judge chain exhausted after {} attempts", source.attempts)
                }
                UnavailableReason::Skipped => return None,
            };
            Some(Issue::new(
                IssueCategory::JudgeUnavailable,
                format!("{thread} thread: {why}; heuristic fallback used"),
            ))
        })
        .collect()
}

/// Fingerprint checks left unverified because the panel image was unreadable.
fn fingerprint_issues(panels: &[PanelFingerprints]) -> Vec<Issue> {
    panels
        .iter()
        .flat_map(|p| {
            [&p.emotion, &p.pose].into_iter().filter_map(move |report| {
                let error = report.image_error.as_deref()?;
                let kind = match report.kind {
                    FingerprintKind::Emotion => "emotion",
                    FingerprintKind::Pose => "pose",
                };
                Some(Issue::new(
                    IssueCategory::ImageUnavailable,
                    format!("panel {}: {kind} not verified: {error}", p.panel_index),
                ))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

fn windows_label(windows: &[usize]) -> String {
    windows
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// ` (windows 0, 2)`, or nothing for run-level issues.
fn windows_note(windows: &[usize]) -> String {
    if windows.is_empty() {
        String::new()
    } else {
        format!(" (windows {})", windows_label(windows))
    }
}

/// One recommendation per category, ordered by category. The first reason
/// found for a category wins.
pub fn recommendations(
    issues: &[IssueSummary],
    threads: &ThreadReport,
    fingerprints: &[PanelFingerprints],
) -> Vec<Recommendation> {
    let mut by_category: BTreeMap<RecommendationCategory, String> = BTreeMap::new();
    let mut add = |category: RecommendationCategory, message: String| {
        by_category.entry(category).or_insert(message);
    };

    for summary in issues {
        let windows = windows_label(&summary.windows);
        match summary.category {
            IssueCategory::ImageUnavailable => add(
                RecommendationCategory::InputCompleteness,
                format!(
                    "Regenerate or re-export unreadable panel images{}.",
                    windows_note(&summary.windows)
                ),
            ),
            IssueCategory::AbruptSceneChange | IssueCategory::LightingInconsistency => add(
                RecommendationCategory::VisualContinuity,
                format!(
                    "Smooth abrupt scene or lighting changes with transition panels (windows {windows})."
                ),
            ),
            IssueCategory::CharacterPresenceChange => add(
                RecommendationCategory::CharacterConsistency,
                format!("Check that characters enter and leave frame deliberately (windows {windows})."),
            ),
            IssueCategory::JudgeReported => add(
                RecommendationCategory::NarrativeFlow,
                format!("Review the judge's findings, e.g. \"{}\".", summary.example),
            ),
            IssueCategory::LowWindowScore => add(
                RecommendationCategory::LowScoringWindows,
                format!("Revise the panels in low-scoring windows {windows}."),
            ),
            IssueCategory::JudgeUnavailable if summary.windows.is_empty() => add(
                RecommendationCategory::JudgeCoverage,
                "Narrative threads were checked by heuristics only; rerun with a judge available to confirm."
                    .into(),
            ),
            IssueCategory::JudgeUnavailable => add(
                RecommendationCategory::JudgeCoverage,
                format!(
                    "Windows {windows} were scored from visual signals only; rerun with a judge available to confirm."
                ),
            ),
        }
    }

    if !threads.character_analysis.continuity || threads.character_analysis.unexpected_appearance {
        add(
            RecommendationCategory::CharacterConsistency,
            "Set up characters before they appear and keep the cast continuous between panels.".into(),
        );
    }
    if !threads.speaker_analysis.consistent || threads.emotional_analysis.flow_quality == "jarring" {
        add(
            RecommendationCategory::NarrativeFlow,
            format!(
                "Smooth the emotional arc ({} flow, {} valence reversals) and keep speaker voices consistent.",
                threads.emotional_analysis.flow_quality, threads.emotional_analysis.valence_reversals
            ),
        );
    }

    let failing: Vec<String> = fingerprints
        .iter()
        .filter(|p| {
            p.emotion.status == FingerprintStatus::Fail || p.pose.status == FingerprintStatus::Fail
        })
        .map(|p| p.panel_index.to_string())
        .collect();
    if !failing.is_empty() {
        add(
            RecommendationCategory::CharacterExpression,
            format!(
                "Panels {} do not show their intended expression or pose.",
                failing.join(", ")
            ),
        );
    }

    by_category
        .into_iter()
        .map(|(category, message)| Recommendation { category, message })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
