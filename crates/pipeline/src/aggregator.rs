//! Sequence coherence aggregator.
//!
//! Slides a window over the panel sequence, scores every adjacent pair
//! locally, and asks the multimodal judge once per window. Windows run one
//! after another; the caller may cancel between windows. Pair analyses are
//! cached so panels shared by overlapping windows are compared once.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use koma_core::error::CoreError;
use koma_core::issues::{Issue, IssueCategory};
use koma_core::scores::{clamp_unit, mean, weighted_mean, AssessmentBand, NEUTRAL_SCORE};
use koma_core::thresholds::ValidationConfig;
use koma_core::types::PanelSequence;
use koma_core::visual::{PairAnalysis, VisualAnalyzer};
use koma_judge::backend::{JudgeImage, JudgeRequest};
use koma_judge::gateway::{JudgeGateway, JudgeOutcome, UnavailableReason};
use koma_judge::judgments::MultimodalJudgment;
use koma_judge::prompts::window_prompt;

use crate::verdict::{NarrativeSignal, WindowResult};
use crate::window::{build_windows, span_label, Window};

/// Run CPU-bound or blocking file work off the async workers.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Internal(format!("blocking task failed: {e}")))
}

/// Confidence-weighted mean of pair continuity scores; neutral when no pair
/// carries any confidence.
pub fn visual_signal(pairs: &[PairAnalysis]) -> f64 {
    let weighted: Vec<(f64, f64)> = pairs
        .iter()
        .map(|p| (p.continuity_score(), p.confidence))
        .collect();
    weighted_mean(&weighted).map_or(NEUTRAL_SCORE, clamp_unit)
}

/// Window composite. Without a judge score the visual signal carries the
/// full weight.
pub fn composite_score(judge: Option<f64>, visual: f64, config: &ValidationConfig) -> f64 {
    match judge {
        Some(judge) => clamp_unit(
            config.window_judge_weight * judge + config.window_visual_weight() * visual,
        ),
        None => clamp_unit(visual),
    }
}

/// Window results plus the sequence-level score.
#[derive(Debug, Clone)]
pub struct SequenceAssessment {
    pub window_results: Vec<WindowResult>,
    pub sequence_score: f64,
    pub band: AssessmentBand,
}

impl SequenceAssessment {
    /// Whether any window's judge chain was tried and failed.
    pub fn judge_exhausted(&self) -> bool {
        self.window_results
            .iter()
            .any(|w| w.judge.unavailable == Some(UnavailableReason::Exhausted))
    }
}

// ---------------------------------------------------------------------------
// SequenceAggregator
// ---------------------------------------------------------------------------

pub struct SequenceAggregator {
    analyzer: Arc<VisualAnalyzer>,
    gateway: Arc<JudgeGateway>,
    config: ValidationConfig,
}

impl SequenceAggregator {
    pub fn new(
        analyzer: Arc<VisualAnalyzer>,
        gateway: Arc<JudgeGateway>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            analyzer,
            gateway,
            config,
        }
    }

    /// Score every window of `sequence` in order.
    pub async fn assess(
        &self,
        sequence: &PanelSequence,
        cancel: &CancellationToken,
    ) -> Result<SequenceAssessment, CoreError> {
        let windows = build_windows(sequence.len(), self.config.window_length)?;
        let paths: Vec<PathBuf> = sequence
            .entries()
            .iter()
            .map(|e| e.artifact.image_reference.clone())
            .collect();

        tracing::info!(
            panels = sequence.len(),
            windows = windows.len(),
            window_length = self.config.window_length,
            "Assessing sequence coherence",
        );

        let mut pair_cache: Vec<Option<PairAnalysis>> = vec![None; sequence.len() - 1];
        let mut window_results = Vec::with_capacity(windows.len());

        for window in &windows {
            if cancel.is_cancelled() {
                tracing::info!(window = window.index, "Run cancelled before window");
                return Err(CoreError::Cancelled);
            }
            self.fill_pairs(window, &paths, &mut pair_cache).await?;
            let pairs: Vec<PairAnalysis> = window
                .pairs()
                .filter_map(|p| pair_cache[p].clone())
                .collect();
            let result = self.assess_window(sequence, window, &paths, pairs).await?;
            window_results.push(result);
        }

        let composites: Vec<f64> = window_results.iter().map(|w| w.coherence_score).collect();
        let sequence_score = mean(&composites).map_or(NEUTRAL_SCORE, clamp_unit);
        let band = AssessmentBand::classify(sequence_score, &self.config.bands);

        tracing::info!(
            sequence_score,
            band = band.as_str(),
            "Sequence coherence assessed",
        );

        Ok(SequenceAssessment {
            window_results,
            sequence_score,
            band,
        })
    }

    /// Analyze the window's pairs not already in the cache.
    async fn fill_pairs(
        &self,
        window: &Window,
        paths: &[PathBuf],
        cache: &mut [Option<PairAnalysis>],
    ) -> Result<(), CoreError> {
        let missing: Vec<(usize, PathBuf, PathBuf)> = window
            .pairs()
            .filter(|&p| cache[p].is_none())
            .map(|p| (p, paths[p].clone(), paths[p + 1].clone()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let analyzer = Arc::clone(&self.analyzer);
        let analysed = run_blocking(move || {
            missing
                .into_iter()
                .map(|(p, a, b)| (p, analyzer.analyze(&a, &b)))
                .collect::<Vec<_>>()
        })
        .await?;

        for (p, analysis) in analysed {
            cache[p] = Some(analysis);
        }
        Ok(())
    }

    async fn assess_window(
        &self,
        sequence: &PanelSequence,
        window: &Window,
        paths: &[PathBuf],
        pairs: Vec<PairAnalysis>,
    ) -> Result<WindowResult, CoreError> {
        let visual = visual_signal(&pairs);
        let outcome = self.judge_window(sequence, window, paths).await?;
        let judge = outcome.provenance();

        let mut issues = Vec::new();
        for (offset, pair) in pairs.iter().enumerate() {
            let first = window.start + offset;
            let span = span_label(first, first + 1);
            issues.extend(
                pair.issues
                    .iter()
                    .map(|i| Issue::new(i.category, format!("{span}: {}", i.message))),
            );
        }

        let window_span = span_label(window.start, window.end - 1);
        let narrative_signal = match &outcome {
            JudgeOutcome::Verdict { value, .. } => {
                issues.extend(value.issues_detected.iter().map(|text| {
                    Issue::new(IssueCategory::JudgeReported, format!("{window_span}: {text}"))
                }));
                Some(NarrativeSignal {
                    score: value.coherence_score,
                    recommend_human_review: value.recommend_human_review,
                    detailed_analysis: value.detailed_analysis.clone(),
                })
            }
            JudgeOutcome::Unavailable { reason, failures } => {
                let why = match reason {
                    UnavailableReason::NotConfigured => "no multimodal judge configured".to_string(),
                    UnavailableReason::Exhausted => {
                        format!("judge chain exhausted after {} attempts", failures.len())
                    }
                    UnavailableReason::Skipped => "no readable images to judge".to_string(),
                };
                issues.push(Issue::new(
                    IssueCategory::JudgeUnavailable,
                    format!("{window_span}: {why}; scored from visual signals only"),
                ));
                None
            }
        };

        let coherence_score = composite_score(
            narrative_signal.as_ref().map(|n| n.score),
            visual,
            &self.config,
        );
        if coherence_score < self.config.low_window_threshold {
            issues.push(Issue::new(
                IssueCategory::LowWindowScore,
                format!(
                    "{window_span}: coherence {coherence_score:.2} below {:.2}",
                    self.config.low_window_threshold
                ),
            ));
        }
        let reduced_confidence = narrative_signal.is_none();

        tracing::info!(
            window = window.index,
            panels = %window_span,
            visual,
            judge_backend = judge.backend.as_deref().unwrap_or("none"),
            coherence_score,
            reduced_confidence,
            issues = issues.len(),
            "Window assessed",
        );

        Ok(WindowResult {
            window_index: window.index,
            window_indices: window.panels().collect(),
            pair_analyses: pairs,
            visual_signal: visual,
            narrative_signal,
            judge,
            coherence_score,
            reduced_confidence,
            issues,
        })
    }

    async fn judge_window(
        &self,
        sequence: &PanelSequence,
        window: &Window,
        paths: &[PathBuf],
    ) -> Result<JudgeOutcome<MultimodalJudgment>, CoreError> {
        let window_paths = paths[window.panels()].to_vec();
        let images = run_blocking(move || {
            window_paths
                .iter()
                .filter_map(|path| match JudgeImage::from_path(path) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Panel left out of judge request");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await?;

        if images.is_empty() {
            return Ok(JudgeOutcome::skipped());
        }

        let metadata = sequence.metadata();
        let prompt = window_prompt(window.start, &metadata[window.panels()]);
        let request = JudgeRequest::multimodal(prompt, images);
        Ok(self.gateway.judge::<MultimodalJudgment>(&request).await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;
    use image::{Rgb, RgbImage};

    use koma_core::types::{Artifact, PanelEntry, SceneMetadata};

    use super::*;

    fn write_panel(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(64, 64, Rgb(color)).save(&path).unwrap();
        path
    }

    fn sequence(paths: Vec<PathBuf>) -> PanelSequence {
        PanelSequence::new(
            paths
                .into_iter()
                .enumerate()
                .map(|(i, path)| PanelEntry {
                    artifact: Artifact {
                        image_reference: path,
                        scene_index: i as u32,
                        chapter_index: 0,
                    },
                    metadata: SceneMetadata::default(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn aggregator() -> SequenceAggregator {
        SequenceAggregator::new(
            Arc::new(VisualAnalyzer::default()),
            Arc::new(JudgeGateway::offline()),
            ValidationConfig::default(),
        )
    }

    // -- scoring --------------------------------------------------------------

    #[test]
    fn composite_blends_judge_and_visual() {
        let config = ValidationConfig::default();
        assert!((composite_score(Some(0.9), 0.5, &config) - 0.74).abs() < 1e-9);
    }

    #[test]
    fn composite_without_judge_is_visual_only() {
        let config = ValidationConfig::default();
        assert_eq!(composite_score(None, 0.42, &config), 0.42);
    }

    #[test]
    fn unavailable_pairs_give_neutral_visual_signal() {
        let pairs = vec![
            PairAnalysis::unavailable("missing"),
            PairAnalysis::unavailable("missing"),
        ];
        assert_eq!(visual_signal(&pairs), NEUTRAL_SCORE);
        assert_eq!(visual_signal(&[]), NEUTRAL_SCORE);
    }

    // -- windows --------------------------------------------------------------

    #[tokio::test]
    async fn offline_run_is_reduced_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = (0..3)
            .map(|i| write_panel(dir.path(), &format!("{i}.png"), [40, 60, 200]))
            .collect();

        let assessment = aggregator()
            .assess(&sequence(paths), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(assessment.window_results.len(), 1);
        let window = &assessment.window_results[0];
        assert!(window.reduced_confidence);
        assert_eq!(window.judge.unavailable, Some(UnavailableReason::NotConfigured));
        assert_eq!(window.coherence_score, window.visual_signal);
        assert!(window
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::JudgeUnavailable));
        assert_eq!(assessment.sequence_score, window.coherence_score);
        assert!(!assessment.judge_exhausted());
    }

    #[tokio::test]
    async fn overlapping_windows_share_pair_analyses() {
        let dir = tempfile::tempdir().unwrap();
        let paths = (0..4)
            .map(|i| write_panel(dir.path(), &format!("{i}.png"), [40, 60, 200]))
            .collect();

        let assessment = aggregator()
            .assess(&sequence(paths), &CancellationToken::new())
            .await
            .unwrap();

        let windows = &assessment.window_results;
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].window_indices, vec![0, 1, 2]);
        assert_eq!(windows[1].window_indices, vec![1, 2, 3]);
        assert_eq!(windows[0].pair_analyses[1], windows[1].pair_analyses[0]);
    }

    #[tokio::test]
    async fn missing_images_degrade_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            dir.path().join("gone_0.png"),
            dir.path().join("gone_1.png"),
        ];

        let assessment = aggregator()
            .assess(&sequence(paths), &CancellationToken::new())
            .await
            .unwrap();

        let window = &assessment.window_results[0];
        assert_eq!(window.visual_signal, NEUTRAL_SCORE);
        assert_eq!(window.judge.unavailable, Some(UnavailableReason::Skipped));
        assert!(window.pair_analyses[0].is_unavailable());
        let unavailable = window
            .issues
            .iter()
            .find(|i| i.category == IssueCategory::ImageUnavailable)
            .unwrap();
        assert!(unavailable.message.starts_with("panels 0-1: "));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_window() {
        let dir = tempfile::tempdir().unwrap();
        let paths = (0..3)
            .map(|i| write_panel(dir.path(), &format!("{i}.png"), [10, 10, 10]))
            .collect();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = aggregator().assess(&sequence(paths), &cancel).await;
        assert_matches!(result, Err(CoreError::Cancelled));
    }
}
