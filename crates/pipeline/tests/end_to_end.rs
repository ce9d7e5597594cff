//! Full validation runs over generated panel images with in-process judges.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use koma_core::error::CoreError;
use koma_core::issues::IssueCategory;
use koma_core::thresholds::ValidationConfig;
use koma_core::types::{Artifact, PanelEntry, PanelSequence, SceneMetadata};
use koma_core::visual::VisualAnalyzer;
use koma_judge::backend::{BackendKind, Capability, JudgeBackend, JudgeRequest};
use koma_judge::error::BackendError;
use koma_judge::gateway::{JudgeGateway, UnavailableReason};
use koma_judge::retry::RetryPolicy;
use koma_judge::rotation::JudgeRotation;
use koma_pipeline::{ValidationOrchestrator, ValidationReport};

/// Answers every call with the same text, or fails every call when `reply`
/// is `None`.
struct Scripted {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl Scripted {
    fn answering(reply: String) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl JudgeBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalPreferred
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn complete(
        &self,
        _request: &JudgeRequest,
        _credential: Option<&str>,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| BackendError::Transport("connection refused".into()))
    }
}

/// Answers requests that carry images and refuses text-only ones, so window
/// judgments succeed while every thread judgment fails.
struct ImagesOnly {
    reply: String,
}

#[async_trait]
impl JudgeBackend for ImagesOnly {
    fn name(&self) -> &str {
        "images-only"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalPreferred
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn complete(
        &self,
        request: &JudgeRequest,
        _credential: Option<&str>,
    ) -> Result<String, BackendError> {
        if request.images.is_empty() {
            return Err(BackendError::Http {
                status: 503,
                body: "text model offline".into(),
            });
        }
        Ok(self.reply.clone())
    }
}

fn window_reply() -> String {
    json!({
        "overall_coherence": {"coherence_score": 0.9},
        "issues_detected": ["hero's scarf changes colour"],
        "recommend_human_review": false,
        "consistent": true,
        "continuity": true,
        "coherence_score": 0.85,
        "flow_quality": "natural"
    })
    .to_string()
}

fn gateway_with(backend: Arc<dyn JudgeBackend>) -> Arc<JudgeGateway> {
    Arc::new(JudgeGateway::new(
        vec![backend],
        Vec::new(),
        Arc::new(JudgeRotation::new()),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
        },
    ))
}

fn orchestrator(gateway: Arc<JudgeGateway>) -> ValidationOrchestrator {
    ValidationOrchestrator::new(
        Arc::new(VisualAnalyzer::default()),
        gateway,
        ValidationConfig::default(),
    )
    .unwrap()
}

fn write_panel(dir: &Path, index: usize) -> PathBuf {
    let path = dir.join(format!("panel_{index}.png"));
    RgbImage::from_pixel(96, 96, Rgb([70, 110, 190]))
        .save(&path)
        .unwrap();
    path
}

/// Identical solid panels carrying the given emotions, all standing.
fn panels(dir: &Path, emotions: &[&str]) -> PanelSequence {
    let entries = emotions
        .iter()
        .enumerate()
        .map(|(i, emotion)| PanelEntry {
            artifact: Artifact {
                image_reference: write_panel(dir, i),
                scene_index: i as u32,
                chapter_index: 1,
            },
            metadata: SceneMetadata {
                description: "The hero stands in the park".into(),
                intended_emotion: Some(emotion.to_string()),
                intended_pose: Some("standing".into()),
                ..Default::default()
            },
        })
        .collect();
    PanelSequence::new(entries).unwrap()
}

// -- heuristic-only runs ------------------------------------------------------

#[tokio::test]
async fn monotone_sequence_passes_without_review() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy"; 5]);

    let verdict = orchestrator(Arc::new(JudgeGateway::offline()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict.window_results.len(), 3);
    assert!(verdict.window_results.iter().all(|w| w.reduced_confidence));
    assert!(verdict.overall_score >= 0.8, "overall {}", verdict.overall_score);
    assert_eq!(verdict.thread_report.emotional_analysis.flow_quality, "monotone");
    assert!(!verdict.recommend_human_review, "{:?}", verdict.review_reasons);
    assert_eq!(verdict.panel_fingerprints.len(), 5);
    assert_eq!(verdict.panel_fingerprints[0].emotion.intended, "happy");
    assert_eq!(verdict.panel_fingerprints[0].pose.intended, "standing");
}

#[tokio::test]
async fn alternating_valence_is_jarring() {
    let dir = tempfile::tempdir().unwrap();
    let monotone = panels(dir.path(), &["happy"; 4]);
    let alternating = panels(dir.path(), &["happy", "devastated", "happy", "devastated"]);
    let orchestrator = orchestrator(Arc::new(JudgeGateway::offline()));
    let cancel = CancellationToken::new();

    let calm = orchestrator.run(&monotone, &cancel).await.unwrap();
    let jarring = orchestrator.run(&alternating, &cancel).await.unwrap();

    let emotional = &jarring.thread_report.emotional_analysis;
    assert_eq!(emotional.flow_quality, "jarring");
    assert_eq!(emotional.valence_reversals, 3);
    assert!(
        emotional.coherence_score
            < calm.thread_report.emotional_analysis.coherence_score - 0.1
    );
}

#[tokio::test]
async fn two_panels_with_default_window_make_one_window() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["calm", "calm"]);

    let verdict = orchestrator(Arc::new(JudgeGateway::offline()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict.window_results.len(), 1);
    assert_eq!(verdict.window_results[0].window_indices, vec![0, 1]);
    assert_eq!(verdict.window_results[0].pair_analyses.len(), 1);
}

// -- judged runs --------------------------------------------------------------

#[tokio::test]
async fn judge_verdicts_blend_into_windows_and_threads() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy", "happy", "calm"]);
    let backend = Scripted::answering(window_reply());

    let verdict = orchestrator(gateway_with(backend.clone()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    let window = &verdict.window_results[0];
    assert!(!window.reduced_confidence);
    assert_eq!(window.judge.backend.as_deref(), Some("scripted"));
    let expected = 0.6 * 0.9 + 0.4 * window.visual_signal;
    assert!((window.coherence_score - expected).abs() < 1e-9);
    assert!(window
        .issues
        .iter()
        .any(|i| i.category == IssueCategory::JudgeReported && i.message.starts_with("panels 0-2: ")));

    let threads = &verdict.thread_report;
    assert_eq!(threads.emotional_analysis.coherence_score, 0.85);
    assert_eq!(threads.emotional_analysis.flow_quality, "natural");
    // Window, character, and emotion calls; with no dialogue the speaker
    // check is skipped rather than sent.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        threads.speaker_analysis.source.unavailable,
        Some(UnavailableReason::Skipped)
    );
}

#[tokio::test]
async fn exhausted_judge_degrades_and_requests_review() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy"; 3]);
    let backend = Scripted::failing();

    let verdict = orchestrator(gateway_with(backend.clone()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict.window_results.len(), 1);
    let window = &verdict.window_results[0];
    assert!(window.reduced_confidence);
    assert_eq!(window.judge.unavailable, Some(UnavailableReason::Exhausted));
    assert_eq!(window.judge.attempts, 2);
    assert_eq!(window.coherence_score, window.visual_signal);
    assert!(verdict.recommend_human_review);
    assert!(verdict
        .review_reasons
        .iter()
        .any(|r| r.contains("judge chain exhausted")));
    assert!(verdict
        .issue_summary
        .iter()
        .any(|s| s.category == IssueCategory::JudgeUnavailable));
}

#[tokio::test]
async fn failed_thread_judges_are_listed_as_issues() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy", "happy", "calm"]);
    let backend = Arc::new(ImagesOnly {
        reply: window_reply(),
    });

    let verdict = orchestrator(gateway_with(backend))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!verdict.window_results[0].reduced_confidence);
    let threads = &verdict.thread_report;
    assert_eq!(
        threads.character_analysis.source.unavailable,
        Some(UnavailableReason::Exhausted)
    );
    assert_eq!(
        threads.emotional_analysis.source.unavailable,
        Some(UnavailableReason::Exhausted)
    );

    let unavailable = verdict
        .issue_summary
        .iter()
        .find(|s| s.category == IssueCategory::JudgeUnavailable)
        .expect("thread fallbacks listed");
    assert_eq!(unavailable.occurrences, 2);
    assert!(unavailable.windows.is_empty());
    assert!(unavailable.example.starts_with("character thread: "));
    assert!(verdict
        .review_reasons
        .iter()
        .any(|r| r.contains("judge chain exhausted")));
}

// -- degraded inputs ----------------------------------------------------------

#[tokio::test]
async fn partly_unreadable_window_keeps_its_readable_pair() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["calm"; 3]);
    std::fs::remove_file(&sequence.entries()[2].artifact.image_reference).unwrap();

    let verdict = orchestrator(Arc::new(JudgeGateway::offline()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    let window = &verdict.window_results[0];
    assert!(!window.pair_analyses[0].is_unavailable());
    assert!(window.pair_analyses[1].is_unavailable());
    let readable = window.pair_analyses[0].continuity_score();
    assert!((window.visual_signal - readable).abs() < 1e-9);
    assert!(window
        .issues
        .iter()
        .any(|i| i.category == IssueCategory::ImageUnavailable && i.message.starts_with("panels 1-2: ")));

    let unavailable = verdict
        .issue_summary
        .iter()
        .find(|s| s.category == IssueCategory::ImageUnavailable)
        .expect("unreadable panel listed");
    // One unavailable pair, plus the emotion and pose checks of panel 2.
    assert_eq!(unavailable.occurrences, 3);
    assert_eq!(unavailable.windows, vec![0]);
    assert!(verdict.panel_fingerprints[2].pose.image_error.is_some());
    assert!(verdict.panel_fingerprints[0].pose.image_error.is_none());
}

// -- run control --------------------------------------------------------------

#[tokio::test]
async fn manifest_with_one_panel_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    write_panel(dir.path(), 0);
    let manifest = dir.path().join("manifest.json");
    let records = json!([{ "image_reference": "panel_0.png", "scene_index": 0 }]);
    std::fs::write(&manifest, records.to_string()).unwrap();

    let result = orchestrator(Arc::new(JudgeGateway::offline()))
        .run_manifest(&manifest, &CancellationToken::new())
        .await;
    assert_matches!(result, Err(CoreError::Configuration(_)));
}

#[tokio::test]
async fn manifest_paths_resolve_against_manifest_dir() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write_panel(dir.path(), i);
    }
    let manifest = dir.path().join("manifest.json");
    let records = json!([
        { "image_reference": "panel_0.png", "scene_index": 0, "intended_emotion": "calm" },
        { "image_reference": "panel_1.png", "scene_index": 1, "intended_emotion": "calm" },
        { "image_reference": "panel_2.png", "scene_index": 2, "intended_emotion": "calm" }
    ]);
    std::fs::write(&manifest, records.to_string()).unwrap();

    let verdict = orchestrator(Arc::new(JudgeGateway::offline()))
        .run_manifest(&manifest, &CancellationToken::new())
        .await
        .unwrap();

    assert!(verdict
        .issue_summary
        .iter()
        .all(|s| s.category != IssueCategory::ImageUnavailable));
}

#[tokio::test]
async fn cancelled_run_returns_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy"; 4]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator(Arc::new(JudgeGateway::offline()))
        .run(&sequence, &cancel)
        .await;
    assert_matches!(result, Err(CoreError::Cancelled));
}

#[tokio::test]
async fn report_is_persisted_next_to_run() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = panels(dir.path(), &["happy"; 3]);
    let verdict = orchestrator(Arc::new(JudgeGateway::offline()))
        .run(&sequence, &CancellationToken::new())
        .await
        .unwrap();

    let report = ValidationReport::new(verdict);
    let written = report.persist(&dir.path().join("reports")).await.unwrap();

    assert!(written.json.exists());
    let markdown = std::fs::read_to_string(&written.markdown).unwrap();
    assert!(markdown.contains("## Windows"));
    assert!(markdown.contains("## Narrative Threads"));
}
