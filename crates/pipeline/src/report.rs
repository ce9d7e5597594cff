//! Run report envelope, Markdown rendering, and persistence.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use koma_core::thresholds::THRESHOLDS_VERSION;

use crate::verdict::CoherenceVerdict;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A verdict stamped with run identity and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub thresholds_version: String,
    pub verdict: CoherenceVerdict,
}

/// Paths written by [`ValidationReport::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedReport {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

impl ValidationReport {
    pub fn new(verdict: CoherenceVerdict) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            thresholds_version: THRESHOLDS_VERSION.to_string(),
            verdict,
        }
    }

    fn file_stem(&self) -> String {
        format!("coherence_report_{}", self.run_id)
    }

    /// Write `coherence_report_<run_id>.json` and `.md` under `dir`.
    pub async fn write_to(&self, dir: &Path) -> Result<PersistedReport, ReportError> {
        tokio::fs::create_dir_all(dir).await?;
        let stem = self.file_stem();
        let json = dir.join(format!("{stem}.json"));
        let markdown = dir.join(format!("{stem}.md"));

        tokio::fs::write(&json, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::write(&markdown, self.to_markdown()).await?;
        Ok(PersistedReport { json, markdown })
    }

    /// Like [`write_to`](Self::write_to), but a failure is logged and
    /// swallowed so it never fails the run.
    pub async fn persist(&self, dir: &Path) -> Option<PersistedReport> {
        match self.write_to(dir).await {
            Ok(written) => {
                tracing::info!(
                    run_id = %self.run_id,
                    json = %written.json.display(),
                    markdown = %written.markdown.display(),
                    "Coherence report written",
                );
                Some(written)
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    dir = %dir.display(),
                    error = %e,
                    "Failed to persist coherence report",
                );
                None
            }
        }
    }

    /// Human-readable report.
    pub fn to_markdown(&self) -> String {
        let v = &self.verdict;
        let mut out = String::new();

        let _ = writeln!(out, "# Coherence Report\n");
        let _ = writeln!(out, "- Run: `{}`", self.run_id);
        let _ = writeln!(out, "- Generated: {}", self.timestamp.to_rfc3339());
        let _ = writeln!(out, "- Thresholds: {}", self.thresholds_version);
        let _ = writeln!(
            out,
            "- Overall score: **{:.2}** ({})",
            v.overall_score,
            v.assessment_band.as_str()
        );
        let _ = writeln!(out, "- Sequence score: {:.2}", v.sequence_score);
        let _ = writeln!(
            out,
            "- Thread score: {:.2} ({})",
            v.thread_report.thread_score,
            v.thread_report.thread_quality.as_str()
        );
        let review = if v.recommend_human_review { "yes" } else { "no" };
        let _ = writeln!(out, "- Human review recommended: **{review}**");
        for reason in &v.review_reasons {
            let _ = writeln!(out, "  - {reason}");
        }

        let _ = writeln!(out, "\n## Windows\n");
        let _ = writeln!(out, "| Window | Panels | Visual | Judge | Score | Reduced confidence |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for w in &v.window_results {
            let panels = match (w.window_indices.first(), w.window_indices.last()) {
                (Some(first), Some(last)) => format!("{first}-{last}"),
                _ => "-".to_string(),
            };
            let judge = w
                .narrative_signal
                .as_ref()
                .map_or("-".to_string(), |n| format!("{:.2}", n.score));
            let _ = writeln!(
                out,
                "| {} | {} | {:.2} | {} | {:.2} | {} |",
                w.window_index,
                panels,
                w.visual_signal,
                judge,
                w.coherence_score,
                if w.reduced_confidence { "yes" } else { "no" },
            );
        }

        let t = &v.thread_report;
        let _ = writeln!(out, "\n## Narrative Threads\n");
        let _ = writeln!(
            out,
            "- Speakers: {} ({}), threading {}",
            t.speaker_analysis.speaker_count,
            if t.speaker_analysis.consistent { "consistent" } else { "inconsistent" },
            t.speaker_analysis.threading
        );
        let _ = writeln!(
            out,
            "- Characters: {} (continuity {}, unexpected appearance {})",
            if t.character_analysis.characters.is_empty() {
                "none detected".to_string()
            } else {
                t.character_analysis.characters.join(", ")
            },
            t.character_analysis.continuity,
            t.character_analysis.unexpected_appearance
        );
        let _ = writeln!(
            out,
            "- Emotional arc: {:.2}, {} ({} valence reversals)",
            t.emotional_analysis.coherence_score,
            t.emotional_analysis.flow_quality,
            t.emotional_analysis.valence_reversals
        );

        if !v.issue_summary.is_empty() {
            let _ = writeln!(out, "\n## Issues\n");
            for issue in &v.issue_summary {
                let _ = writeln!(
                    out,
                    "- **{}** x{}: {}",
                    issue.category.as_str(),
                    issue.occurrences,
                    issue.example
                );
            }
        }

        if !v.recommendations.is_empty() {
            let _ = writeln!(out, "\n## Recommendations\n");
            for rec in &v.recommendations {
                let _ = writeln!(out, "- {}", rec.message);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
