//! Issue categories recorded by analyzers, and category-level
//! de-duplication for run reports.

use serde::{Deserialize, Serialize};

/// What kind of anomaly (or unverifiable input) an issue describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// An image could not be loaded or decoded.
    ImageUnavailable,
    /// SSIM and histogram correlation both dropped below their cutoffs.
    AbruptSceneChange,
    /// A character is present in one panel of a pair but not the other.
    CharacterPresenceChange,
    /// Luminance shifted beyond the lighting cutoffs.
    LightingInconsistency,
    /// The judge chain produced no usable answer.
    JudgeUnavailable,
    /// The multimodal judge listed a problem of its own.
    JudgeReported,
    /// A window's composite score fell below the low-window threshold.
    LowWindowScore,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageUnavailable => "image_unavailable",
            Self::AbruptSceneChange => "abrupt_scene_change",
            Self::CharacterPresenceChange => "character_presence_change",
            Self::LightingInconsistency => "lighting_inconsistency",
            Self::JudgeUnavailable => "judge_unavailable",
            Self::JudgeReported => "judge_reported",
            Self::LowWindowScore => "low_window_score",
        }
    }
}

/// A single detected issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub message: String,
}

impl Issue {
    pub fn new(category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// All occurrences of one issue category across a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub category: IssueCategory,
    pub occurrences: usize,
    /// Message of the first occurrence, kept as the representative example.
    pub example: String,
    /// Window indices that reported this category, ascending and unique.
    /// Empty when every occurrence came from a run-level check.
    pub windows: Vec<usize>,
}

/// Collapse `(window_index, issue)` pairs into one summary per category,
/// ordered by category. Issues not tied to a window carry `None`.
pub fn summarize_by_category<'a, I>(issues: I) -> Vec<IssueSummary>
where
    I: IntoIterator<Item = (Option<usize>, &'a Issue)>,
{
    let mut summaries: Vec<IssueSummary> = Vec::new();
    for (window, issue) in issues {
        let index = match summaries.iter().position(|s| s.category == issue.category) {
            Some(index) => {
                summaries[index].occurrences += 1;
                index
            }
            None => {
                summaries.push(IssueSummary {
                    category: issue.category,
                    occurrences: 1,
                    example: issue.message.clone(),
                    windows: Vec::new(),
                });
                summaries.len() - 1
            }
        };
        if let Some(window) = window {
            if !summaries[index].windows.contains(&window) {
                summaries[index].windows.push(window);
            }
        }
    }
    for summary in &mut summaries {
        summary.windows.sort_unstable();
    }
    summaries.sort_by_key(|s| s.category);
    summaries
}
