//! Overlapping coherence windows.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use koma_core::error::CoreError;
use koma_core::thresholds::validate_window_length;
use koma_core::types::MIN_SEQUENCE_LENGTH;

/// A contiguous run of panels judged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Position of the window in the run.
    pub index: usize,
    /// First panel index (inclusive).
    pub start: usize,
    /// Last panel index (exclusive).
    pub end: usize,
}

impl Window {
    pub fn panels(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Pair indices inside the window; pair `i` compares panels `i` and `i + 1`.
    pub fn pairs(&self) -> Range<usize> {
        self.start..self.end.saturating_sub(1).max(self.start)
    }
}

/// Panel span label used as an issue prefix, e.g. `panels 2-3`.
pub fn span_label(first: usize, last: usize) -> String {
    format!("panels {first}-{last}")
}

/// Stride-1 windows of `window_length` panels over `sequence_len` panels.
///
/// A sequence shorter than the window (but at least two panels) gets one
/// window spanning every panel.
pub fn build_windows(sequence_len: usize, window_length: usize) -> Result<Vec<Window>, CoreError> {
    validate_window_length(window_length)?;
    if sequence_len < MIN_SEQUENCE_LENGTH {
        return Err(CoreError::Configuration(format!(
            "panel sequence needs at least {MIN_SEQUENCE_LENGTH} entries, got {sequence_len}"
        )));
    }

    if sequence_len < window_length {
        return Ok(vec![Window {
            index: 0,
            start: 0,
            end: sequence_len,
        }]);
    }

    Ok((0..=sequence_len - window_length)
        .map(|start| Window {
            index: start,
            start,
            end: start + window_length,
        })
        .collect())
}
