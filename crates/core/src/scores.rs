//! Score helpers shared by every analyzer: unit clamping, means, and the
//! assessment band used for both window sequences and narrative threads.

use serde::{Deserialize, Serialize};

use crate::thresholds::BandCutoffs;

/// Score returned by any metric that could not be computed.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Clamp a score into `[0.0, 1.0]`. NaN maps to `0.0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Weighted mean of `(value, weight)` pairs. Returns `None` when the total
/// weight is zero.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total <= f64::EPSILON {
        return None;
    }
    Some(pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total)
}

// ---------------------------------------------------------------------------
// AssessmentBand
// ---------------------------------------------------------------------------

/// Qualitative band for a coherence or thread score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AssessmentBand {
    /// Classify a score against the configured cutoffs.
    ///
    /// - `Excellent`: score >= excellent cutoff
    /// - `Good`:      score >= good cutoff
    /// - `Fair`:      score >= fair cutoff
    /// - `Poor`:      otherwise
    pub fn classify(score: f64, cutoffs: &BandCutoffs) -> Self {
        if score >= cutoffs.excellent {
            Self::Excellent
        } else if score >= cutoffs.good {
            Self::Good
        } else if score >= cutoffs.fair {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- clamp_unit -----------------------------------------------------------

    #[test]
    fn clamp_keeps_values_in_range() {
        assert_eq!(clamp_unit(0.42), 0.42);
        assert_eq!(clamp_unit(-0.3), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
    }

    #[test]
    fn clamp_maps_nan_to_zero() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }

    // -- mean / weighted_mean -------------------------------------------------

    #[test]
    fn mean_of_empty_is_none() {
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn weighted_mean_ignores_zero_weights() {
        let m = weighted_mean(&[(1.0, 1.0), (0.0, 0.0)]).unwrap();
        assert!((m - 1.0).abs() < 1e-9);
        assert!(weighted_mean(&[(0.3, 0.0)]).is_none());
    }

    // -- AssessmentBand -------------------------------------------------------

    #[test]
    fn band_boundaries() {
        let cutoffs = BandCutoffs::default();
        assert_eq!(AssessmentBand::classify(0.8, &cutoffs), AssessmentBand::Excellent);
        assert_eq!(AssessmentBand::classify(0.79, &cutoffs), AssessmentBand::Good);
        assert_eq!(AssessmentBand::classify(0.6, &cutoffs), AssessmentBand::Good);
        assert_eq!(AssessmentBand::classify(0.4, &cutoffs), AssessmentBand::Fair);
        assert_eq!(AssessmentBand::classify(0.39, &cutoffs), AssessmentBand::Poor);
    }
}
