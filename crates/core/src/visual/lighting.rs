//! Lighting consistency on the luma (Y of YCrCb) channel.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::scores::clamp_unit;
use crate::thresholds::VisualThresholds;
use crate::visual::histogram::{correlation, intensity_histogram};

/// Luma comparison between two images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingComparison {
    pub mean_luma_first: f64,
    pub mean_luma_second: f64,
    /// Absolute mean-luma difference on the 0-255 scale.
    pub mean_luma_delta: f64,
    /// Luma histogram correlation, clamped to `[0, 1]`.
    pub luma_histogram_correlation: f64,
    /// Both the delta and the correlation are within their cutoffs.
    pub consistent: bool,
}

/// BT.601 luma, as used by the YCrCb conversion.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn luma_channel(img: &RgbImage) -> Vec<u8> {
    img.pixels().map(|p| luma(p[0], p[1], p[2])).collect()
}

fn mean(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Compare mean luma and luma distribution of two images.
pub fn compare_lighting(
    a: &RgbImage,
    b: &RgbImage,
    thresholds: &VisualThresholds,
) -> LightingComparison {
    let luma_a = luma_channel(a);
    let luma_b = luma_channel(b);

    let mean_a = mean(&luma_a);
    let mean_b = mean(&luma_b);
    let delta = (mean_a - mean_b).abs();
    let hist_corr = clamp_unit(correlation(
        &intensity_histogram(luma_a),
        &intensity_histogram(luma_b),
    ));

    LightingComparison {
        mean_luma_first: mean_a,
        mean_luma_second: mean_b,
        mean_luma_delta: delta,
        luma_histogram_correlation: hist_corr,
        consistent: delta < thresholds.lighting_max_luma_delta
            && hist_corr >= thresholds.lighting_min_correlation,
    }
}
