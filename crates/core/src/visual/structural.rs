//! Structural similarity between two grayscale images.
//!
//! Tries block SSIM first, then normalized cross-correlation, then falls
//! back to [`NEUTRAL_SCORE`].

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::scores::{clamp_unit, NEUTRAL_SCORE};

/// Side length of the square SSIM block.
pub const SSIM_BLOCK: u32 = 8;
/// Step between neighbouring SSIM blocks.
pub const SSIM_STRIDE: u32 = 4;

const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Which metric produced a structural score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralMethod {
    Ssim,
    CrossCorrelation,
    Neutral,
}

/// Structural score plus the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralScore {
    pub value: f64,
    pub method: StructuralMethod,
}

/// Compare two same-sized grayscale images, falling back through
/// SSIM → NCC → neutral.
pub fn structural_similarity(a: &GrayImage, b: &GrayImage) -> StructuralScore {
    if let Some(value) = ssim(a, b) {
        return StructuralScore {
            value,
            method: StructuralMethod::Ssim,
        };
    }
    if let Some(value) = normalized_cross_correlation(a, b) {
        return StructuralScore {
            value,
            method: StructuralMethod::CrossCorrelation,
        };
    }
    StructuralScore {
        value: NEUTRAL_SCORE,
        method: StructuralMethod::Neutral,
    }
}

/// Mean SSIM over overlapping blocks, clamped to `[0, 1]`.
///
/// Returns `None` when the images differ in size or are smaller than one
/// block.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let (width, height) = a.dimensions();
    if width < SSIM_BLOCK || height < SSIM_BLOCK {
        return None;
    }

    let mut total = 0.0;
    let mut blocks = 0usize;
    let mut y = 0;
    while y + SSIM_BLOCK <= height {
        let mut x = 0;
        while x + SSIM_BLOCK <= width {
            total += block_ssim(a, b, x, y);
            blocks += 1;
            x += SSIM_STRIDE;
        }
        y += SSIM_STRIDE;
    }

    if blocks == 0 {
        return None;
    }
    Some(clamp_unit(total / blocks as f64))
}

fn block_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32) -> f64 {
    let n = (SSIM_BLOCK * SSIM_BLOCK) as f64;
    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    for y in y0..y0 + SSIM_BLOCK {
        for x in x0..x0 + SSIM_BLOCK {
            sum_a += a.get_pixel(x, y)[0] as f64;
            sum_b += b.get_pixel(x, y)[0] as f64;
        }
    }
    let (mu_a, mu_b) = (sum_a / n, sum_b / n);

    let (mut var_a, mut var_b, mut cov) = (0.0, 0.0, 0.0);
    for y in y0..y0 + SSIM_BLOCK {
        for x in x0..x0 + SSIM_BLOCK {
            let da = a.get_pixel(x, y)[0] as f64 - mu_a;
            let db = b.get_pixel(x, y)[0] as f64 - mu_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    ((2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2))
        / ((mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2))
}

/// Pearson correlation of pixel intensities, clamped to `[0, 1]`.
///
/// Returns `None` for mismatched sizes or when either image has zero
/// variance.
pub fn normalized_cross_correlation(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() || a.as_raw().is_empty() {
        return None;
    }
    let n = a.as_raw().len() as f64;
    let mean_a = a.as_raw().iter().map(|&p| p as f64).sum::<f64>() / n;
    let mean_b = b.as_raw().iter().map(|&p| p as f64).sum::<f64>() / n;

    let (mut num, mut den_a, mut den_b) = (0.0, 0.0, 0.0);
    for (&pa, &pb) in a.as_raw().iter().zip(b.as_raw()) {
        let da = pa as f64 - mean_a;
        let db = pb as f64 - mean_b;
        num += da * db;
        den_a += da * da;
        den_b += db * db;
    }

    let den = (den_a * den_b).sqrt();
    if den <= f64::EPSILON {
        return None;
    }
    Some(clamp_unit(num / den))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
