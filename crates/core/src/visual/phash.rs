//! Perceptual hashing.
//!
//! [`PerceptualHasher`] is pluggable; [`DctHasher`] is the built-in 64-bit
//! DCT hash. When no hasher is configured the analyzer reports a neutral
//! similarity instead of failing.

use std::f64::consts::PI;

use image::imageops::FilterType;
use image::DynamicImage;

use crate::scores::{clamp_unit, NEUTRAL_SCORE};

/// A perceptual hash capability.
pub trait PerceptualHasher: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Number of meaningful bits in the hashes this hasher returns.
    fn bits(&self) -> u32;

    /// Hash an image, or `None` if the image cannot be hashed.
    fn hash(&self, img: &DynamicImage) -> Option<u64>;
}

/// Similarity in `[0, 1]` derived from the Hamming distance between hashes.
///
/// Returns [`NEUTRAL_SCORE`] when no hasher is available or either hash
/// fails.
pub fn perceptual_similarity(
    hasher: Option<&dyn PerceptualHasher>,
    a: &DynamicImage,
    b: &DynamicImage,
) -> f64 {
    let Some(hasher) = hasher else {
        return NEUTRAL_SCORE;
    };
    match (hasher.hash(a), hasher.hash(b)) {
        (Some(ha), Some(hb)) => {
            let distance = (ha ^ hb).count_ones() as f64;
            clamp_unit(1.0 - distance / hasher.bits().max(1) as f64)
        }
        _ => {
            tracing::debug!(hasher = hasher.name(), "Perceptual hash unavailable");
            NEUTRAL_SCORE
        }
    }
}

// ---------------------------------------------------------------------------
// DctHasher
// ---------------------------------------------------------------------------

const DCT_SIZE: usize = 32;
const LOW_FREQ: usize = 8;
const ZERO_TOLERANCE: f64 = 1e-9;

/// pHash over the low-frequency 8×8 DCT block, DC term included.
#[derive(Debug, Default, Clone, Copy)]
pub struct DctHasher;

impl PerceptualHasher for DctHasher {
    fn name(&self) -> &str {
        "dct"
    }

    fn bits(&self) -> u32 {
        (LOW_FREQ * LOW_FREQ) as u32
    }

    fn hash(&self, img: &DynamicImage) -> Option<u64> {
        if img.width() == 0 || img.height() == 0 {
            return None;
        }
        let small = img
            .resize_exact(DCT_SIZE as u32, DCT_SIZE as u32, FilterType::Triangle)
            .to_luma8();
        let pixels: Vec<f64> = small.as_raw().iter().map(|&p| p as f64).collect();
        let coefficients = dct_2d(&pixels, DCT_SIZE);

        let low: Vec<f64> = (0..LOW_FREQ)
            .flat_map(|v| (0..LOW_FREQ).map(move |u| v * DCT_SIZE + u))
            .map(|i| coefficients[i])
            .collect();

        let mut sorted = low.clone();
        sorted.sort_by(f64::total_cmp);
        let median = sorted[sorted.len() / 2];

        let hash = low.iter().enumerate().fold(0u64, |acc, (bit, &c)| {
            if c > median + ZERO_TOLERANCE {
                acc | (1u64 << bit)
            } else {
                acc
            }
        });
        Some(hash)
    }
}

/// Separable type-II DCT over a square `size × size` row-major matrix.
fn dct_2d(input: &[f64], size: usize) -> Vec<f64> {
    let table: Vec<f64> = (0..size * size)
        .map(|i| {
            let (k, n) = (i / size, i % size);
            (PI / size as f64 * (n as f64 + 0.5) * k as f64).cos()
        })
        .collect();

    let mut rows = vec![0.0; size * size];
    for y in 0..size {
        for k in 0..size {
            rows[y * size + k] = (0..size)
                .map(|n| input[y * size + n] * table[k * size + n])
                .sum();
        }
    }

    let mut out = vec![0.0; size * size];
    for x in 0..size {
        for k in 0..size {
            out[k * size + x] = (0..size)
                .map(|n| rows[n * size + x] * table[k * size + n])
                .sum();
        }
    }
    out
}
