//! Color and luminance histogram comparison.

use image::RgbImage;

use crate::scores::clamp_unit;

/// Bins per channel of the 3-D color histogram.
pub const COLOR_BINS_PER_CHANNEL: usize = 8;

/// Normalized 3-D RGB histogram (`COLOR_BINS_PER_CHANNEL³` bins summing to 1).
pub fn color_histogram(img: &RgbImage) -> Vec<f64> {
    let bins = COLOR_BINS_PER_CHANNEL;
    let width = 256 / bins;
    let mut hist = vec![0.0; bins * bins * bins];
    for pixel in img.pixels() {
        let [r, g, b] = pixel.0;
        let index = (r as usize / width) * bins * bins + (g as usize / width) * bins + b as usize / width;
        hist[index] += 1.0;
    }
    normalize(&mut hist);
    hist
}

/// Normalized 256-bin histogram over arbitrary intensity samples.
pub fn intensity_histogram<I>(samples: I) -> Vec<f64>
where
    I: IntoIterator<Item = u8>,
{
    let mut hist = vec![0.0; 256];
    for sample in samples {
        hist[sample as usize] += 1.0;
    }
    normalize(&mut hist);
    hist
}

fn normalize(hist: &mut [f64]) {
    let total: f64 = hist.iter().sum();
    if total > 0.0 {
        hist.iter_mut().for_each(|v| *v /= total);
    }
}

/// Pearson correlation between two histograms of equal length, in `[-1, 1]`.
///
/// Degenerate (zero-variance) histograms correlate at `1.0` when equal and
/// `0.0` otherwise.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut num, mut den_a, mut den_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        num += dx * dy;
        den_a += dx * dx;
        den_b += dy * dy;
    }

    let den = (den_a * den_b).sqrt();
    if den <= f64::EPSILON {
        return if a == b { 1.0 } else { 0.0 };
    }
    num / den
}

/// 3-D color histogram correlation between two images, clamped to `[0, 1]`.
pub fn histogram_correlation(a: &RgbImage, b: &RgbImage) -> f64 {
    clamp_unit(correlation(&color_histogram(a), &color_histogram(b)))
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn histogram_sums_to_one() {
        let img = RgbImage::from_fn(10, 10, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 0]));
        let total: f64 = color_histogram(&img).iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_images_correlate_fully() {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 30, 30]));
        assert!((histogram_correlation(&img, &img) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_colors_do_not_correlate() {
        let red = RgbImage::from_pixel(8, 8, Rgb([250, 0, 0]));
        let blue = RgbImage::from_pixel(8, 8, Rgb([0, 0, 250]));
        assert!(histogram_correlation(&red, &blue) < 0.01);
    }

    #[test]
    fn intensity_histogram_counts_samples() {
        let hist = intensity_histogram(vec![0u8, 0, 255, 255]);
        assert!((hist[0] - 0.5).abs() < 1e-9);
        assert!((hist[255] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn correlation_handles_mismatched_lengths() {
        assert_eq!(correlation(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
