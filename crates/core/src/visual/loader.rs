//! Image loading and shared resampling helpers.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};

/// Longest edge images are downscaled to before pixel comparison.
pub const ANALYSIS_MAX_DIMENSION: u32 = 512;

/// Errors from opening a panel image.
#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("could not decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Open and decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, ImageLoadError> {
    if !path.is_file() {
        return Err(ImageLoadError::NotFound(path.display().to_string()));
    }
    image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.display().to_string(),
        source,
    })
}

/// Grayscale copies of both images resized to their common (smaller)
/// dimensions, capped at [`ANALYSIS_MAX_DIMENSION`].
pub fn common_grayscale(a: &DynamicImage, b: &DynamicImage) -> (GrayImage, GrayImage) {
    let (width, height) = common_dimensions(a, b);
    (
        resize_gray(&a.to_luma8(), width, height),
        resize_gray(&b.to_luma8(), width, height),
    )
}

/// RGB copy of `img` whose longest edge is at most `max_edge`. Smaller
/// images are returned at their original size.
pub fn downscale_rgb(img: &DynamicImage, max_edge: u32) -> RgbImage {
    if img.width().max(img.height()) > max_edge {
        img.thumbnail(max_edge, max_edge).to_rgb8()
    } else {
        img.to_rgb8()
    }
}

fn common_dimensions(a: &DynamicImage, b: &DynamicImage) -> (u32, u32) {
    let width = a.width().min(b.width()).max(1);
    let height = a.height().min(b.height()).max(1);
    let longest = width.max(height);
    if longest <= ANALYSIS_MAX_DIMENSION {
        return (width, height);
    }
    let scale = ANALYSIS_MAX_DIMENSION as f64 / longest as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

fn resize_gray(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    if img.width() == width && img.height() == height {
        img.clone()
    } else {
        imageops::resize(img, width, height, FilterType::Triangle)
    }
}
