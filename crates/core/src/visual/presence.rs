//! Character presence detection.
//!
//! A [`FeatureDetector`] finds candidate character regions in an image.
//! [`SkinToneDetector`] is the built-in heuristic: it marks coarse grid
//! cells dominated by skin-tone pixels and groups adjacent cells into
//! regions.

use std::collections::VecDeque;

use image::{DynamicImage, Rgb};
use serde::{Deserialize, Serialize};

use crate::visual::loader::downscale_rgb;

/// A detected region in normalized image coordinates (`0.0..=1.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Height divided by width; `0.0` for a zero-width region.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width <= 0.0 {
            0.0
        } else {
            self.height / self.width
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Face / character feature detector.
pub trait FeatureDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Detect candidate character regions.
    fn detect(&self, img: &DynamicImage) -> Vec<Region>;
}

// ---------------------------------------------------------------------------
// Presence observation
// ---------------------------------------------------------------------------

/// Presence result for a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceObservation {
    pub has_character: bool,
    pub region_count: usize,
}

impl PresenceObservation {
    pub fn from_regions(regions: &[Region]) -> Self {
        Self {
            has_character: !regions.is_empty(),
            region_count: regions.len(),
        }
    }
}

/// Presence results for both images of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceComparison {
    pub first: PresenceObservation,
    pub second: PresenceObservation,
    /// A character is present in exactly one of the two images.
    pub presence_changed: bool,
    /// Relative change in region count, in `[0, 1]`.
    pub delta: f64,
}

impl PresenceComparison {
    pub fn new(first: PresenceObservation, second: PresenceObservation) -> Self {
        let larger = first.region_count.max(second.region_count);
        let delta = if larger == 0 {
            0.0
        } else {
            first.region_count.abs_diff(second.region_count) as f64 / larger as f64
        };
        Self {
            first,
            second,
            presence_changed: first.has_character != second.has_character,
            delta,
        }
    }
}

// ---------------------------------------------------------------------------
// SkinToneDetector
// ---------------------------------------------------------------------------

/// Grid-based skin-tone region detector.
#[derive(Debug, Clone)]
pub struct SkinToneDetector {
    /// Longest edge the image is reduced to before scanning.
    pub working_size: u32,
    /// Cell edge length in working-size pixels.
    pub cell_size: u32,
    /// Fraction of skin pixels for a cell to count as skin.
    pub min_cell_ratio: f64,
    /// Smallest connected group of skin cells reported as a region.
    pub min_region_cells: usize,
}

impl Default for SkinToneDetector {
    fn default() -> Self {
        Self {
            working_size: 256,
            cell_size: 8,
            min_cell_ratio: 0.5,
            min_region_cells: 4,
        }
    }
}

/// Classic RGB skin-tone rule (uniform daylight).
pub fn is_skin_tone(pixel: &Rgb<u8>) -> bool {
    let [r, g, b] = pixel.0;
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && max - min > 15 && (r - g).abs() > 15 && r > g && r > b
}

impl FeatureDetector for SkinToneDetector {
    fn name(&self) -> &str {
        "skin_tone"
    }

    fn detect(&self, img: &DynamicImage) -> Vec<Region> {
        let small = downscale_rgb(img, self.working_size);
        let cell = self.cell_size.max(1);
        let cols = (small.width() / cell) as usize;
        let rows = (small.height() / cell) as usize;
        if cols == 0 || rows == 0 {
            return Vec::new();
        }

        let mut skin = vec![false; cols * rows];
        for row in 0..rows {
            for col in 0..cols {
                let mut hits = 0u32;
                for y in 0..cell {
                    for x in 0..cell {
                        let px = small.get_pixel(col as u32 * cell + x, row as u32 * cell + y);
                        if is_skin_tone(px) {
                            hits += 1;
                        }
                    }
                }
                skin[row * cols + col] = hits as f64 / (cell * cell) as f64 >= self.min_cell_ratio;
            }
        }

        connected_regions(&skin, cols, rows, self.min_region_cells)
    }
}

/// 4-connected components of `true` cells, as normalized bounding boxes.
fn connected_regions(cells: &[bool], cols: usize, rows: usize, min_cells: usize) -> Vec<Region> {
    let mut seen = vec![false; cells.len()];
    let mut regions = Vec::new();

    for start in 0..cells.len() {
        if !cells[start] || seen[start] {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        let (mut count, mut min_c, mut max_c, mut min_r, mut max_r) =
            (0usize, cols, 0usize, rows, 0usize);

        while let Some(idx) = queue.pop_front() {
            let (r, c) = (idx / cols, idx % cols);
            count += 1;
            min_c = min_c.min(c);
            max_c = max_c.max(c);
            min_r = min_r.min(r);
            max_r = max_r.max(r);

            let mut neighbours = Vec::with_capacity(4);
            if r > 0 {
                neighbours.push(idx - cols);
            }
            if r + 1 < rows {
                neighbours.push(idx + cols);
            }
            if c > 0 {
                neighbours.push(idx - 1);
            }
            if c + 1 < cols {
                neighbours.push(idx + 1);
            }
            for n in neighbours {
                if cells[n] && !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }

        if count >= min_cells {
            regions.push(Region {
                x: min_c as f64 / cols as f64,
                y: min_r as f64 / rows as f64,
                width: (max_c - min_c + 1) as f64 / cols as f64,
                height: (max_r - min_r + 1) as f64 / rows as f64,
            });
        }
    }
    regions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    const SKIN: Rgb<u8> = Rgb([224, 172, 138]);
    const WALL: Rgb<u8> = Rgb([40, 60, 120]);

    fn scene_with_faces(boxes: &[(u32, u32, u32, u32)]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(128, 128, |x, y| {
            let inside = boxes
                .iter()
                .any(|&(bx, by, bw, bh)| x >= bx && x < bx + bw && y >= by && y < by + bh);
            if inside {
                SKIN
            } else {
                WALL
            }
        }))
    }

    #[test]
    fn skin_rule() {
        assert!(is_skin_tone(&SKIN));
        assert!(!is_skin_tone(&WALL));
        assert!(!is_skin_tone(&Rgb([255, 255, 255])));
    }

    #[test]
    fn detects_separate_regions() {
        let img = scene_with_faces(&[(0, 0, 32, 48), (80, 64, 32, 32)]);
        let regions = SkinToneDetector::default().detect(&img);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].aspect_ratio() > 1.0);
    }

    #[test]
    fn empty_scene_has_no_regions() {
        let img = scene_with_faces(&[]);
        assert!(SkinToneDetector::default().detect(&img).is_empty());
    }

    #[test]
    fn specks_below_minimum_are_ignored() {
        let img = scene_with_faces(&[(0, 0, 8, 8)]);
        assert!(SkinToneDetector::default().detect(&img).is_empty());
    }

    // -- PresenceComparison ---------------------------------------------------

    #[test]
    fn presence_change_when_one_side_empty() {
        let with = PresenceObservation {
            has_character: true,
            region_count: 2,
        };
        let without = PresenceObservation {
            has_character: false,
            region_count: 0,
        };
        let cmp = PresenceComparison::new(with, without);
        assert!(cmp.presence_changed);
        assert_eq!(cmp.delta, 1.0);
    }

    #[test]
    fn no_change_when_both_empty() {
        let empty = PresenceObservation::from_regions(&[]);
        let cmp = PresenceComparison::new(empty, empty);
        assert!(!cmp.presence_changed);
        assert_eq!(cmp.delta, 0.0);
    }
}
