use crate::types::{round_to, BoundingBox, Detection, PlacementError};
use ndarray::parallel::prelude::*;
use ndarray::{s, Array2};
use std::ops::Range;
use tracing::debug;

/// Upper bound on mask size; protects the allocator from hostile dimensions.
pub const MAX_PIXELS: u64 = 200_000_000;

/// Binary raster, `true` where any obstruction covers the pixel.
/// Indexed `[row, col]`, i.e. `(height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyMask {
    grid: Array2<bool>,
}

impl OccupancyMask {
    pub fn new(width: u32, height: u32) -> Result<Self, PlacementError> {
        if width == 0 || height == 0 {
            return Err(PlacementError::InvalidDimensions {
                width,
                height,
                reason: "width and height must be positive",
            });
        }
        if u64::from(width) * u64::from(height) > MAX_PIXELS {
            return Err(PlacementError::InvalidDimensions {
                width,
                height,
                reason: "image exceeds the supported pixel count",
            });
        }

        Ok(Self {
            grid: Array2::from_elem((height as usize, width as usize), false),
        })
    }

    pub fn width(&self) -> usize {
        self.grid.ncols()
    }

    pub fn height(&self) -> usize {
        self.grid.nrows()
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.grid.get((y, x)).copied().unwrap_or(false)
    }

    pub fn total_pixels(&self) -> usize {
        self.grid.len()
    }

    pub fn occupied_pixels(&self) -> usize {
        self.grid.par_iter().filter(|&&occupied| occupied).count()
    }

    pub fn free_pixels(&self) -> usize {
        self.total_pixels() - self.occupied_pixels()
    }

    /// Percentage of unset pixels, rounded to 2 decimals.
    pub fn free_area_percent(&self) -> f64 {
        let free = self.free_pixels() as f64;
        round_to(free / self.total_pixels() as f64 * 100.0, 2)
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.grid
    }

    fn fill(&mut self, rect: &PixelRect) {
        self.grid
            .slice_mut(s![rect.rows.clone(), rect.cols.clone()])
            .fill(true);
    }
}

/// Rasterizer output.
#[derive(Debug, Clone)]
pub struct OccupancyResult {
    pub mask: OccupancyMask,
    pub free_area_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PixelRect {
    cols: Range<usize>,
    rows: Range<usize>,
}

/// Clamps a box into `[0, width] x [0, height]`.
///
/// Degenerate boxes and boxes that do not overlap the image at all are
/// rejected rather than dropped.
fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32) -> Result<PixelRect, PlacementError> {
    if bbox.is_degenerate() {
        return Err(PlacementError::InvalidBoundingBox {
            bbox: *bbox,
            reason: "degenerate rectangle (requires x1 < x2 and y1 < y2)".to_string(),
        });
    }

    let clamp = |v: i64, max: u32| v.clamp(0, i64::from(max)) as usize;
    let (x1, x2) = (clamp(bbox.x1, width), clamp(bbox.x2, width));
    let (y1, y2) = (clamp(bbox.y1, height), clamp(bbox.y2, height));

    if x1 == x2 || y1 == y2 {
        return Err(PlacementError::InvalidBoundingBox {
            bbox: *bbox,
            reason: format!("lies outside the {}x{} image", width, height),
        });
    }

    Ok(PixelRect {
        cols: x1..x2,
        rows: y1..y2,
    })
}

/// Draws every detection onto a fresh mask and measures the free area.
///
/// All detections are validated before anything is drawn, so an error never
/// leaves a partially rasterized mask behind. Overlaps are a set union.
pub fn rasterize(
    width: u32,
    height: u32,
    detections: &[Detection],
) -> Result<OccupancyResult, PlacementError> {
    let mut mask = OccupancyMask::new(width, height)?;

    let rects = detections
        .iter()
        .map(|d| {
            d.validate()?;
            pixel_rect(&d.bbox, width, height)
        })
        .collect::<Result<Vec<_>, _>>()?;

    for rect in &rects {
        mask.fill(rect);
    }

    let free_area_percent = mask.free_area_percent();
    debug!(
        width,
        height,
        obstructions = rects.len(),
        free_area_percent,
        "rasterized occupancy mask"
    );

    Ok(OccupancyResult {
        mask,
        free_area_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObstacleLabel;

    fn det(x1: i64, y1: i64, x2: i64, y2: i64) -> Detection {
        Detection {
            label: ObstacleLabel::Tree,
            confidence: 0.8,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn empty_detections_leave_everything_free() {
        let result = rasterize(640, 480, &[]).unwrap();
        assert_eq!(result.free_area_percent, 100.0);
        assert_eq!(result.mask.occupied_pixels(), 0);
        assert_eq!(result.mask.width(), 640);
        assert_eq!(result.mask.height(), 480);
    }

    #[test]
    fn full_cover_is_zero_free() {
        let result = rasterize(37, 23, &[det(10, 5, 20, 9), det(0, 0, 37, 23)]).unwrap();
        assert_eq!(result.free_area_percent, 0.0);
    }

    #[test]
    fn half_image_box() {
        let result = rasterize(1000, 1000, &[det(0, 0, 500, 1000)]).unwrap();
        assert_eq!(result.mask.occupied_pixels(), 500_000);
        assert_eq!(result.free_area_percent, 50.0);
        assert!(result.mask.is_occupied(499, 999));
        assert!(!result.mask.is_occupied(500, 0));
    }

    #[test]
    fn overlaps_do_not_double_count() {
        let result = rasterize(10, 10, &[det(0, 0, 5, 5), det(0, 0, 5, 5), det(2, 2, 6, 6)]).unwrap();
        // 25 + (16 - 9 overlap)
        assert_eq!(result.mask.occupied_pixels(), 32);
        assert_eq!(result.free_area_percent, 68.0);
    }

    #[test]
    fn boxes_spilling_past_the_edge_are_clamped() {
        let result = rasterize(10, 10, &[det(-3, 8, 4, 14)]).unwrap();
        assert_eq!(result.mask.occupied_pixels(), 4 * 2);
    }

    #[test]
    fn degenerate_box_is_rejected() {
        let err = rasterize(10, 10, &[det(4, 4, 4, 8)]).unwrap_err();
        assert!(matches!(err, PlacementError::InvalidBoundingBox { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn box_outside_image_is_rejected() {
        let err = rasterize(10, 10, &[det(0, 0, 2, 2), det(12, 0, 20, 5)]).unwrap_err();
        assert!(matches!(err, PlacementError::InvalidBoundingBox { .. }));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            rasterize(0, 10, &[]),
            Err(PlacementError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            rasterize(100_000, 100_000, &[]),
            Err(PlacementError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn rounding_to_two_decimals() {
        // 1 of 3 pixels occupied -> 66.666..%
        let result = rasterize(3, 1, &[det(0, 0, 1, 1)]).unwrap();
        assert_eq!(result.free_area_percent, 66.67);
    }

    #[test]
    fn near_full_cover_rounds_on_exact_fraction() {
        // 1 free pixel of 4000 is 0.025%, stored just above the tie
        let one_free = rasterize(80, 50, &[det(0, 0, 80, 49), det(0, 49, 79, 50)]).unwrap();
        assert_eq!(one_free.mask.free_pixels(), 1);
        assert_eq!(one_free.free_area_percent, 0.03);

        let three_free = rasterize(80, 50, &[det(0, 0, 80, 49), det(0, 49, 77, 50)]).unwrap();
        assert_eq!(three_free.mask.free_pixels(), 3);
        assert_eq!(three_free.free_area_percent, 0.07);
    }
}
