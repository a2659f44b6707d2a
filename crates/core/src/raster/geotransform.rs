//! North-up georeferencing of a raster grid

use serde::{Deserialize, Serialize};

/// Pixel-to-map transform of a north-up image.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual top-down row order. Every band
/// of every image in a series is expected to share one transform; outputs
/// inherit it from the first image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a `rows` x `cols` grid
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let x_end = self.origin_x + cols as f64 * self.pixel_width;
        let y_end = self.origin_y + rows as f64 * self.pixel_height;
        (
            self.origin_x.min(x_end),
            self.origin_y.min(y_end),
            self.origin_x.max(x_end),
            self.origin_y.max(y_end),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
