//! Affine georeferencing for north-up rasters

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Extent;

/// Affine mapping between pixel indices and world coordinates.
///
/// Only north-up grids are supported: no rotation terms, `pixel_height`
/// negative (row index grows southwards).
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X, positive
    pub pixel_width: f64,
    /// Cell size in Y, negative
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Result<Self> {
        if pixel_width <= 0.0 || pixel_height >= 0.0 {
            return Err(Error::Input(format!(
                "Only north-up grids supported (pixel_width {pixel_width} must be > 0, pixel_height {pixel_height} must be < 0)"
            )));
        }
        Ok(Self { origin_x, origin_y, pixel_width, pixel_height })
    }

    /// Transform covering an extent with the given cell sizes; also returns
    /// the grid dimensions as (cols, rows)
    pub fn for_extent(extent: Extent, pixel_width: f64, pixel_height: f64) -> Result<(Self, usize, usize)> {
        let transform = Self::new(extent.min_x, extent.max_y, pixel_width, pixel_height)?;
        let cols = (extent.width() / pixel_width).ceil().max(1.0) as usize;
        let rows = (extent.height() / pixel_height.abs()).ceil().max(1.0) as usize;
        Ok((transform, cols, rows))
    }

    /// World coordinates of a pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// World coordinates of a pixel's top-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
        )
    }

    /// Fractional pixel indices for a world coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    pub fn cell_width(&self) -> f64 {
        self.pixel_width
    }

    pub fn cell_height(&self) -> f64 {
        self.pixel_height.abs()
    }

    /// Extent of a grid of the given dimensions under this transform
    pub fn extent(&self, cols: usize, rows: usize) -> Extent {
        Extent {
            min_x: self.origin_x,
            min_y: self.origin_y + rows as f64 * self.pixel_height,
            max_x: self.origin_x + cols as f64 * self.pixel_width,
            max_y: self.origin_y,
        }
    }

    /// Transform of a sub-grid starting at the given pixel offset
    pub fn for_window_origin(&self, col_off: usize, row_off: usize) -> GeoTransform {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(col_off, row_off);
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width: self.pixel_width,
            pixel_height: self.pixel_height,
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            pixel_width: 1.0,
            pixel_height: -1.0,
        }
    }
}
