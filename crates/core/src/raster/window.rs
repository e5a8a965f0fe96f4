//! Pixel windows: rectangular index ranges into a grid

use crate::geometry::Extent;
use crate::raster::GeoTransform;

/// A rectangular pixel region, clamped to grid bounds on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub cols: usize,
    pub rows: usize,
}

impl Window {
    pub fn new(col_off: usize, row_off: usize, cols: usize, rows: usize) -> Self {
        Window { col_off, row_off, cols, rows }
    }

    /// The smallest window covering a world extent, clamped to a grid of
    /// `grid_cols` x `grid_rows`. Returns `None` when the extent misses
    /// the grid entirely.
    pub fn from_extent(
        extent: &Extent,
        transform: &GeoTransform,
        grid_cols: usize,
        grid_rows: usize,
    ) -> Option<Window> {
        // Upper-left world corner maps to the lowest pixel indices
        let (c0, r0) = transform.geo_to_pixel(extent.min_x, extent.max_y);
        let (c1, r1) = transform.geo_to_pixel(extent.max_x, extent.min_y);

        let col_start = c0.floor().max(0.0) as usize;
        let row_start = r0.floor().max(0.0) as usize;
        let col_end = (c1.ceil() as isize).min(grid_cols as isize);
        let row_end = (r1.ceil() as isize).min(grid_rows as isize);

        if col_end <= col_start as isize || row_end <= row_start as isize {
            return None;
        }
        if col_start >= grid_cols || row_start >= grid_rows {
            return None;
        }

        Some(Window {
            col_off: col_start,
            row_off: row_start,
            cols: col_end as usize - col_start,
            rows: row_end as usize - row_start,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Exclusive end column
    pub fn col_end(&self) -> usize {
        self.col_off + self.cols
    }

    /// Exclusive end row
    pub fn row_end(&self) -> usize {
        self.row_off + self.rows
    }
}

/// Iterator over fixed-size tiles covering a grid, row-major
#[derive(Debug, Clone)]
pub struct TileIterator {
    grid_cols: usize,
    grid_rows: usize,
    tile_size: usize,
    next_col: usize,
    next_row: usize,
}

impl TileIterator {
    pub fn new(grid_cols: usize, grid_rows: usize, tile_size: usize) -> Self {
        TileIterator {
            grid_cols,
            grid_rows,
            tile_size: tile_size.max(1),
            next_col: 0,
            next_row: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next_row >= self.grid_rows || self.grid_cols == 0 {
            return None;
        }
        let window = Window {
            col_off: self.next_col,
            row_off: self.next_row,
            cols: self.tile_size.min(self.grid_cols - self.next_col),
            rows: self.tile_size.min(self.grid_rows - self.next_row),
        };
        self.next_col += self.tile_size;
        if self.next_col >= self.grid_cols {
            self.next_col = 0;
            self.next_row += self.tile_size;
        }
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::new(0.0, 100.0, 1.0, -1.0).unwrap()
    }

    #[test]
    fn test_window_from_extent_inside() {
        let e = Extent::new(10.0, 80.0, 20.0, 90.0).unwrap();
        let w = Window::from_extent(&e, &transform(), 100, 100).unwrap();
        assert_eq!(w, Window::new(10, 10, 10, 10));
    }

    #[test]
    fn test_window_clamped_to_grid() {
        let e = Extent::new(-5.0, 95.0, 5.0, 110.0).unwrap();
        let w = Window::from_extent(&e, &transform(), 100, 100).unwrap();
        assert_eq!(w.col_off, 0);
        assert_eq!(w.row_off, 0);
        assert_eq!(w.cols, 5);
        assert_eq!(w.rows, 5);
    }

    #[test]
    fn test_window_disjoint_is_none() {
        let e = Extent::new(200.0, 200.0, 300.0, 300.0).unwrap();
        assert!(Window::from_extent(&e, &transform(), 100, 100).is_none());
    }

    #[test]
    fn test_tiles_cover_grid_disjointly() {
        let tiles: Vec<Window> = TileIterator::new(100, 70, 32).collect();
        let total: usize = tiles.iter().map(Window::len).sum();
        assert_eq!(total, 100 * 70);
        // Edge tiles are trimmed
        assert!(tiles.iter().all(|t| t.col_end() <= 100 && t.row_end() <= 70));
        assert_eq!(tiles.len(), 4 * 3);
    }
}
