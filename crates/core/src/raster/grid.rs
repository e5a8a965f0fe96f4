//! Main Raster type

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::geometry::Extent;
use crate::raster::{GeoTransform, RasterElement, Window};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in row-major order along with a
/// north-up [`GeoTransform`], an optional [`Crs`] and an optional nodata
/// sentinel. Operations never mutate their inputs; they build new grids.
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros and a default transform
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::Input(format!(
                "Data length {} does not match {rows}x{cols} grid",
                data.len()
            )));
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Input(e.to_string()))?;
        Ok(Self {
            data: array,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        })
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// New grid of the given shape filled with nodata, carrying the given
    /// georeferencing and this raster's CRS/nodata metadata
    pub fn nodata_like(&self, rows: usize, cols: usize, transform: GeoTransform) -> Self {
        let fill = self.nodata.unwrap_or_else(T::default_nodata);
        Self {
            data: Array2::from_elem((rows, cols), fill),
            transform,
            crs: self.crs,
            nodata: Some(fill),
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data.get((row, col)).copied().ok_or_else(|| {
            Error::Input(format!(
                "Index ({row}, {col}) out of bounds for {}x{} grid",
                self.rows(),
                self.cols()
            ))
        })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::Input(format!(
                "Index ({row}, {col}) out of bounds for {rows}x{cols} grid"
            ))),
        }
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, T> {
        self.data.view_mut()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn set_crs(&mut self, crs: Option<Crs>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// World extent covered by the grid
    pub fn extent(&self) -> Extent {
        self.transform.extent(self.cols(), self.rows())
    }

    /// World coordinates of a pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional pixel indices for a world coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    /// Check if a value counts as nodata for this raster
    pub fn is_nodata(&self, value: T) -> bool {
        value.matches_nodata(self.nodata)
    }

    /// Copy a pixel window into a new raster with a derived transform
    pub fn read_window(&self, window: Window) -> Result<Raster<T>> {
        if window.is_empty()
            || window.col_end() > self.cols()
            || window.row_end() > self.rows()
        {
            return Err(Error::Input(format!(
                "Window {window:?} out of bounds for {}x{} grid",
                self.rows(),
                self.cols()
            )));
        }
        let data = self
            .data
            .slice(ndarray::s![
                window.row_off..window.row_end(),
                window.col_off..window.col_end()
            ])
            .to_owned();
        Ok(Raster {
            data,
            transform: self.transform.for_window_origin(window.col_off, window.row_off),
            crs: self.crs,
            nodata: self.nodata,
        })
    }

    /// Count of cells not matching nodata
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }
}
