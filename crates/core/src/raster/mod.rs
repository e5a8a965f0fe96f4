//! Raster data structures

mod element;
mod geotransform;
mod grid;
mod window;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use window::{TileIterator, Window};
