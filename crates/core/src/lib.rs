//! # GeoPrep Core
//!
//! Core types, traits and I/O for the GeoPrep geospatial toolkit.
//!
//! This crate provides:
//! - `Crs`, `CrsResolver`, `TransformCache`: coordinate reference systems
//!   and cached transforms backed by pure-Rust projection math
//! - `Raster<T>`: generic georeferenced grid type
//! - `GeoTransform`, `Window`: north-up georeferencing and pixel windows
//! - `FeatureCollection`: vector features with attributes and a schema
//! - Staged, atomic file I/O for GeoTIFF, GeoJSON, KML and Shapefile

pub mod cancel;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod io;
pub mod raster;
pub mod vector;

pub use cancel::CancelToken;
pub use crs::Crs;
pub use error::{Error, Result};
pub use geometry::{BoundingGeometry, Coordinate, Extent};
pub use raster::{GeoTransform, Raster, RasterElement, TileIterator, Window};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::crs::{Crs, CrsResolver, TransformCache};
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{BoundingGeometry, Coordinate, Extent};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, TileIterator, Window};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
