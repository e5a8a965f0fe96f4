//! # GeoPrep Ops
//!
//! Geometry and raster operations built on `geoprep-core`:
//!
//! - `bbox`: metric centroid boxes and validated quadrilaterals
//! - `overlap`: CRS-aware containment analysis with areas in m²
//! - `crop`: window-based raster crops and R-tree-filtered vector clips
//! - `reproject`: vertex and grid reprojection with pluggable resampling
//! - `merge`: policy-driven multi-raster merge on the rayon pool
//! - `export`: fan-out to GeoJSON, Shapefile and KML

pub mod bbox;
pub mod crop;
pub mod export;
pub mod merge;
pub mod overlap;
pub mod reproject;

pub use bbox::{centroid_box, quad_box, CentroidBoxParams, RoundingStep};
pub use crop::{crop_raster, crop_vector};
pub use export::{export_collection, export_geometry, ExportOptions};
pub use merge::{merge_rasters, MergeOptions, MergePolicy};
pub use overlap::{analyze_overlap, Containment, OverlapResult, Overshoot};
pub use reproject::{
    reproject_raster, reproject_raster_file, reproject_vector, ReprojectOptions, Resampling,
};
