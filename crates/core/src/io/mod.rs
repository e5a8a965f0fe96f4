//! Reading and writing geospatial files

mod geojson;
mod geotiff;
mod kml;
mod shapefile;
mod staged;

pub use self::geojson::{read_geojson, write_geojson};
pub use geotiff::{read_geotiff, write_geotiff};
pub use kml::write_kml;
pub use shapefile::write_shapefile;
pub use staged::{path_locks, PathLocks, StagedWriter};

use std::path::Path;

use crate::error::{Error, Result};

/// Vector output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorFormat {
    GeoJson,
    Shapefile,
    Kml,
}

impl VectorFormat {
    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            VectorFormat::GeoJson => "geojson",
            VectorFormat::Shapefile => "shp",
            VectorFormat::Kml => "kml",
        }
    }

    /// Detect a format from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "geojson" | "json" => Ok(VectorFormat::GeoJson),
            "shp" => Ok(VectorFormat::Shapefile),
            "kml" => Ok(VectorFormat::Kml),
            _ => Err(Error::Input(format!(
                "Unrecognized vector format for {}",
                path.display()
            ))),
        }
    }
}

impl std::str::FromStr for VectorFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(VectorFormat::GeoJson),
            "shapefile" | "shp" => Ok(VectorFormat::Shapefile),
            "kml" => Ok(VectorFormat::Kml),
            other => Err(Error::Input(format!("Unknown vector format '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            VectorFormat::from_path(Path::new("a/b.GeoJSON")).unwrap(),
            VectorFormat::GeoJson
        );
        assert_eq!(
            VectorFormat::from_path(Path::new("x.shp")).unwrap(),
            VectorFormat::Shapefile
        );
        assert!(VectorFormat::from_path(Path::new("x.tif")).is_err());
        assert_eq!("kml".parse::<VectorFormat>().unwrap(), VectorFormat::Kml);
    }
}
