//! Multi-format vector export
//!
//! One call fans a geometry or feature collection out to any of GeoJSON,
//! Shapefile and KML. KML is always written in WGS84; the other formats
//! honor `keep_crs`. Every file goes through a staged write.

use std::path::{Path, PathBuf};

use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::io::{write_geojson, write_kml, write_shapefile, VectorFormat};
use geoprep_core::vector::{Feature, FeatureCollection};
use geoprep_core::{BoundingGeometry, Error, Result};
use tracing::info;

use crate::reproject::reproject_vector;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub formats: Vec<VectorFormat>,
    /// Keep the collection's projected CRS where the format allows it,
    /// instead of converting to WGS84
    pub keep_crs: bool,
}

/// Export a bounding geometry as a single-feature layer
pub fn export_geometry(
    geometry: &BoundingGeometry,
    stem: &Path,
    opts: &ExportOptions,
    cache: &TransformCache,
) -> Result<Vec<PathBuf>> {
    let mut collection = FeatureCollection::new(Some(geometry.crs()));
    collection.push(Feature::new(geo_types::Geometry::Polygon(
        geometry.polygon().clone(),
    )));
    export_collection(&collection, stem, opts, cache)
}

/// Export a feature collection to every requested format.
///
/// Output paths are `stem` with each format's canonical extension;
/// shapefiles add their sidecars. Returns every path written.
pub fn export_collection(
    collection: &FeatureCollection,
    stem: &Path,
    opts: &ExportOptions,
    cache: &TransformCache,
) -> Result<Vec<PathBuf>> {
    if opts.formats.is_empty() {
        return Err(Error::Input("No export formats requested".to_string()));
    }

    // Reproject at most once per target CRS
    let mut wgs84_version: Option<FeatureCollection> = None;
    let mut in_wgs84 = |cache: &TransformCache| -> Result<FeatureCollection> {
        if let Some(ready) = &wgs84_version {
            return Ok(ready.clone());
        }
        let converted = match collection.crs {
            Some(crs) if crs.epsg() != 4326 => {
                reproject_vector(collection, Crs::wgs84(), cache)?
            }
            _ => collection.clone(),
        };
        wgs84_version = Some(converted.clone());
        Ok(converted)
    };

    let mut written = Vec::new();
    for format in &opts.formats {
        let path = stem.with_extension(format.extension());
        match format {
            VectorFormat::GeoJson => {
                let data = if opts.keep_crs {
                    collection.clone()
                } else {
                    in_wgs84(cache)?
                };
                write_geojson(&data, &path)?;
                written.push(path);
            }
            VectorFormat::Shapefile => {
                let data = if opts.keep_crs {
                    collection.clone()
                } else {
                    in_wgs84(cache)?
                };
                written.extend(write_shapefile(&data, &path)?);
            }
            VectorFormat::Kml => {
                write_kml(&in_wgs84(cache)?, &path)?;
                written.push(path);
            }
        }
    }
    info!(
        stem = %stem.display(),
        formats = opts.formats.len(),
        files = written.len(),
        "exported layer"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoprep_core::io::read_geojson;

    fn utm_box() -> BoundingGeometry {
        BoundingGeometry::new(
            vec![
                (500000.0, 4650000.0),
                (501000.0, 4650000.0),
                (501000.0, 4651000.0),
                (500000.0, 4651000.0),
            ],
            Crs::from_epsg(32633).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_export_all_formats() {
        let cache = TransformCache::new();
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("aoi");
        let opts = ExportOptions {
            formats: vec![VectorFormat::GeoJson, VectorFormat::Shapefile, VectorFormat::Kml],
            keep_crs: false,
        };
        let written = export_geometry(&utm_box(), &stem, &opts, &cache).unwrap();
        // geojson + 4 shapefile parts + kml
        assert_eq!(written.len(), 6);
        assert!(stem.with_extension("geojson").exists());
        assert!(stem.with_extension("shp").exists());
        assert!(stem.with_extension("kml").exists());
    }

    #[test]
    fn test_keep_crs_toggle() {
        let cache = TransformCache::new();
        let dir = tempfile::tempdir().unwrap();

        let kept_stem = dir.path().join("kept");
        let opts = ExportOptions {
            formats: vec![VectorFormat::GeoJson],
            keep_crs: true,
        };
        export_geometry(&utm_box(), &kept_stem, &opts, &cache).unwrap();
        let kept = read_geojson(kept_stem.with_extension("geojson")).unwrap();
        assert_eq!(kept.crs.map(|c| c.epsg()), Some(32633));

        let wgs_stem = dir.path().join("wgs");
        let opts = ExportOptions {
            formats: vec![VectorFormat::GeoJson],
            keep_crs: false,
        };
        export_geometry(&utm_box(), &wgs_stem, &opts, &cache).unwrap();
        let wgs = read_geojson(wgs_stem.with_extension("geojson")).unwrap();
        assert_eq!(wgs.crs.map(|c| c.epsg()), Some(4326));
        let first = wgs.features[0].extent().unwrap();
        assert!(first.max_x.abs() <= 180.0 && first.max_y.abs() <= 90.0);
    }

    #[test]
    fn test_kml_always_wgs84() {
        let cache = TransformCache::new();
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("always");
        let opts = ExportOptions {
            formats: vec![VectorFormat::Kml],
            keep_crs: true,
        };
        export_geometry(&utm_box(), &stem, &opts, &cache).unwrap();
        let text = std::fs::read_to_string(stem.with_extension("kml")).unwrap();
        // Coordinates are small lon/lat numbers, not UTM meters
        assert!(!text.contains("500000"));
    }

    #[test]
    fn test_no_formats_rejected() {
        let cache = TransformCache::new();
        let dir = tempfile::tempdir().unwrap();
        let opts = ExportOptions {
            formats: vec![],
            keep_crs: false,
        };
        let err = export_geometry(&utm_box(), &dir.path().join("x"), &opts, &cache).unwrap_err();
        assert_eq!(err.kind(), "input");
    }
}
