//! End-to-end pipelines through real files: GeoTIFF in, operations in the
//! middle, GeoTIFF/GeoJSON/KML/Shapefile out. Everything runs on synthetic
//! grids in a temp directory.

use approx::assert_relative_eq;
use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::io::{read_geojson, read_geotiff, write_geotiff, VectorFormat};
use geoprep_core::vector::{AttributeValue, Feature, FeatureCollection};
use geoprep_core::{CancelToken, Coordinate, GeoTransform, Raster};
use geoprep_ops::bbox::{centroid_box, CentroidBoxParams};
use geoprep_ops::crop::{crop_raster, crop_vector};
use geoprep_ops::export::{export_collection, ExportOptions};
use geoprep_ops::merge::{merge_rasters, MergeOptions, MergePolicy};
use geoprep_ops::reproject::{reproject_raster_file, ReprojectOptions, Resampling};

fn utm() -> Crs {
    Crs::from_epsg(32633).unwrap()
}

/// 64x64 grid of 30 m cells in UTM 33N, value = linear cell index
fn synthetic_raster() -> Raster<f32> {
    let rows = 64;
    let cols = 64;
    let mut raster = Raster::new(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            raster.set(row, col, (row * cols + col) as f32).unwrap();
        }
    }
    raster.set_transform(GeoTransform::new(500000.0, 4651920.0, 30.0, -30.0).unwrap());
    raster.set_crs(Some(utm()));
    raster.set_nodata(Some(-9999.0));
    raster
}

#[test]
fn crop_pipeline_through_files() {
    let cache = TransformCache::new();
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.tif");
    write_geotiff(&synthetic_raster(), &source_path).unwrap();

    // Box aligned to the pixel grid, 20x20 cells around the raster center
    let params = CentroidBoxParams {
        center: Coordinate::new(500960.0, 4650960.0, utm()).unwrap(),
        width_m: 600.0,
        height_m: 600.0,
        round_to: None,
        output_crs: utm(),
    };
    let boundary = centroid_box(&params, &cache).unwrap();

    let source: Raster<f32> = read_geotiff(&source_path).unwrap();
    let cropped = crop_raster(&source, &boundary, &cache).unwrap();
    assert_eq!(cropped.shape(), (20, 20));
    assert_eq!(cropped.valid_count(), 400);

    let cropped_path = dir.path().join("cropped.tif");
    write_geotiff(&cropped, &cropped_path).unwrap();
    let reloaded: Raster<f32> = read_geotiff(&cropped_path).unwrap();
    assert_eq!(reloaded.shape(), cropped.shape());
    assert_eq!(reloaded.crs().map(|c| c.epsg()), Some(32633));
    // Window origin survives the file roundtrip
    assert_relative_eq!(reloaded.transform().origin_x, 500660.0, epsilon = 1e-6);
    assert_relative_eq!(
        reloaded.get(0, 0).unwrap(),
        cropped.get(0, 0).unwrap()
    );
}

#[test]
fn reproject_file_to_geographic() {
    let cache = TransformCache::new();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("utm.tif");
    let output = dir.path().join("wgs84.tif");
    write_geotiff(&synthetic_raster(), &input).unwrap();

    let opts = ReprojectOptions {
        resampling: Resampling::Bilinear,
        resolution: None,
    };
    reproject_raster_file(&input, &output, Crs::wgs84(), &opts, &cache).unwrap();

    let result: Raster<f32> = read_geotiff(&output).unwrap();
    assert_eq!(result.crs().map(|c| c.epsg()), Some(4326));
    let extent = result.extent();
    assert!(extent.min_x > 14.0 && extent.max_x < 16.0);
    assert!(extent.min_y > 41.0 && extent.max_y < 43.0);
    // Interior values come from the source range, not invented
    let (rows, cols) = result.shape();
    let center = result.get(rows / 2, cols / 2).unwrap();
    assert!(!result.is_nodata(center));
    assert!((0.0..=4095.0).contains(&center));
}

#[test]
fn merge_pipeline_through_files() {
    let cache = TransformCache::new();
    let dir = tempfile::tempdir().unwrap();

    // Two horizontally adjacent 16x16 tiles of 10 m cells
    let mut paths = Vec::new();
    for (index, value) in [1.0_f32, 2.0].iter().enumerate() {
        let mut tile = Raster::filled(16, 16, *value);
        tile.set_transform(
            GeoTransform::new(500000.0 + index as f64 * 160.0, 4650160.0, 10.0, -10.0).unwrap(),
        );
        tile.set_crs(Some(utm()));
        tile.set_nodata(Some(-9999.0));
        let path = dir.path().join(format!("tile{index}.tif"));
        write_geotiff(&tile, &path).unwrap();
        paths.push(path);
    }

    let tiles: Vec<Raster<f32>> = paths
        .iter()
        .map(|p| read_geotiff(p).unwrap())
        .collect();
    let merged = merge_rasters(
        &tiles,
        MergePolicy::First,
        &MergeOptions::default(),
        &cache,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(merged.shape(), (16, 32));

    let merged_path = dir.path().join("merged.tif");
    write_geotiff(&merged, &merged_path).unwrap();
    let reloaded: Raster<f32> = read_geotiff(&merged_path).unwrap();
    assert_relative_eq!(reloaded.get(8, 0).unwrap(), 1.0);
    assert_relative_eq!(reloaded.get(8, 31).unwrap(), 2.0);
}

#[test]
fn vector_crop_and_export() {
    let cache = TransformCache::new();
    let dir = tempfile::tempdir().unwrap();

    let square = |min_x: f64, min_y: f64, size: f64| {
        geo_types::Geometry::Polygon(geo_types::Polygon::new(
            geo_types::LineString::from(vec![
                (min_x, min_y),
                (min_x + size, min_y),
                (min_x + size, min_y + size),
                (min_x, min_y + size),
                (min_x, min_y),
            ]),
            vec![],
        ))
    };

    let mut collection = FeatureCollection::new(Some(utm()));
    let mut inside = Feature::new(square(500100.0, 4650100.0, 200.0));
    inside.set_property("name", AttributeValue::String("inside".to_string()));
    inside.set_property("rank", AttributeValue::Int(1));
    collection.push(inside);
    let mut far = Feature::new(square(540000.0, 4690000.0, 200.0));
    far.set_property("name", AttributeValue::String("far".to_string()));
    far.set_property("rank", AttributeValue::Int(2));
    collection.push(far);

    let boundary = geoprep_core::BoundingGeometry::new(
        vec![
            (500000.0, 4650000.0),
            (501000.0, 4650000.0),
            (501000.0, 4651000.0),
            (500000.0, 4651000.0),
        ],
        utm(),
    )
    .unwrap();

    let clipped = crop_vector(&collection, &boundary, &cache).unwrap();
    assert_eq!(clipped.len(), 1);
    assert_eq!(
        clipped.features[0].get_property("name"),
        Some(&AttributeValue::String("inside".to_string()))
    );

    let stem = dir.path().join("clipped");
    let opts = ExportOptions {
        formats: vec![
            VectorFormat::GeoJson,
            VectorFormat::Shapefile,
            VectorFormat::Kml,
        ],
        keep_crs: false,
    };
    let written = export_collection(&clipped, &stem, &opts, &cache).unwrap();
    assert_eq!(written.len(), 6);

    // The WGS84 copy keeps the attributes and lands in lon/lat
    let wgs = read_geojson(stem.with_extension("geojson")).unwrap();
    assert_eq!(wgs.crs.map(|c| c.epsg()), Some(4326));
    assert_eq!(
        wgs.features[0].get_property("rank"),
        Some(&AttributeValue::Int(1))
    );
    let extent = wgs.features[0].extent().unwrap();
    assert!(extent.max_x.abs() <= 180.0 && extent.max_y.abs() <= 90.0);
}
