//! Batch reprojection through real files in a temp directory

use std::sync::mpsc;

use geoprep_batch::{reproject_files, BatchOptions, Event};
use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::io::{read_geotiff, write_geotiff};
use geoprep_core::{CancelToken, GeoTransform, Raster};
use geoprep_ops::reproject::ReprojectOptions;

fn tile(value: f32) -> Raster<f32> {
    let mut raster = Raster::filled(8, 8, value);
    raster.set_transform(GeoTransform::new(500000.0, 4650080.0, 10.0, -10.0).unwrap());
    raster.set_crs(Some(Crs::from_epsg(32633).unwrap()));
    raster.set_nodata(Some(-9999.0));
    raster
}

#[test]
fn corrupt_input_fails_alone() {
    let cache = TransformCache::new();
    let cancel = CancelToken::new();
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();

    let good_a = dir.path().join("a.tif");
    let good_b = dir.path().join("b.tif");
    write_geotiff(&tile(1.0), &good_a).unwrap();
    write_geotiff(&tile(2.0), &good_b).unwrap();
    let bad = dir.path().join("bad.tif");
    std::fs::write(&bad, b"this is not a tiff").unwrap();

    let inputs = vec![good_a, bad.clone(), good_b];
    let (tx, rx) = mpsc::channel();
    let result = reproject_files(
        &inputs,
        &out_dir,
        Crs::wgs84(),
        &ReprojectOptions::default(),
        &BatchOptions::default(),
        &cache,
        &cancel,
        Some(tx),
    )
    .unwrap();

    assert_eq!(result.succeeded(), 2);
    assert_eq!(result.failed(), 1);
    // Outcomes keep input order and name the corrupt file
    assert_eq!(result.outcomes[1].input, bad);
    assert_eq!(result.outcomes[1].result.as_ref().unwrap_err().kind, "input");

    // The good inputs made it through to geographic outputs
    for name in ["a.tif", "b.tif"] {
        let out: Raster<f32> = read_geotiff(out_dir.join(name)).unwrap();
        assert_eq!(out.crs().map(|c| c.epsg()), Some(4326));
    }
    assert!(!out_dir.join("bad.tif").exists());

    let events: Vec<Event> = rx.iter().collect();
    assert!(matches!(events.first(), Some(Event::Started { total: 3 })));
    assert!(matches!(events.last(), Some(Event::Finished)));
}
