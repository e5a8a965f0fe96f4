//! Multi-raster merge
//!
//! Inputs are combined over their union extent on the first input's grid.
//! The output is processed in disjoint tiles on the rayon pool; per
//! pixel, non-nodata contributors are gathered in input order and the
//! policy decides the value. Nodata contributors never win a pixel.

use std::borrow::Cow;

use geo_types::Coord;
use geoprep_core::crs::TransformCache;
use geoprep_core::{
    CancelToken, Error, Extent, GeoTransform, Raster, Result, TileIterator, Window,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::reproject::{reproject_raster, ReprojectOptions, Resampling};

/// Tile edge for the parallel merge loop
const MERGE_TILE_SIZE: usize = 512;

/// How overlapping pixels are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// First non-nodata contributor in input order
    First,
    /// Last non-nodata contributor in input order
    Last,
    Min,
    Max,
    Sum,
}

impl std::str::FromStr for MergePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(MergePolicy::First),
            "last" => Ok(MergePolicy::Last),
            "min" => Ok(MergePolicy::Min),
            "max" => Ok(MergePolicy::Max),
            "sum" => Ok(MergePolicy::Sum),
            other => Err(Error::Input(format!(
                "Unknown merge policy '{other}' (first, last, min, max, sum)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Output cell size as (width, height); the first input's when absent
    pub resolution: Option<(f64, f64)>,
    /// Output nodata sentinel; the first input's (or NaN) when absent
    pub output_nodata: Option<f32>,
}

/// Merge rasters into one grid.
///
/// All inputs are expected in one CRS; stragglers are reprojected to the
/// first input's CRS with nearest sampling, once, with a warning.
pub fn merge_rasters(
    inputs: &[Raster<f32>],
    policy: MergePolicy,
    opts: &MergeOptions,
    cache: &TransformCache,
    cancel: &CancelToken,
) -> Result<Raster<f32>> {
    if inputs.is_empty() {
        return Err(Error::Input("Merge needs at least one input raster".to_string()));
    }

    let target_crs = inputs[0].crs();
    // Aligned inputs stay borrowed; only stragglers own a reprojected copy
    let mut aligned: Vec<Cow<'_, Raster<f32>>> = Vec::with_capacity(inputs.len());
    for (index, raster) in inputs.iter().enumerate() {
        if raster.crs() == target_crs {
            aligned.push(Cow::Borrowed(raster));
        } else {
            let target = target_crs.ok_or_else(|| {
                Error::Crs(format!(
                    "Input {index} has a CRS but the first input has none"
                ))
            })?;
            warn!(
                index,
                from = ?raster.crs().map(|c| c.epsg()),
                to = target.epsg(),
                "input CRS mismatch, reprojecting with nearest sampling"
            );
            let reproject_opts = ReprojectOptions {
                resampling: Resampling::Nearest,
                resolution: None,
            };
            aligned.push(Cow::Owned(reproject_raster(
                raster,
                target,
                &reproject_opts,
                cache,
            )?));
        }
    }

    let union: Extent = aligned
        .iter()
        .map(|r| r.extent())
        .reduce(|a, b| a.union(&b))
        .unwrap();
    let (px, py) = match opts.resolution {
        Some((w, h)) => {
            if w <= 0.0 || h <= 0.0 {
                return Err(Error::Input(format!(
                    "Merge resolution must be positive, got ({w}, {h})"
                )));
            }
            (w, h)
        }
        None => (
            aligned[0].transform().cell_width(),
            aligned[0].transform().cell_height(),
        ),
    };
    let (out_transform, cols, rows) = GeoTransform::for_extent(union, px, -py)?;

    let nodata = opts
        .output_nodata
        .or_else(|| aligned[0].nodata())
        .unwrap_or(f32::NAN);

    let tiles: Vec<Window> = TileIterator::new(cols, rows, MERGE_TILE_SIZE).collect();
    debug!(rows, cols, tiles = tiles.len(), ?policy, "merging rasters");

    let tile_results: Vec<(Window, Vec<f32>)> = tiles
        .par_iter()
        .map(|&tile| {
            cancel.check()?;
            let values = merge_tile(&aligned, policy, &out_transform, tile, nodata);
            Ok((tile, values))
        })
        .collect::<Result<_>>()?;

    let mut out = Raster::filled(rows, cols, nodata);
    out.set_transform(out_transform);
    out.set_crs(target_crs);
    out.set_nodata(Some(nodata));
    for (tile, values) in tile_results {
        let mut cursor = values.into_iter();
        for row in tile.row_off..tile.row_end() {
            for col in tile.col_off..tile.col_end() {
                // Tile buffers are exactly tile-sized
                let value = cursor.next().unwrap();
                out.set(row, col, value)?;
            }
        }
    }
    info!(inputs = inputs.len(), rows, cols, "merge complete");
    Ok(out)
}

fn merge_tile(
    inputs: &[Cow<'_, Raster<f32>>],
    policy: MergePolicy,
    out_transform: &GeoTransform,
    tile: Window,
    nodata: f32,
) -> Vec<f32> {
    let mut values = Vec::with_capacity(tile.len());
    for row in tile.row_off..tile.row_end() {
        for col in tile.col_off..tile.col_end() {
            let (x, y) = out_transform.pixel_to_geo(col, row);
            values.push(merge_pixel(inputs, policy, Coord { x, y }, nodata));
        }
    }
    values
}

fn merge_pixel(
    inputs: &[Cow<'_, Raster<f32>>],
    policy: MergePolicy,
    point: Coord<f64>,
    nodata: f32,
) -> f32 {
    let mut acc: Option<f32> = None;
    for raster in inputs {
        let (fx, fy) = raster.geo_to_pixel(point.x, point.y);
        if fx < 0.0 || fy < 0.0 {
            continue;
        }
        let Ok(value) = raster.get(fy.floor() as usize, fx.floor() as usize) else {
            continue;
        };
        if raster.is_nodata(value) {
            continue;
        }
        acc = Some(match (acc, policy) {
            (None, _) => value,
            (Some(first), MergePolicy::First) => first,
            (Some(_), MergePolicy::Last) => value,
            (Some(best), MergePolicy::Min) => best.min(value),
            (Some(best), MergePolicy::Max) => best.max(value),
            (Some(sum), MergePolicy::Sum) => sum + value,
        });
    }
    acc.unwrap_or(nodata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geoprep_core::Crs;

    fn utm() -> Crs {
        Crs::from_epsg(32633).unwrap()
    }

    /// 4x4 grid of `value` with 1 m pixels, origin at (origin_x, origin_y)
    fn tile(origin_x: f64, origin_y: f64, value: f32) -> Raster<f32> {
        let mut raster = Raster::filled(4, 4, value);
        raster
            .set_transform(GeoTransform::new(origin_x, origin_y, 1.0, -1.0).unwrap());
        raster.set_crs(Some(utm()));
        raster.set_nodata(Some(-9999.0));
        raster
    }

    #[test]
    fn test_union_extent_and_fill() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        // Two horizontally adjacent tiles
        let a = tile(0.0, 4.0, 1.0);
        let b = tile(4.0, 4.0, 2.0);
        let out = merge_rasters(&[a, b], MergePolicy::First, &MergeOptions::default(), &cache, &cancel)
            .unwrap();
        assert_eq!(out.shape(), (4, 8));
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(out.get(0, 7).unwrap(), 2.0);
    }

    #[test]
    fn test_policies_on_overlap() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        let a = tile(0.0, 4.0, 3.0);
        let b = tile(0.0, 4.0, 5.0);
        let cases = [
            (MergePolicy::First, 3.0),
            (MergePolicy::Last, 5.0),
            (MergePolicy::Min, 3.0),
            (MergePolicy::Max, 5.0),
            (MergePolicy::Sum, 8.0),
        ];
        for (policy, expected) in cases {
            let out = merge_rasters(
                &[a.clone(), b.clone()],
                policy,
                &MergeOptions::default(),
                &cache,
                &cancel,
            )
            .unwrap();
            assert_relative_eq!(out.get(2, 2).unwrap(), expected);
        }
    }

    #[test]
    fn test_nodata_contributors_never_win() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        let mut a = tile(0.0, 4.0, -9999.0);
        a.set(1, 1, 42.0).unwrap();
        let b = tile(0.0, 4.0, 7.0);

        let out = merge_rasters(
            &[a, b],
            MergePolicy::First,
            &MergeOptions::default(),
            &cache,
            &cancel,
        )
        .unwrap();
        // Where a is nodata, b provides the value even under First
        assert_relative_eq!(out.get(0, 0).unwrap(), 7.0);
        assert_relative_eq!(out.get(1, 1).unwrap(), 42.0);
    }

    #[test]
    fn test_gap_stays_nodata() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        // Diagonal tiles leave gaps in the union
        let a = tile(0.0, 8.0, 1.0);
        let b = tile(4.0, 4.0, 2.0);
        let out = merge_rasters(&[a, b], MergePolicy::Sum, &MergeOptions::default(), &cache, &cancel)
            .unwrap();
        assert_eq!(out.shape(), (8, 8));
        assert!(out.is_nodata(out.get(6, 1).unwrap()));
        assert_relative_eq!(out.get(1, 1).unwrap(), 1.0);
        assert_relative_eq!(out.get(6, 6).unwrap(), 2.0);
    }

    #[test]
    fn test_mismatched_crs_input_reprojected() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        // First input on a real UTM grid
        let mut a = Raster::filled(4, 4, 1.0_f32);
        a.set_transform(GeoTransform::new(500000.0, 4650004.0, 1.0, -1.0).unwrap());
        a.set_crs(Some(utm()));
        a.set_nodata(Some(-9999.0));

        // Second input covers the same ground but in geographic coordinates
        let t = cache.get(utm(), Crs::wgs84());
        let (lon_min, lat_min, lon_max, lat_max) = t
            .apply_bounds(500000.0, 4650000.0, 500004.0, 4650004.0, 8)
            .unwrap();
        let mut b = Raster::filled(4, 4, 2.0_f32);
        b.set_transform(
            GeoTransform::new(
                lon_min,
                lat_max,
                (lon_max - lon_min) / 4.0,
                -(lat_max - lat_min) / 4.0,
            )
            .unwrap(),
        );
        b.set_crs(Some(Crs::wgs84()));
        b.set_nodata(Some(-9999.0));

        let out = merge_rasters(
            &[a, b],
            MergePolicy::Last,
            &MergeOptions::default(),
            &cache,
            &cancel,
        )
        .unwrap();
        assert_eq!(out.crs().map(|c| c.epsg()), Some(32633));
        // In the shared interior the reprojected second input wins under Last
        let (rows, cols) = out.shape();
        assert_relative_eq!(out.get(rows / 2, cols / 2).unwrap(), 2.0);
    }

    #[test]
    fn test_cancelled_merge_aborts() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = merge_rasters(
            &[tile(0.0, 4.0, 1.0)],
            MergePolicy::First,
            &MergeOptions::default(),
            &cache,
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "resource");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let cache = TransformCache::new();
        let cancel = CancelToken::new();
        let err = merge_rasters(&[], MergePolicy::First, &MergeOptions::default(), &cache, &cancel)
            .unwrap_err();
        assert_eq!(err.kind(), "input");
    }
}
