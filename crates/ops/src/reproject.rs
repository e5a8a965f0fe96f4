//! Reprojection of rasters and vector layers
//!
//! Vector reprojection transforms every vertex. Raster reprojection
//! derives the target grid from densified source edges, then inverse-maps
//! each output pixel center back into the source and samples it.

use std::path::Path;

use geo::MapCoords;
use geo_types::Coord;
use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::io::{read_geotiff, write_geotiff};
use geoprep_core::vector::{Feature, FeatureCollection};
use geoprep_core::{Error, GeoTransform, Raster, RasterElement, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Edge samples when projecting a source outline into the target CRS
const DENSIFY_POINTS_PER_EDGE: usize = 16;

/// Pixel sampling strategy.
///
/// `Nearest` never invents values and is the safe choice for categorical
/// grids; `Bilinear` and `Cubic` suit continuous fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
}

impl std::str::FromStr for Resampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" => Ok(Resampling::Cubic),
            other => Err(Error::Input(format!(
                "Unknown resampling method '{other}' (nearest, bilinear, cubic)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReprojectOptions {
    pub resampling: Resampling,
    /// Output cell size as (width, height), both positive; derived from
    /// the source when absent
    pub resolution: Option<(f64, f64)>,
}

impl Default for ReprojectOptions {
    fn default() -> Self {
        Self {
            resampling: Resampling::Nearest,
            resolution: None,
        }
    }
}

/// Reproject every vertex of a vector layer into the target CRS.
///
/// Attributes and schema pass through untouched.
pub fn reproject_vector(
    collection: &FeatureCollection,
    target: Crs,
    cache: &TransformCache,
) -> Result<FeatureCollection> {
    let source = collection
        .crs
        .ok_or_else(|| Error::Crs("Vector layer has no CRS to reproject from".to_string()))?;
    let transform = cache.get(source, target);

    let mut out = FeatureCollection::new(Some(target));
    out.schema = collection.schema.clone();
    for feature in collection.iter() {
        let geometry = feature.geometry.try_map_coords(|c: Coord<f64>| {
            let (x, y) = transform.apply(c.x, c.y)?;
            Ok::<_, Error>(Coord { x, y })
        })?;
        let mut mapped = Feature::new(geometry);
        mapped.properties = feature.properties.clone();
        mapped.id = feature.id.clone();
        out.features.push(mapped);
    }
    Ok(out)
}

/// Reproject a raster into the target CRS.
///
/// The output extent is the envelope of the source outline sampled along
/// its edges; resolution keeps the source cell count across that extent
/// unless an explicit one is given.
pub fn reproject_raster<T: RasterElement>(
    raster: &Raster<T>,
    target: Crs,
    opts: &ReprojectOptions,
    cache: &TransformCache,
) -> Result<Raster<T>> {
    let source = raster
        .crs()
        .ok_or_else(|| Error::Crs("Raster has no CRS to reproject from".to_string()))?;
    if source == target {
        return Ok(raster.clone());
    }

    let forward = cache.get(source, target);
    let inverse = cache.get(target, source);

    let src_extent = raster.extent();
    let (min_x, min_y, max_x, max_y) = forward.apply_bounds(
        src_extent.min_x,
        src_extent.min_y,
        src_extent.max_x,
        src_extent.max_y,
        DENSIFY_POINTS_PER_EDGE,
    )?;
    let out_extent = geoprep_core::Extent::new(min_x, min_y, max_x, max_y)?;

    let (px, py) = match opts.resolution {
        Some((w, h)) => {
            if w <= 0.0 || h <= 0.0 {
                return Err(Error::Input(format!(
                    "Output resolution must be positive, got ({w}, {h})"
                )));
            }
            (w, h)
        }
        None => (
            out_extent.width() / raster.cols() as f64,
            out_extent.height() / raster.rows() as f64,
        ),
    };
    let (out_transform, cols, rows) = GeoTransform::for_extent(out_extent, px, -py)?;

    let mut out = raster.nodata_like(rows, cols, out_transform);
    out.set_crs(Some(target));
    let nodata = out.nodata().unwrap_or_else(T::default_nodata);

    let sampler = Sampler::new(raster);
    for row in 0..rows {
        for col in 0..cols {
            let (tx, ty) = out_transform.pixel_to_geo(col, row);
            let Ok((sx, sy)) = inverse.apply(tx, ty) else {
                continue;
            };
            let (fx, fy) = raster.geo_to_pixel(sx, sy);
            let value = match opts.resampling {
                Resampling::Nearest => sampler.nearest(fx, fy),
                Resampling::Bilinear => sampler.bilinear(fx, fy),
                Resampling::Cubic => sampler.cubic(fx, fy),
            };
            if let Some(v) = value {
                out.set(row, col, v)?;
            } else {
                out.set(row, col, nodata)?;
            }
        }
    }
    debug!(
        source = %source,
        target = %target,
        rows, cols,
        "reprojected raster"
    );
    Ok(out)
}

/// Read, reproject and write one GeoTIFF
pub fn reproject_raster_file(
    input: &Path,
    output: &Path,
    target: Crs,
    opts: &ReprojectOptions,
    cache: &TransformCache,
) -> Result<()> {
    let raster: Raster<f32> = read_geotiff(input)?;
    let out = reproject_raster(&raster, target, opts, cache)?;
    write_geotiff(&out, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        target = %target,
        "reprojected file"
    );
    Ok(())
}

/// Pixel sampling over a source grid, fractional indices at pixel edges
struct Sampler<'a, T: RasterElement> {
    raster: &'a Raster<T>,
}

impl<'a, T: RasterElement> Sampler<'a, T> {
    fn new(raster: &'a Raster<T>) -> Self {
        Sampler { raster }
    }

    fn valid_at(&self, col: isize, row: isize) -> Option<f64> {
        if col < 0 || row < 0 {
            return None;
        }
        let value = self.raster.get(row as usize, col as usize).ok()?;
        if self.raster.is_nodata(value) {
            return None;
        }
        value.to_f64()
    }

    /// The pixel containing the point
    fn nearest(&self, fx: f64, fy: f64) -> Option<T> {
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let value = self.raster.get(fy.floor() as usize, fx.floor() as usize).ok()?;
        if self.raster.is_nodata(value) {
            None
        } else {
            Some(value)
        }
    }

    /// Distance-weighted average of the four surrounding pixel centers.
    /// Nodata neighbors drop out and the weights renormalize.
    fn bilinear(&self, fx: f64, fy: f64) -> Option<T> {
        let gx = fx - 0.5;
        let gy = fy - 0.5;
        let col0 = gx.floor();
        let row0 = gy.floor();
        let wx = gx - col0;
        let wy = gy - row0;

        let mut sum = 0.0;
        let mut weight_sum = 0.0;
        for (dc, dr, w) in [
            (0, 0, (1.0 - wx) * (1.0 - wy)),
            (1, 0, wx * (1.0 - wy)),
            (0, 1, (1.0 - wx) * wy),
            (1, 1, wx * wy),
        ] {
            if w == 0.0 {
                continue;
            }
            if let Some(v) = self.valid_at(col0 as isize + dc, row0 as isize + dr) {
                sum += v * w;
                weight_sum += w;
            }
        }
        if weight_sum <= 0.0 {
            return None;
        }
        T::from_f64(sum / weight_sum)
    }

    /// Catmull-Rom over a 4x4 neighborhood; falls back to bilinear when
    /// any support pixel is missing
    fn cubic(&self, fx: f64, fy: f64) -> Option<T> {
        let gx = fx - 0.5;
        let gy = fy - 0.5;
        let col0 = gx.floor() as isize;
        let row0 = gy.floor() as isize;
        let tx = gx - col0 as f64;
        let ty = gy - row0 as f64;

        let mut rows = [0.0_f64; 4];
        for (i, row_slot) in rows.iter_mut().enumerate() {
            let mut samples = [0.0_f64; 4];
            for (j, sample) in samples.iter_mut().enumerate() {
                match self.valid_at(col0 - 1 + j as isize, row0 - 1 + i as isize) {
                    Some(v) => *sample = v,
                    None => return self.bilinear(fx, fy),
                }
            }
            *row_slot = catmull_rom(samples, tx);
        }
        T::from_f64(catmull_rom(rows, ty))
    }
}

fn catmull_rom(p: [f64; 4], t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p[1])
        + (-p[0] + p[2]) * t
        + (2.0 * p[0] - 5.0 * p[1] + 4.0 * p[2] - p[3]) * t2
        + (-p[0] + 3.0 * p[1] - 3.0 * p[2] + p[3]) * t3)
}
