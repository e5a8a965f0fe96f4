//! Bounding-box construction
//!
//! Two modes: a metric box around a center point, and an explicit
//! four-corner quadrilateral. Centroid boxes are always laid out in a
//! projected CRS so their dimensions are true meters regardless of
//! latitude; geographic centers detour through the matching UTM zone.

use geoprep_core::crs::{Crs, CrsResolver, TransformCache};
use geoprep_core::{BoundingGeometry, Coordinate, Error, Result};
use tracing::debug;

/// Grid step for optional centroid rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingStep {
    Ten,
    Hundred,
    Thousand,
    TenThousand,
}

impl RoundingStep {
    pub fn meters(&self) -> f64 {
        match self {
            RoundingStep::Ten => 10.0,
            RoundingStep::Hundred => 100.0,
            RoundingStep::Thousand => 1000.0,
            RoundingStep::TenThousand => 10000.0,
        }
    }
}

impl std::str::FromStr for RoundingStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "10" => Ok(RoundingStep::Ten),
            "100" => Ok(RoundingStep::Hundred),
            "1000" => Ok(RoundingStep::Thousand),
            "10000" => Ok(RoundingStep::TenThousand),
            other => Err(Error::Input(format!(
                "Rounding step '{other}' not one of 10, 100, 1000, 10000"
            ))),
        }
    }
}

/// Parameters for a metric box around a center point
#[derive(Debug, Clone)]
pub struct CentroidBoxParams {
    pub center: Coordinate,
    /// Box width in meters
    pub width_m: f64,
    /// Box height in meters
    pub height_m: f64,
    /// Snap the projected center to a grid before building the box
    pub round_to: Option<RoundingStep>,
    /// CRS of the returned geometry
    pub output_crs: Crs,
}

/// Build a width x height meter box centered on a point.
///
/// Corners come out in SW, SE, NE, NW order in the output CRS.
pub fn centroid_box(params: &CentroidBoxParams, cache: &TransformCache) -> Result<BoundingGeometry> {
    if params.width_m <= 0.0 || params.height_m <= 0.0 {
        return Err(Error::Input(format!(
            "Box dimensions must be positive, got {}x{} m",
            params.width_m, params.height_m
        )));
    }

    let working_crs = if params.center.crs.is_projected() {
        params.center.crs
    } else {
        CrsResolver::new().suggest_projected(params.center.x, params.center.y)?
    };

    let to_working = cache.get(params.center.crs, working_crs);
    let (mut cx, mut cy) = to_working.apply(params.center.x, params.center.y)?;

    if let Some(step) = params.round_to {
        let grid = step.meters();
        cx = (cx / grid).round() * grid;
        cy = (cy / grid).round() * grid;
    }

    let half_w = params.width_m / 2.0;
    let half_h = params.height_m / 2.0;
    let corners_working = [
        (cx - half_w, cy - half_h),
        (cx + half_w, cy - half_h),
        (cx + half_w, cy + half_h),
        (cx - half_w, cy + half_h),
    ];

    let to_output = cache.get(working_crs, params.output_crs);
    let mut corners = Vec::with_capacity(4);
    for (x, y) in corners_working {
        corners.push(to_output.apply(x, y)?);
    }
    debug!(
        working = %working_crs,
        output = %params.output_crs,
        width_m = params.width_m,
        height_m = params.height_m,
        "built centroid box"
    );
    BoundingGeometry::new(corners, params.output_crs)
}

/// Build a quadrilateral from explicit corners in SW, SE, NE, NW order.
///
/// Corners are taken as given, never reordered; degenerate or
/// self-intersecting input fails with a geometry error.
pub fn quad_box(corners: [(f64, f64); 4], crs: Crs) -> Result<BoundingGeometry> {
    BoundingGeometry::new(corners.to_vec(), crs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::EuclideanDistance;
    use geo_types::point;

    fn metric_dims(geometry: &BoundingGeometry, cache: &TransformCache) -> (f64, f64) {
        // Measure the box edges in its UTM zone
        let (cx, cy) = geometry.centroid();
        let to_geo = cache.get(geometry.crs(), Crs::wgs84());
        let (lon, lat) = to_geo.apply(cx, cy).unwrap();
        let utm = CrsResolver::new().suggest_projected(lon, lat).unwrap();
        let t = cache.get(geometry.crs(), utm);
        let v: Vec<(f64, f64)> = geometry
            .vertices()
            .iter()
            .map(|&(x, y)| t.apply(x, y).unwrap())
            .collect();
        let d = |a: (f64, f64), b: (f64, f64)| {
            point! { x: a.0, y: a.1 }.euclidean_distance(&point! { x: b.0, y: b.1 })
        };
        (d(v[0], v[1]), d(v[1], v[2]))
    }

    #[test]
    fn test_dimensions_independent_of_latitude() {
        let cache = TransformCache::new();
        let mut widths = Vec::new();
        for lat in [5.0, 45.0, 65.0] {
            let params = CentroidBoxParams {
                center: Coordinate::new(12.0, lat, Crs::wgs84()).unwrap(),
                width_m: 2000.0,
                height_m: 1000.0,
                round_to: None,
                output_crs: Crs::wgs84(),
            };
            let geometry = centroid_box(&params, &cache).unwrap();
            let (w, h) = metric_dims(&geometry, &cache);
            assert_relative_eq!(w, 2000.0, epsilon = 5.0);
            assert_relative_eq!(h, 1000.0, epsilon = 5.0);
            widths.push(w);
        }
        assert_relative_eq!(widths[0], widths[2], epsilon = 5.0);
    }

    #[test]
    fn test_projected_center_used_directly() {
        let cache = TransformCache::new();
        let utm = Crs::from_epsg(32633).unwrap();
        let params = CentroidBoxParams {
            center: Coordinate::new(500000.0, 4650000.0, utm).unwrap(),
            width_m: 100.0,
            height_m: 100.0,
            round_to: None,
            output_crs: utm,
        };
        let geometry = centroid_box(&params, &cache).unwrap();
        let v = geometry.vertices();
        assert_relative_eq!(v[0].0, 499950.0, epsilon = 1e-6);
        assert_relative_eq!(v[2].1, 4650050.0, epsilon = 1e-6);
    }

    #[test]
    fn test_centroid_rounding_snaps_to_grid() {
        let cache = TransformCache::new();
        let utm = Crs::from_epsg(32633).unwrap();
        let params = CentroidBoxParams {
            center: Coordinate::new(500437.0, 4650263.0, utm).unwrap(),
            width_m: 1000.0,
            height_m: 1000.0,
            round_to: Some(RoundingStep::Thousand),
            output_crs: utm,
        };
        let geometry = centroid_box(&params, &cache).unwrap();
        let (cx, cy) = geometry.centroid();
        assert_relative_eq!(cx, 500000.0, epsilon = 1e-6);
        assert_relative_eq!(cy, 4650000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let cache = TransformCache::new();
        let params = CentroidBoxParams {
            center: Coordinate::new(12.0, 45.0, Crs::wgs84()).unwrap(),
            width_m: 0.0,
            height_m: 100.0,
            round_to: None,
            output_crs: Crs::wgs84(),
        };
        assert!(matches!(centroid_box(&params, &cache), Err(Error::Input(_))));
    }

    #[test]
    fn test_quad_box_validation() {
        let crs = Crs::from_epsg(32633).unwrap();
        // SW, SE, NE, NW
        let ok = quad_box(
            [(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0)],
            crs,
        );
        assert!(ok.is_ok());

        // Bowtie order
        let bad = quad_box(
            [(0.0, 0.0), (100.0, 80.0), (100.0, 0.0), (0.0, 80.0)],
            crs,
        );
        assert!(matches!(bad, Err(Error::Geometry(_))));
    }
}
