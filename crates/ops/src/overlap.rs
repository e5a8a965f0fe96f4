//! CRS-aware overlap analysis between a footprint and a reference region
//!
//! Both geometries are moved into one projected CRS so areas and
//! distances come out in meters, then classified as inside, partial or
//! outside via exact polygon intersection.

use geo::{Area, BooleanOps};
use geo_types::{LineString, Polygon};
use geoprep_core::crs::{Crs, CrsResolver, TransformCache};
use geoprep_core::{BoundingGeometry, Error, Result};
use serde::Serialize;
use tracing::debug;

/// Tolerance for treating a near-total overlap as full containment
const REL_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Containment {
    Inside,
    Partial,
    Outside,
}

/// Distance in meters the footprint extends beyond the region per edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Overshoot {
    pub west_m: f64,
    pub east_m: f64,
    pub south_m: f64,
    pub north_m: f64,
}

impl Overshoot {
    pub fn is_zero(&self) -> bool {
        self.west_m == 0.0 && self.east_m == 0.0 && self.south_m == 0.0 && self.north_m == 0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapResult {
    pub containment: Containment,
    /// Share of the footprint covered by the region, 0-100
    pub percentage: f64,
    pub footprint_area_m2: f64,
    pub intersection_area_m2: f64,
    /// Projected CRS the analysis ran in
    pub analysis_crs: Crs,
    pub overshoot: Overshoot,
}

/// Classify how a footprint relates to a reference region.
///
/// The analysis CRS is the shared projected CRS when both inputs already
/// have one, otherwise the UTM zone of the region's centroid.
pub fn analyze_overlap(
    footprint: &BoundingGeometry,
    region: &BoundingGeometry,
    cache: &TransformCache,
) -> Result<OverlapResult> {
    let analysis_crs = pick_analysis_crs(footprint, region, cache)?;
    let fp = transform_polygon(footprint, analysis_crs, cache)?;
    let rg = transform_polygon(region, analysis_crs, cache)?;

    let footprint_area = fp.unsigned_area();
    if footprint_area <= 0.0 {
        return Err(Error::Geometry(
            "Footprint has zero area in the analysis CRS".to_string(),
        ));
    }

    let fp_extent = polygon_extent(&fp);
    let rg_extent = polygon_extent(&rg);
    let overshoot = Overshoot {
        west_m: (rg_extent.0 - fp_extent.0).max(0.0),
        east_m: (fp_extent.2 - rg_extent.2).max(0.0),
        south_m: (rg_extent.1 - fp_extent.1).max(0.0),
        north_m: (fp_extent.3 - rg_extent.3).max(0.0),
    };

    // Disjoint envelopes mean disjoint polygons; skip the boolean op
    let disjoint = fp_extent.2 < rg_extent.0
        || fp_extent.0 > rg_extent.2
        || fp_extent.3 < rg_extent.1
        || fp_extent.1 > rg_extent.3;
    let intersection_area = if disjoint {
        0.0
    } else {
        fp.intersection(&rg).unsigned_area()
    };

    let (containment, percentage) = if intersection_area <= 0.0 {
        (Containment::Outside, 0.0)
    } else if intersection_area >= footprint_area * (1.0 - REL_TOL) {
        (Containment::Inside, 100.0)
    } else {
        (
            Containment::Partial,
            intersection_area / footprint_area * 100.0,
        )
    };

    debug!(
        ?containment,
        percentage,
        analysis_crs = %analysis_crs,
        "overlap analysis"
    );
    Ok(OverlapResult {
        containment,
        percentage,
        footprint_area_m2: footprint_area,
        intersection_area_m2: intersection_area,
        analysis_crs,
        overshoot,
    })
}

fn pick_analysis_crs(
    footprint: &BoundingGeometry,
    region: &BoundingGeometry,
    cache: &TransformCache,
) -> Result<Crs> {
    if footprint.crs() == region.crs() && footprint.crs().is_projected() {
        return Ok(footprint.crs());
    }
    let (cx, cy) = region.centroid();
    let (lon, lat) = cache.get(region.crs(), Crs::wgs84()).apply(cx, cy)?;
    CrsResolver::new().suggest_projected(lon, lat)
}

fn transform_polygon(
    geometry: &BoundingGeometry,
    target: Crs,
    cache: &TransformCache,
) -> Result<Polygon<f64>> {
    let transform = cache.get(geometry.crs(), target);
    let mut ring = Vec::new();
    for (x, y) in geometry.vertices() {
        ring.push(transform.apply(x, y)?);
    }
    Ok(Polygon::new(LineString::from(ring), vec![]))
}

fn polygon_extent(polygon: &Polygon<f64>) -> (f64, f64, f64, f64) {
    polygon.exterior().0.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |acc, c| (acc.0.min(c.x), acc.1.min(c.y), acc.2.max(c.x), acc.3.max(c.y)),
    )
}
