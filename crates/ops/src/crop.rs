//! Cropping rasters and vector layers to a bounding geometry
//!
//! Raster crops read only the minimal pixel window and mask cell centers
//! outside the exact geometry. Vector crops pre-filter candidates with an
//! R-tree, then clip geometries against the crop polygon: convex
//! boundaries take the Sutherland-Hodgman / Cyrus-Beck fast path, concave
//! ones go through a boolean overlay.

use geo::{Area, BooleanOps, Intersects};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use geoprep_core::crs::{Crs, TransformCache};
use geoprep_core::{
    BoundingGeometry, Error, Raster, RasterElement, Result, Window,
};
use geoprep_core::vector::{Feature, FeatureCollection};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, warn};

/// Crop a raster to a bounding geometry.
///
/// The geometry is transformed into the raster's CRS, the covering pixel
/// window is read, and cells whose centers fall outside the geometry are
/// set to nodata. A geometry disjoint from the raster is a geometry
/// error.
pub fn crop_raster<T: RasterElement>(
    raster: &Raster<T>,
    geometry: &BoundingGeometry,
    cache: &TransformCache,
) -> Result<Raster<T>> {
    let clip = geometry_in_crs(geometry, raster.crs(), cache)?;
    let clip_extent = ring_extent(clip.exterior());

    let window = Window::from_extent(&clip_extent, raster.transform(), raster.cols(), raster.rows())
        .ok_or_else(|| {
            Error::Geometry("Crop geometry does not intersect the raster".to_string())
        })?;

    let mut out = raster.read_window(window)?;
    let nodata = out.nodata().unwrap_or_else(T::default_nodata);
    out.set_nodata(Some(nodata));

    for row in 0..out.rows() {
        for col in 0..out.cols() {
            let (x, y) = out.pixel_to_geo(col, row);
            if !clip.intersects(&Point::new(x, y)) {
                out.set(row, col, nodata)?;
            }
        }
    }
    debug!(
        rows = out.rows(),
        cols = out.cols(),
        valid = out.valid_count(),
        "cropped raster"
    );
    Ok(out)
}

/// Crop a vector layer to a bounding geometry.
///
/// Features fully inside pass through untouched; features crossing the
/// boundary are clipped; attributes are always preserved. Input order is
/// kept.
pub fn crop_vector(
    collection: &FeatureCollection,
    geometry: &BoundingGeometry,
    cache: &TransformCache,
) -> Result<FeatureCollection> {
    let clip = geometry_in_crs(geometry, collection.crs, cache)?;
    let clipper = Clipper::new(&clip)?;
    let clip_extent = ring_extent(clip.exterior());

    // Envelope pre-filter so only candidates pay for exact clipping
    let entries: Vec<FeatureEnvelope> = collection
        .iter()
        .enumerate()
        .filter_map(|(index, f)| {
            f.extent().map(|e| FeatureEnvelope {
                index,
                envelope: AABB::from_corners([e.min_x, e.min_y], [e.max_x, e.max_y]),
            })
        })
        .collect();
    let tree = RTree::bulk_load(entries);
    let query = AABB::from_corners(
        [clip_extent.min_x, clip_extent.min_y],
        [clip_extent.max_x, clip_extent.max_y],
    );
    let mut candidates: Vec<usize> = tree
        .locate_in_envelope_intersecting(&query)
        .map(|e| e.index)
        .collect();
    candidates.sort_unstable();

    let mut out = FeatureCollection::new(collection.crs);
    out.schema = collection.schema.clone();
    for index in candidates {
        let feature = &collection.features[index];
        if let Some(clipped) = clipper.clip_geometry(&feature.geometry)? {
            let mut kept = Feature::new(clipped);
            kept.properties = feature.properties.clone();
            kept.id = feature.id.clone();
            out.features.push(kept);
        }
    }
    debug!(
        input = collection.len(),
        output = out.len(),
        "cropped vector layer"
    );
    Ok(out)
}

/// The crop geometry expressed in the data's CRS
fn geometry_in_crs(
    geometry: &BoundingGeometry,
    data_crs: Option<Crs>,
    cache: &TransformCache,
) -> Result<Polygon<f64>> {
    let target = match data_crs {
        Some(crs) => crs,
        None => {
            warn!("input has no CRS, assuming it matches the crop geometry");
            geometry.crs()
        }
    };
    let transform = cache.get(geometry.crs(), target);
    let mut ring = Vec::new();
    for (x, y) in geometry.vertices() {
        ring.push(transform.apply(x, y)?);
    }
    Ok(Polygon::new(LineString::from(ring), vec![]))
}

fn ring_extent(ring: &LineString<f64>) -> geoprep_core::Extent {
    let (min_x, min_y, max_x, max_y) = ring.0.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |acc, c| (acc.0.min(c.x), acc.1.min(c.y), acc.2.max(c.x), acc.3.max(c.y)),
    );
    geoprep_core::Extent { min_x, min_y, max_x, max_y }
}

struct FeatureEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Exact clip against the crop polygon, dispatched on its shape.
///
/// Edge-by-edge clipping only holds for convex boundaries; a concave
/// boundary falls back to the boolean overlay.
enum Clipper {
    Convex(ConvexClipper),
    General(GeneralClipper),
}

impl Clipper {
    fn new(polygon: &Polygon<f64>) -> Result<Self> {
        if polygon.exterior().0.len() < 4 {
            return Err(Error::Geometry("Clip polygon has too few vertices".to_string()));
        }
        if ring_is_convex(polygon.exterior()) {
            Ok(Clipper::Convex(ConvexClipper::new(polygon)?))
        } else {
            Ok(Clipper::General(GeneralClipper {
                polygon: polygon.clone(),
            }))
        }
    }

    fn clip_geometry(&self, geometry: &Geometry<f64>) -> Result<Option<Geometry<f64>>> {
        match self {
            Clipper::Convex(c) => c.clip_geometry(geometry),
            Clipper::General(g) => g.clip_geometry(geometry),
        }
    }
}

/// True when every turn of the closed ring shares one orientation
fn ring_is_convex(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    let n = coords.len() - 1;
    let mut sign = 0.0_f64;
    for i in 0..n {
        let a = coords[i];
        let b = coords[(i + 1) % n];
        let c = coords[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Boolean-overlay clipper for concave crop polygons
struct GeneralClipper {
    polygon: Polygon<f64>,
}

impl GeneralClipper {
    fn clip_geometry(&self, geometry: &Geometry<f64>) -> Result<Option<Geometry<f64>>> {
        let result = match geometry {
            Geometry::Point(p) => self
                .polygon
                .intersects(p)
                .then(|| Geometry::Point(*p)),
            Geometry::MultiPoint(mp) => {
                let kept: Vec<Point<f64>> = mp
                    .0
                    .iter()
                    .filter(|p| self.polygon.intersects(*p))
                    .copied()
                    .collect();
                (!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint(kept)))
            }
            Geometry::LineString(ls) => {
                let clipped = self
                    .polygon
                    .clip(&MultiLineString(vec![ls.clone()]), false);
                let mut parts: Vec<LineString<f64>> =
                    clipped.0.into_iter().filter(|l| l.0.len() >= 2).collect();
                match parts.len() {
                    0 => None,
                    1 => Some(Geometry::LineString(parts.remove(0))),
                    _ => Some(Geometry::MultiLineString(MultiLineString(parts))),
                }
            }
            Geometry::MultiLineString(mls) => {
                let clipped = self.polygon.clip(mls, false);
                let parts: Vec<LineString<f64>> =
                    clipped.0.into_iter().filter(|l| l.0.len() >= 2).collect();
                (!parts.is_empty()).then(|| Geometry::MultiLineString(MultiLineString(parts)))
            }
            Geometry::Polygon(p) => {
                let mut overlay = self.polygon.intersection(p);
                match overlay.0.len() {
                    0 => None,
                    1 => Some(Geometry::Polygon(overlay.0.remove(0))),
                    _ => Some(Geometry::MultiPolygon(overlay)),
                }
            }
            Geometry::MultiPolygon(mp) => {
                let overlay = MultiPolygon(vec![self.polygon.clone()]).intersection(mp);
                (!overlay.0.is_empty()).then(|| Geometry::MultiPolygon(overlay))
            }
            other => {
                return Err(Error::Geometry(format!(
                    "Cannot crop geometry type: {other:?}"
                )))
            }
        };
        Ok(result)
    }
}

/// Clipper against a convex polygon with counter-clockwise edges
struct ConvexClipper {
    /// Edge list as (start, end), counter-clockwise
    edges: Vec<(Coord<f64>, Coord<f64>)>,
    polygon: Polygon<f64>,
}

impl ConvexClipper {
    fn new(polygon: &Polygon<f64>) -> Result<Self> {
        let mut ring: Vec<Coord<f64>> = polygon.exterior().0.clone();
        if ring.len() < 4 {
            return Err(Error::Geometry("Clip polygon has too few vertices".to_string()));
        }
        // Normalize to counter-clockwise so the interior is left of every edge
        if polygon.signed_area() < 0.0 {
            ring.reverse();
        }
        let edges = ring.windows(2).map(|w| (w[0], w[1])).collect();
        Ok(ConvexClipper {
            edges,
            polygon: polygon.clone(),
        })
    }

    fn inside(&self, edge: &(Coord<f64>, Coord<f64>), p: &Coord<f64>) -> bool {
        let (a, b) = edge;
        (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x) >= 0.0
    }

    fn edge_intersection(
        edge: &(Coord<f64>, Coord<f64>),
        p: &Coord<f64>,
        q: &Coord<f64>,
    ) -> Coord<f64> {
        let (a, b) = edge;
        let edge_dir = (b.x - a.x, b.y - a.y);
        let seg_dir = (q.x - p.x, q.y - p.y);
        let denom = edge_dir.0 * seg_dir.1 - edge_dir.1 * seg_dir.0;
        // Callers only ask when the segment crosses the edge line
        let t = (edge_dir.1 * (p.x - a.x) - edge_dir.0 * (p.y - a.y)) / denom;
        Coord {
            x: p.x + t * seg_dir.0,
            y: p.y + t * seg_dir.1,
        }
    }

    /// Sutherland-Hodgman: clip a ring edge by edge
    fn clip_ring(&self, ring: &LineString<f64>) -> Vec<Coord<f64>> {
        let mut vertices: Vec<Coord<f64>> = ring.0.clone();
        if vertices.last() == vertices.first() && vertices.len() > 1 {
            vertices.pop();
        }
        for edge in &self.edges {
            if vertices.is_empty() {
                break;
            }
            let mut output = Vec::with_capacity(vertices.len() + 4);
            let n = vertices.len();
            for i in 0..n {
                let current = vertices[i];
                let next = vertices[(i + 1) % n];
                match (self.inside(edge, &current), self.inside(edge, &next)) {
                    (true, true) => output.push(next),
                    (true, false) => output.push(Self::edge_intersection(edge, &current, &next)),
                    (false, true) => {
                        output.push(Self::edge_intersection(edge, &current, &next));
                        output.push(next);
                    }
                    (false, false) => {}
                }
            }
            vertices = output;
        }
        vertices
    }

    /// Cyrus-Beck: parametric clip of one segment, `None` when fully outside
    fn clip_segment(&self, p: &Coord<f64>, q: &Coord<f64>) -> Option<(Coord<f64>, Coord<f64>)> {
        let d = (q.x - p.x, q.y - p.y);
        let mut t0 = 0.0_f64;
        let mut t1 = 1.0_f64;
        for (a, b) in &self.edges {
            // Outward normal of a counter-clockwise edge
            let n = (b.y - a.y, -(b.x - a.x));
            let num = n.0 * (a.x - p.x) + n.1 * (a.y - p.y);
            let den = n.0 * d.0 + n.1 * d.1;
            if den == 0.0 {
                if num < 0.0 {
                    return None;
                }
                continue;
            }
            let t = num / den;
            if den < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some((
            Coord { x: p.x + t0 * d.0, y: p.y + t0 * d.1 },
            Coord { x: p.x + t1 * d.0, y: p.y + t1 * d.1 },
        ))
    }

    /// Clip a polyline, stitching consecutive kept pieces back together
    fn clip_linestring(&self, line: &LineString<f64>) -> Vec<LineString<f64>> {
        let mut parts: Vec<Vec<Coord<f64>>> = Vec::new();
        let mut current: Vec<Coord<f64>> = Vec::new();
        for w in line.0.windows(2) {
            match self.clip_segment(&w[0], &w[1]) {
                Some((start, end)) => {
                    if current.last() != Some(&start) {
                        if current.len() > 1 {
                            parts.push(std::mem::take(&mut current));
                        } else {
                            current.clear();
                        }
                        current.push(start);
                    }
                    current.push(end);
                }
                None => {
                    if current.len() > 1 {
                        parts.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
            }
        }
        if current.len() > 1 {
            parts.push(current);
        }
        parts.into_iter().map(LineString::from).collect()
    }

    fn clip_polygon(&self, polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
        let exterior = self.clip_ring(polygon.exterior());
        if exterior.len() < 3 {
            return None;
        }
        let interiors: Vec<LineString<f64>> = polygon
            .interiors()
            .iter()
            .map(|ring| LineString::from(self.clip_ring(ring)))
            .filter(|ring| ring.0.len() >= 3)
            .collect();
        Some(Polygon::new(LineString::from(exterior), interiors))
    }

    /// Clip any supported geometry, `None` when nothing remains
    fn clip_geometry(&self, geometry: &Geometry<f64>) -> Result<Option<Geometry<f64>>> {
        let result = match geometry {
            Geometry::Point(p) => self
                .polygon
                .intersects(p)
                .then(|| Geometry::Point(*p)),
            Geometry::MultiPoint(mp) => {
                let kept: Vec<Point<f64>> = mp
                    .0
                    .iter()
                    .filter(|p| self.polygon.intersects(*p))
                    .copied()
                    .collect();
                (!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint(kept)))
            }
            Geometry::LineString(ls) => {
                let mut parts = self.clip_linestring(ls);
                match parts.len() {
                    0 => None,
                    1 => Some(Geometry::LineString(parts.remove(0))),
                    _ => Some(Geometry::MultiLineString(MultiLineString(parts))),
                }
            }
            Geometry::MultiLineString(mls) => {
                let parts: Vec<LineString<f64>> = mls
                    .0
                    .iter()
                    .flat_map(|ls| self.clip_linestring(ls))
                    .collect();
                (!parts.is_empty()).then(|| Geometry::MultiLineString(MultiLineString(parts)))
            }
            Geometry::Polygon(p) => self.clip_polygon(p).map(Geometry::Polygon),
            Geometry::MultiPolygon(mp) => {
                let parts: Vec<Polygon<f64>> = mp
                    .0
                    .iter()
                    .filter_map(|p| self.clip_polygon(p))
                    .collect();
                (!parts.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon(parts)))
            }
            other => {
                return Err(Error::Geometry(format!(
                    "Cannot crop geometry type: {other:?}"
                )))
            }
        };
        Ok(result)
    }
}
