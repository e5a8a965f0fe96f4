//! Core geometry types: coordinates, extents and validated bounding polygons

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BoundingRect, Centroid, Line, Polygon};
use geo_types::{coord, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::{Error, Result};

/// Degenerate-area threshold relative to the ring's envelope area
const MIN_AREA_RATIO: f64 = 1e-9;

/// A position tagged with the CRS its numbers are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub crs: Crs,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, crs: Crs) -> Result<Self> {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::Input(format!("Non-finite coordinate ({x}, {y})")));
        }
        Ok(Coordinate { x, y, crs })
    }
}

/// Axis-aligned extent in some CRS's units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        if min_x > max_x || min_y > max_y {
            return Err(Error::Geometry(format!(
                "Invalid extent: ({min_x}, {min_y}) - ({max_x}, {max_y})"
            )));
        }
        Ok(Extent { min_x, min_y, max_x, max_y })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// The extent as a closed counter-clockwise polygon
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

/// A validated simple polygon tagged with its CRS.
///
/// Construction rejects open rings, duplicate consecutive vertices,
/// self-intersections and near-zero areas, so downstream code can assume
/// a well-formed footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingGeometry {
    polygon: Polygon<f64>,
    crs: Crs,
}

impl BoundingGeometry {
    /// Build from an ordered exterior ring (closing vertex optional)
    pub fn new(mut vertices: Vec<(f64, f64)>, crs: Crs) -> Result<Self> {
        for &(x, y) in &vertices {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::Geometry(format!(
                    "Non-finite vertex ({x}, {y})"
                )));
            }
        }
        if let (Some(first), Some(last)) = (vertices.first().copied(), vertices.last().copied()) {
            if first == last && vertices.len() > 1 {
                vertices.pop();
            }
        }
        if vertices.len() < 3 {
            return Err(Error::Geometry(format!(
                "Polygon needs at least 3 distinct vertices, got {}",
                vertices.len()
            )));
        }
        for w in vertices.windows(2) {
            if w[0] == w[1] {
                return Err(Error::Geometry(
                    "Duplicate consecutive vertices".to_string(),
                ));
            }
        }
        let ring: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| coord! { x: x, y: y }).collect();
        let polygon = Polygon::new(LineString::from(ring), vec![]);

        if ring_self_intersects(&polygon) {
            return Err(Error::Geometry("Polygon is self-intersecting".to_string()));
        }

        // Compare against the envelope so the check is independent of how
        // far the ring sits from the origin
        let (min_x, min_y, max_x, max_y) = vertices.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |acc, &(x, y)| (acc.0.min(x), acc.1.min(y), acc.2.max(x), acc.3.max(y)),
        );
        let (span_x, span_y) = (max_x - min_x, max_y - min_y);
        let area = polygon.unsigned_area();
        if area <= MIN_AREA_RATIO * span_x * span_y {
            return Err(Error::Geometry(format!(
                "Polygon area {area} is degenerate"
            )));
        }

        Ok(BoundingGeometry { polygon, crs })
    }

    /// Rectangle from an axis-aligned extent
    pub fn from_extent(extent: Extent, crs: Crs) -> Result<Self> {
        Self::new(
            vec![
                (extent.min_x, extent.min_y),
                (extent.max_x, extent.min_y),
                (extent.max_x, extent.max_y),
                (extent.min_x, extent.max_y),
            ],
            crs,
        )
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Exterior vertices without the closing duplicate
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        let coords = self.polygon.exterior().0.as_slice();
        coords[..coords.len() - 1].iter().map(|c| (c.x, c.y)).collect()
    }

    pub fn extent(&self) -> Extent {
        // Validated non-degenerate, so a bounding rect always exists
        let rect = self.polygon.bounding_rect().unwrap();
        Extent {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }

    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    pub fn centroid(&self) -> (f64, f64) {
        let c = self.polygon.centroid().unwrap();
        (c.x(), c.y())
    }

    /// Same ring re-tagged after an external vertex transform
    pub fn with_vertices(&self, vertices: Vec<(f64, f64)>, crs: Crs) -> Result<Self> {
        Self::new(vertices, crs)
    }
}

/// True when any two non-adjacent exterior edges cross properly
fn ring_self_intersects(polygon: &Polygon<f64>) -> bool {
    let coords = &polygon.exterior().0;
    let n = coords.len() - 1;
    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(coords[i], coords[i + 1]))
        .collect();
    for i in 0..n {
        for j in (i + 1)..n {
            // Skip adjacent edges (sharing a vertex), including the wrap-around pair
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            match line_intersection(edges[i], edges[j]) {
                Some(LineIntersection::SinglePoint { is_proper: true, .. })
                | Some(LineIntersection::Collinear { .. }) => return true,
                _ => {}
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wgs84() -> Crs {
        Crs::wgs84()
    }

    #[test]
    fn test_extent_basic() {
        let e = Extent::new(0.0, 0.0, 10.0, 5.0).unwrap();
        assert_relative_eq!(e.width(), 10.0);
        assert_relative_eq!(e.height(), 5.0);
        assert_eq!(e.center(), (5.0, 2.5));
        assert!(Extent::new(10.0, 0.0, 0.0, 5.0).is_err());
    }

    #[test]
    fn test_extent_intersection_union() {
        let a = Extent::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = Extent::new(5.0, 5.0, 15.0, 15.0).unwrap();
        let i = a.intersection(&b).unwrap();
        assert_eq!((i.min_x, i.min_y, i.max_x, i.max_y), (5.0, 5.0, 10.0, 10.0));
        let u = a.union(&b);
        assert_eq!((u.min_x, u.min_y, u.max_x, u.max_y), (0.0, 0.0, 15.0, 15.0));
        let c = Extent::new(20.0, 20.0, 30.0, 30.0).unwrap();
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_bounding_geometry_valid_square() {
        let g = BoundingGeometry::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            wgs84(),
        )
        .unwrap();
        assert_relative_eq!(g.area(), 100.0);
        assert_eq!(g.centroid(), (5.0, 5.0));
        assert_eq!(g.vertices().len(), 4);
    }

    #[test]
    fn test_bounding_geometry_accepts_closed_ring() {
        let g = BoundingGeometry::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            wgs84(),
        )
        .unwrap();
        assert_eq!(g.vertices().len(), 4);
    }

    #[test]
    fn test_bounding_geometry_rejects_bowtie() {
        let result = BoundingGeometry::new(
            vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)],
            wgs84(),
        );
        assert!(matches!(result, Err(Error::Geometry(_))));
    }

    #[test]
    fn test_bounding_geometry_rejects_degenerate() {
        // Collinear ring, zero area
        let result = BoundingGeometry::new(
            vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (2.0, 0.0)],
            wgs84(),
        );
        assert!(result.is_err());

        let result = BoundingGeometry::new(vec![(0.0, 0.0), (1.0, 1.0)], wgs84());
        assert!(result.is_err());
    }

    #[test]
    fn test_small_box_far_from_origin_accepted() {
        // A 100 m box at UTM coordinates is valid regardless of how large
        // the eastings and northings are
        let north = BoundingGeometry::new(
            vec![
                (500000.0, 4650000.0),
                (500100.0, 4650000.0),
                (500100.0, 4650100.0),
                (500000.0, 4650100.0),
            ],
            Crs::from_epsg(32633).unwrap(),
        )
        .unwrap();
        assert_relative_eq!(north.area(), 10000.0);

        // Southern-hemisphere northings near 1e7 behave the same
        let south = BoundingGeometry::new(
            vec![
                (500000.0, 9650000.0),
                (500100.0, 9650000.0),
                (500100.0, 9650100.0),
                (500000.0, 9650100.0),
            ],
            Crs::from_epsg(32733).unwrap(),
        )
        .unwrap();
        assert_relative_eq!(south.area(), 10000.0);
    }

    #[test]
    fn test_near_collinear_ring_rejected() {
        // Vanishing area relative to the ring's envelope
        let result = BoundingGeometry::new(
            vec![(0.0, 0.0), (1000.0, 1000.0), (500.0, 500.0 + 1e-9)],
            wgs84(),
        );
        assert!(matches!(result, Err(Error::Geometry(_))));
    }

    #[test]
    fn test_from_extent_roundtrip() {
        let e = Extent::new(1.0, 2.0, 3.0, 4.0).unwrap();
        let g = BoundingGeometry::from_extent(e, wgs84()).unwrap();
        assert_eq!(g.extent(), e);
    }
}
