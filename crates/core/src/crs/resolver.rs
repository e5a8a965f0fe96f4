//! CRS identifier resolution and cached coordinate transforms

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{utm_epsg_for, Crs, Projection};
use crate::error::{Error, Result};

/// Parses user-facing CRS identifiers into [`Crs`] values.
///
/// Accepted forms: `EPSG:4326`, a bare EPSG code like `32633`, and the
/// named shorthands `wgs84` and `web-mercator`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrsResolver;

impl CrsResolver {
    pub fn new() -> Self {
        CrsResolver
    }

    pub fn resolve(&self, identifier: &str) -> Result<Crs> {
        let trimmed = identifier.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "wgs84" => return Ok(Crs::wgs84()),
            "web-mercator" | "webmercator" => return Ok(Crs::web_mercator()),
            _ => {}
        }
        let code_str = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        let code: u32 = code_str
            .parse()
            .map_err(|_| Error::Crs(format!("Cannot parse CRS identifier '{identifier}'")))?;
        Crs::from_epsg(code)
    }

    /// The projected CRS best suited for metric work near a geographic point
    pub fn suggest_projected(&self, lon: f64, lat: f64) -> Result<Crs> {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Crs(format!(
                "Point ({lon}, {lat}) outside geographic bounds"
            )));
        }
        Crs::from_epsg(utm_epsg_for(lon, lat))
    }
}

/// A coordinate mapping between two resolved CRS, pivoting through
/// geographic lon/lat when neither side is geographic.
#[derive(Debug)]
pub struct CrsTransform {
    src: Projection,
    dst: Projection,
    identity: bool,
}

impl CrsTransform {
    fn new(src: Crs, dst: Crs) -> Self {
        CrsTransform {
            src: src.projection(),
            dst: dst.projection(),
            identity: src == dst,
        }
    }

    /// Transform a single coordinate pair
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.identity {
            return Ok((x, y));
        }
        let (lon, lat) = self.src.inverse(x, y)?;
        self.dst.forward(lon, lat)
    }

    /// Transform an axis-aligned bounding box by densifying its edges.
    ///
    /// A projected box does not stay axis-aligned under reprojection, so
    /// each edge is sampled and the output box is the envelope of all
    /// transformed samples.
    pub fn apply_bounds(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        points_per_edge: usize,
    ) -> Result<(f64, f64, f64, f64)> {
        if self.identity {
            return Ok((min_x, min_y, max_x, max_y));
        }
        let n = points_per_edge.max(2);
        let mut out_min_x = f64::INFINITY;
        let mut out_min_y = f64::INFINITY;
        let mut out_max_x = f64::NEG_INFINITY;
        let mut out_max_y = f64::NEG_INFINITY;
        let mut visit = |x: f64, y: f64| -> Result<()> {
            let (tx, ty) = self.apply(x, y)?;
            out_min_x = out_min_x.min(tx);
            out_min_y = out_min_y.min(ty);
            out_max_x = out_max_x.max(tx);
            out_max_y = out_max_y.max(ty);
            Ok(())
        };
        for i in 0..n {
            let t = i as f64 / (n - 1) as f64;
            let x = min_x + t * (max_x - min_x);
            let y = min_y + t * (max_y - min_y);
            visit(x, min_y)?;
            visit(x, max_y)?;
            visit(min_x, y)?;
            visit(max_x, y)?;
        }
        Ok((out_min_x, out_min_y, out_max_x, out_max_y))
    }
}

/// Thread-safe cache of [`CrsTransform`] values keyed by EPSG code pair.
///
/// Lookups take a read lock; the first request for a pair builds the
/// transform under the write lock. Read-mostly by construction since the
/// number of distinct pairs in a run is tiny.
#[derive(Debug, Default)]
pub struct TransformCache {
    inner: RwLock<HashMap<(u32, u32), Arc<CrsTransform>>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, src: Crs, dst: Crs) -> Arc<CrsTransform> {
        let key = (src.epsg(), dst.epsg());
        {
            let map = self.inner.read().unwrap();
            if let Some(t) = map.get(&key) {
                return Arc::clone(t);
            }
        }
        let mut map = self.inner.write().unwrap();
        Arc::clone(map.entry(key).or_insert_with(|| {
            debug!(src = %src, dst = %dst, "building CRS transform");
            Arc::new(CrsTransform::new(src, dst))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resolve_forms() {
        let r = CrsResolver::new();
        assert_eq!(r.resolve("EPSG:4326").unwrap().epsg(), 4326);
        assert_eq!(r.resolve("epsg:3857").unwrap().epsg(), 3857);
        assert_eq!(r.resolve("32633").unwrap().epsg(), 32633);
        assert_eq!(r.resolve("wgs84").unwrap().epsg(), 4326);
        assert!(r.resolve("EPSG:abc").is_err());
        assert!(r.resolve("27700").is_err());
    }

    #[test]
    fn test_suggest_projected() {
        let r = CrsResolver::new();
        assert_eq!(r.suggest_projected(10.7, 59.9).unwrap().epsg(), 32632);
        assert_eq!(r.suggest_projected(151.2, -33.9).unwrap().epsg(), 32756);
        assert!(r.suggest_projected(200.0, 0.0).is_err());
    }

    #[test]
    fn test_identity_transform() {
        let cache = TransformCache::new();
        let t = cache.get(Crs::wgs84(), Crs::wgs84());
        let (x, y) = t.apply(12.34, 56.78).unwrap();
        assert_eq!((x, y), (12.34, 56.78));
    }

    #[test]
    fn test_pivot_roundtrip() {
        let cache = TransformCache::new();
        let utm = Crs::from_epsg(32633).unwrap();
        let fwd = cache.get(Crs::wgs84(), utm);
        let back = cache.get(utm, Crs::wgs84());
        let (e, n) = fwd.apply(15.5, 48.2).unwrap();
        let (lon, lat) = back.apply(e, n).unwrap();
        assert_relative_eq!(lon, 15.5, epsilon = 1e-6);
        assert_relative_eq!(lat, 48.2, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_densification_grows_envelope() {
        // UTM bends parallels, so edge samples fall outside the
        // corners-only envelope for a wide northern box
        let cache = TransformCache::new();
        let utm = Crs::from_epsg(32633).unwrap();
        let t = cache.get(Crs::wgs84(), utm);
        let corners_only = t.apply_bounds(9.0, 50.0, 21.0, 55.0, 2).unwrap();
        let densified = t.apply_bounds(9.0, 50.0, 21.0, 55.0, 21).unwrap();
        // Densified envelope contains the corners-only one
        assert!(densified.0 <= corners_only.0 + 1e-6);
        assert!(densified.1 <= corners_only.1 + 1e-6);
        assert!(densified.2 >= corners_only.2 - 1e-6);
        assert!(densified.3 >= corners_only.3 - 1e-6);
    }

    #[test]
    fn test_cache_reuses_transform() {
        let cache = TransformCache::new();
        let a = cache.get(Crs::wgs84(), Crs::web_mercator());
        let b = cache.get(Crs::wgs84(), Crs::web_mercator());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
