//! Pure-Rust projection math for the supported CRS family.
//!
//! Every supported CRS maps to/from WGS84 geographic coordinates, which act
//! as the pivot for arbitrary CRS-to-CRS transforms. Transverse Mercator
//! uses the Krueger series in the Karney form, accurate to well below a
//! millimeter inside a UTM zone.

use crate::error::{Error, Result};

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// UTM scale factor at the central meridian
const UTM_K0: f64 = 0.9996;
/// UTM false easting in meters
const UTM_FALSE_EASTING: f64 = 500_000.0;
/// UTM false northing for the southern hemisphere
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Web Mercator latitude limit in degrees
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Forward/inverse mapping between a CRS and geographic lon/lat degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Identity: coordinates already are lon/lat degrees
    Geographic,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    /// Ellipsoidal transverse Mercator with UTM parameters
    TransverseMercator {
        /// Central meridian in degrees
        lon0: f64,
        /// False northing in meters (0 north, 10,000,000 south)
        false_northing: f64,
    },
}

impl Projection {
    /// Transverse Mercator parameters for a UTM zone
    pub fn utm_zone(zone: u8, north: bool) -> Self {
        Projection::TransverseMercator {
            lon0: zone as f64 * 6.0 - 183.0,
            false_northing: if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH },
        }
    }

    /// Geographic (lon, lat) degrees to projected (x, y)
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(Error::Crs(format!("Non-finite coordinate ({lon}, {lat})")));
        }
        match *self {
            Projection::Geographic => Ok((lon, lat)),
            Projection::WebMercator => {
                let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
                let x = lon.to_radians() * WGS84_A;
                let y = ((lat.to_radians() / 2.0 + std::f64::consts::FRAC_PI_4).tan()).ln() * WGS84_A;
                Ok((x, y))
            }
            Projection::TransverseMercator { lon0, false_northing } => {
                Ok(tmerc_forward(lon, lat, lon0, false_northing))
            }
        }
    }

    /// Projected (x, y) to geographic (lon, lat) degrees
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::Crs(format!("Non-finite coordinate ({x}, {y})")));
        }
        match *self {
            Projection::Geographic => Ok((x, y)),
            Projection::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                Ok((lon, lat))
            }
            Projection::TransverseMercator { lon0, false_northing } => {
                Ok(tmerc_inverse(x, y, lon0, false_northing))
            }
        }
    }
}

/// Series coefficients shared by the forward and inverse mappings
struct KruegerSeries {
    /// Rectifying radius times k0
    scaled_radius: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    /// Third flattening
    n: f64,
}

fn krueger() -> KruegerSeries {
    let n = WGS84_F / (2.0 - WGS84_F);
    let n2 = n * n;
    let n3 = n2 * n;
    let radius = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
    KruegerSeries {
        scaled_radius: UTM_K0 * radius,
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 - 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
        n,
    }
}

fn tmerc_forward(lon: f64, lat: f64, lon0: f64, false_northing: f64) -> (f64, f64) {
    let series = krueger();
    let lam = (lon - lon0).to_radians();
    let phi = lat.to_radians();

    let e_term = 2.0 * series.n.sqrt() / (1.0 + series.n);
    let t = (phi.sin().atanh() - e_term * (e_term * phi.sin()).atanh()).sinh();

    let xi_p = (t / lam.cos()).atan();
    let eta_p = (lam.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, a) in series.alpha.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
        eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
    }

    let easting = UTM_FALSE_EASTING + series.scaled_radius * eta;
    let northing = false_northing + series.scaled_radius * xi;
    (easting, northing)
}

fn tmerc_inverse(x: f64, y: f64, lon0: f64, false_northing: f64) -> (f64, f64) {
    let series = krueger();
    let xi = (y - false_northing) / series.scaled_radius;
    let eta = (x - UTM_FALSE_EASTING) / series.scaled_radius;

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, b) in series.beta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi_p -= b * (k * xi).sin() * (k * eta).cosh();
        eta_p -= b * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, d) in series.delta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        phi += d * (k * chi).sin();
    }

    let lam = eta_p.sinh().atan2(xi_p.cos());
    (lon0 + lam.to_degrees(), phi.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_web_mercator_roundtrip() {
        let p = Projection::WebMercator;
        let (x, y) = p.forward(13.4, 52.5).unwrap();
        let (lon, lat) = p.inverse(x, y).unwrap();
        assert_relative_eq!(lon, 13.4, epsilon = 1e-9);
        assert_relative_eq!(lat, 52.5, epsilon = 1e-9);
    }

    #[test]
    fn test_web_mercator_known_point() {
        // Null island maps to the origin
        let p = Projection::WebMercator;
        let (x, y) = p.forward(0.0, 0.0).unwrap();
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_utm_known_point() {
        // Munich (11.6E, 48.15N) in UTM 32N
        let p = Projection::utm_zone(32, true);
        let (e, n) = p.forward(11.6, 48.15).unwrap();
        assert_relative_eq!(e, 693378.2, epsilon = 1.0);
        assert_relative_eq!(n, 5336241.7, epsilon = 1.0);
    }

    #[test]
    fn test_utm_central_meridian_easting() {
        // Points on the central meridian sit at the false easting
        let p = Projection::utm_zone(33, true);
        let (e, _) = p.forward(15.0, 45.0).unwrap();
        assert_relative_eq!(e, 500_000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_utm_roundtrip_high_latitude() {
        let p = Projection::utm_zone(33, true);
        let (e, n) = p.forward(14.2, 67.8).unwrap();
        let (lon, lat) = p.inverse(e, n).unwrap();
        assert_relative_eq!(lon, 14.2, epsilon = 1e-6);
        assert_relative_eq!(lat, 67.8, epsilon = 1e-6);
    }

    #[test]
    fn test_utm_southern_hemisphere() {
        // Sydney (~151.2E, -33.87) in UTM 56S: northing stays positive
        let p = Projection::utm_zone(56, false);
        let (e, n) = p.forward(151.2, -33.87).unwrap();
        assert!(e > 0.0 && n > 0.0);
        let (lon, lat) = p.inverse(e, n).unwrap();
        assert_relative_eq!(lon, 151.2, epsilon = 1e-6);
        assert_relative_eq!(lat, -33.87, epsilon = 1e-6);
    }

    #[test]
    fn test_non_finite_rejected() {
        let p = Projection::WebMercator;
        assert!(p.forward(f64::NAN, 0.0).is_err());
        assert!(p.inverse(f64::INFINITY, 0.0).is_err());
    }
}
