//! Coordinate Reference System handling
//!
//! GeoPrep resolves CRS identifiers into [`Crs`] values backed by pure-Rust
//! projection math. The supported family covers the systems the tool
//! actually produces and consumes: WGS84 geographic (EPSG:4326), Web
//! Mercator (EPSG:3857) and the WGS84 UTM zones (EPSG:326xx / 327xx).

mod projection;
mod resolver;

pub use projection::Projection;
pub use resolver::{CrsResolver, TransformCache};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a CRS expresses coordinates in degrees or meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsKind {
    /// Longitude/latitude in degrees
    Geographic,
    /// Planar x/y in meters
    Projected,
}

/// A resolved coordinate reference system.
///
/// Immutable once constructed; carries the EPSG code, its kind and the
/// projection used to move between this CRS and geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    epsg: u32,
    kind: CrsKind,
}

impl Crs {
    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self { epsg: 4326, kind: CrsKind::Geographic }
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self { epsg: 3857, kind: CrsKind::Projected }
    }

    /// WGS84 UTM zone
    pub fn utm(zone: u8, north: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(Error::Crs(format!("UTM zone {zone} out of range 1-60")));
        }
        let base = if north { 32600 } else { 32700 };
        Ok(Self { epsg: base + zone as u32, kind: CrsKind::Projected })
    }

    /// Construct from an EPSG code, rejecting codes outside the supported family
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        match epsg {
            4326 => Ok(Self::wgs84()),
            3857 => Ok(Self::web_mercator()),
            32601..=32660 | 32701..=32760 => {
                Ok(Self { epsg, kind: CrsKind::Projected })
            }
            _ => Err(Error::Crs(format!(
                "Unsupported EPSG code {epsg}; supported: 4326, 3857, UTM 32601-32660 / 32701-32760"
            ))),
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    pub fn is_geographic(&self) -> bool {
        self.kind == CrsKind::Geographic
    }

    pub fn is_projected(&self) -> bool {
        self.kind == CrsKind::Projected
    }

    /// The projection mapping this CRS to/from geographic coordinates
    pub(crate) fn projection(&self) -> Projection {
        match self.epsg {
            4326 => Projection::Geographic,
            3857 => Projection::WebMercator,
            code @ 32601..=32660 => Projection::utm_zone((code - 32600) as u8, true),
            code @ 32701..=32760 => Projection::utm_zone((code - 32700) as u8, false),
            // from_epsg is the only constructor path, so this is unreachable
            other => unreachable!("unvalidated EPSG code {other}"),
        }
    }

    /// Identifier string, e.g. "EPSG:32633"
    pub fn identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    /// WKT1 representation written to .prj sidecars
    pub fn to_wkt(&self) -> String {
        match self.epsg {
            4326 => concat!(
                r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],"#,
                r#"PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],"#,
                r#"AUTHORITY["EPSG","4326"]]"#
            )
            .to_string(),
            3857 => concat!(
                r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984","#,
                r#"SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],"#,
                r#"UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],"#,
                r#"UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#
            )
            .to_string(),
            code => {
                let (zone, hemi, false_northing) = if code >= 32701 {
                    (code - 32700, "S", 10000000.0)
                } else {
                    (code - 32600, "N", 0.0)
                };
                let cm = zone as f64 * 6.0 - 183.0;
                format!(
                    concat!(
                        r#"PROJCS["WGS 84 / UTM zone {z}{h}",GEOGCS["WGS 84",DATUM["WGS_1984","#,
                        r#"SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],"#,
                        r#"UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],"#,
                        r#"PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",{cm}],"#,
                        r#"PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],"#,
                        r#"PARAMETER["false_northing",{fnorth}],UNIT["metre",1],"#,
                        r#"AUTHORITY["EPSG","{code}"]]"#
                    ),
                    z = zone,
                    h = hemi,
                    cm = cm,
                    fnorth = false_northing,
                    code = code
                )
            }
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// UTM zone number for a longitude, 1-60
pub fn utm_zone_for(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;
    zone.clamp(1, 60) as u8
}

/// EPSG code of the WGS84 UTM zone covering a geographic point
pub fn utm_epsg_for(lon: f64, lat: f64) -> u32 {
    let zone = utm_zone_for(lon) as u32;
    if lat >= 0.0 {
        32600 + zone
    } else {
        32700 + zone
    }
}

/// Check whether a code is a WGS84 UTM zone EPSG code
pub fn validate_utm_epsg(epsg: u32) -> Result<()> {
    match epsg {
        32601..=32660 | 32701..=32760 => Ok(()),
        _ => Err(Error::Crs(format!(
            "EPSG:{epsg} is not a UTM zone (expected 32601-32660 north or 32701-32760 south)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_epsg() {
        assert!(Crs::from_epsg(4326).unwrap().is_geographic());
        assert!(Crs::from_epsg(3857).unwrap().is_projected());
        assert!(Crs::from_epsg(32633).unwrap().is_projected());
        assert!(Crs::from_epsg(99999).is_err());
    }

    #[test]
    fn test_utm_zone_for() {
        // Oslo ~10.7E -> zone 32
        assert_eq!(utm_zone_for(10.7), 32);
        // Antimeridian edges stay clamped
        assert_eq!(utm_zone_for(-180.0), 1);
        assert_eq!(utm_zone_for(180.0), 60);
    }

    #[test]
    fn test_utm_epsg_for_hemispheres() {
        assert_eq!(utm_epsg_for(116.0, 40.0), 32650);
        assert_eq!(utm_epsg_for(116.0, -35.0), 32750);
    }

    #[test]
    fn test_validate_utm_epsg() {
        assert!(validate_utm_epsg(32633).is_ok());
        assert!(validate_utm_epsg(32760).is_ok());
        assert!(validate_utm_epsg(4326).is_err());
    }

    #[test]
    fn test_wkt_contains_authority() {
        let wkt = Crs::from_epsg(32633).unwrap().to_wkt();
        assert!(wkt.contains(r#"AUTHORITY["EPSG","32633"]"#));
        assert!(wkt.contains("central_meridian\",15"));
    }
}
