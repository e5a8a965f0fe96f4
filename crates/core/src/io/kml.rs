//! KML writing
//!
//! KML has no CRS concept; coordinates are always WGS84 lon/lat. The
//! writer therefore refuses collections tagged with any other CRS, and
//! reprojection happens upstream. Text content goes through quick-xml's
//! escaping.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use geo_types::{Geometry, LineString};
use quick_xml::escape::escape;

use crate::error::{Error, Result};
use crate::io::staged::{path_locks, StagedWriter};
use crate::vector::{AttributeValue, Feature, FeatureCollection};

/// Write a feature collection as a KML document, staged and atomically
/// renamed
pub fn write_kml<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(crs) = collection.crs {
        if crs.epsg() != 4326 {
            return Err(Error::Crs(format!(
                "KML requires EPSG:4326 coordinates, collection is {crs}"
            )));
        }
    }

    let lock = path_locks().for_path(path);
    let _guard = lock.lock().unwrap();

    let document_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "geoprep".to_string());
    let body = render_kml(collection, &document_name)?;

    let staged = StagedWriter::begin(path)?;
    staged
        .create()?
        .write_all(body.as_bytes())
        .map_err(|e| Error::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    staged.commit()?;
    Ok(())
}

fn render_kml(collection: &FeatureCollection, document_name: &str) -> Result<String> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n");
    out.push_str("  <Document>\n");
    let _ = writeln!(out, "    <name>{}</name>", escape(document_name));

    for (index, feature) in collection.iter().enumerate() {
        write_placemark(&mut out, collection, feature, index)?;
    }

    out.push_str("  </Document>\n");
    out.push_str("</kml>\n");
    Ok(out)
}

fn write_placemark(
    out: &mut String,
    collection: &FeatureCollection,
    feature: &Feature,
    index: usize,
) -> Result<()> {
    out.push_str("    <Placemark>\n");
    let name = feature
        .id
        .clone()
        .unwrap_or_else(|| format!("feature-{index}"));
    let _ = writeln!(out, "      <name>{}</name>", escape(&name));

    if !collection.schema.is_empty() {
        out.push_str("      <ExtendedData>\n");
        for field in &collection.schema {
            if let Some(value) = feature.get_property(field) {
                let _ = writeln!(
                    out,
                    "        <Data name=\"{}\"><value>{}</value></Data>",
                    escape(field),
                    escape(&attribute_text(value))
                );
            }
        }
        out.push_str("      </ExtendedData>\n");
    }

    write_geometry(out, &feature.geometry, 6)?;
    out.push_str("    </Placemark>\n");
    Ok(())
}

fn write_geometry(out: &mut String, geometry: &Geometry<f64>, indent: usize) -> Result<()> {
    let pad = " ".repeat(indent);
    match geometry {
        Geometry::Point(p) => {
            let _ = writeln!(
                out,
                "{pad}<Point><coordinates>{},{},0</coordinates></Point>",
                p.x(),
                p.y()
            );
        }
        Geometry::LineString(ls) => {
            let _ = writeln!(
                out,
                "{pad}<LineString><coordinates>{}</coordinates></LineString>",
                coordinates_text(ls)
            );
        }
        Geometry::Polygon(polygon) => {
            let _ = writeln!(out, "{pad}<Polygon>");
            let _ = writeln!(
                out,
                "{pad}  <outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs>",
                coordinates_text(polygon.exterior())
            );
            for interior in polygon.interiors() {
                let _ = writeln!(
                    out,
                    "{pad}  <innerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></innerBoundaryIs>",
                    coordinates_text(interior)
                );
            }
            let _ = writeln!(out, "{pad}</Polygon>");
        }
        Geometry::MultiPolygon(mp) => {
            let _ = writeln!(out, "{pad}<MultiGeometry>");
            for polygon in &mp.0 {
                write_geometry(out, &Geometry::Polygon(polygon.clone()), indent + 2)?;
            }
            let _ = writeln!(out, "{pad}</MultiGeometry>");
        }
        other => {
            return Err(Error::Geometry(format!(
                "Geometry type not representable in KML: {other:?}"
            )));
        }
    }
    Ok(())
}

fn coordinates_text(line: &LineString<f64>) -> String {
    line.0
        .iter()
        .map(|c| format!("{},{},0", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn attribute_text(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Null => String::new(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Int(i) => i.to_string(),
        AttributeValue::Float(f) => f.to_string(),
        AttributeValue::String(s) => s.clone(),
    }
}
