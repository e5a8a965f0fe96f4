//! ESRI Shapefile writing
//!
//! Hand-written encoder for the fixed-layout .shp/.shx/.dbf triple plus a
//! .prj sidecar carrying the CRS as WKT. Covers the shape types GeoPrep
//! produces: Point, PolyLine and Polygon (multi-polygons flatten into
//! multi-ring polygon records). All files are staged and atomically
//! renamed together.

use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use geo::Area;
use geo_types::{Geometry, LineString, Polygon};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Extent;
use crate::io::staged::{path_locks, StagedWriter};
use crate::vector::{AttributeValue, FeatureCollection};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;

const SHAPE_POINT: i32 = 1;
const SHAPE_POLYLINE: i32 = 3;
const SHAPE_POLYGON: i32 = 5;

/// Write a feature collection as a shapefile set.
///
/// `path` names the .shp file; the .shx, .dbf and .prj siblings are
/// derived from it. Returns the paths written.
pub fn write_shapefile<P: AsRef<Path>>(
    collection: &FeatureCollection,
    path: P,
) -> Result<Vec<PathBuf>> {
    let shp_path = path.as_ref().with_extension("shp");
    let lock = path_locks().for_path(&shp_path);
    let _guard = lock.lock().unwrap();

    let shape_type = uniform_shape_type(collection)?;
    let records: Vec<Vec<u8>> = collection
        .iter()
        .map(|f| encode_shape(&f.geometry, shape_type))
        .collect::<Result<_>>()?;
    let extent = collection
        .extent()
        .unwrap_or(Extent { min_x: 0.0, min_y: 0.0, max_x: 0.0, max_y: 0.0 });

    let shx_path = shp_path.with_extension("shx");
    let dbf_path = shp_path.with_extension("dbf");

    let staged_shp = StagedWriter::begin(&shp_path)?;
    let staged_shx = StagedWriter::begin(&shx_path)?;
    let staged_dbf = StagedWriter::begin(&dbf_path)?;

    write_shp_and_shx(
        &mut staged_shp.create()?,
        &mut staged_shx.create()?,
        shape_type,
        &extent,
        &records,
    )
    .map_err(|e| write_error(&shp_path, e))?;
    write_dbf(&mut staged_dbf.create()?, collection).map_err(|e| write_error(&dbf_path, e))?;

    let mut written = vec![
        staged_shp.commit()?,
        staged_shx.commit()?,
        staged_dbf.commit()?,
    ];

    if let Some(crs) = collection.crs {
        let prj_path = shp_path.with_extension("prj");
        let staged_prj = StagedWriter::begin(&prj_path)?;
        staged_prj
            .create()?
            .write_all(crs.to_wkt().as_bytes())
            .map_err(|e| write_error(&prj_path, e))?;
        written.push(staged_prj.commit()?);
    }

    debug!(path = %shp_path.display(), records = records.len(), "wrote shapefile");
    Ok(written)
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Shapefiles hold exactly one shape type; mixed collections are rejected
fn uniform_shape_type(collection: &FeatureCollection) -> Result<i32> {
    let mut shape_type = None;
    for feature in collection.iter() {
        let t = match &feature.geometry {
            Geometry::Point(_) => SHAPE_POINT,
            Geometry::LineString(_) => SHAPE_POLYLINE,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => SHAPE_POLYGON,
            other => {
                return Err(Error::Geometry(format!(
                    "Geometry type not representable in a shapefile: {other:?}"
                )))
            }
        };
        match shape_type {
            None => shape_type = Some(t),
            Some(prev) if prev != t => {
                return Err(Error::Geometry(
                    "Shapefile requires a single geometry type per layer".to_string(),
                ))
            }
            _ => {}
        }
    }
    shape_type.ok_or_else(|| Error::Input("Cannot write an empty shapefile".to_string()))
}

/// Record content for one geometry, without the record header
fn encode_shape(geometry: &Geometry<f64>, shape_type: i32) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_i32::<LittleEndian>(shape_type)?;
    match geometry {
        Geometry::Point(p) => {
            buf.write_f64::<LittleEndian>(p.x())?;
            buf.write_f64::<LittleEndian>(p.y())?;
        }
        Geometry::LineString(ls) => {
            encode_parts(&mut buf, &[ls.0.iter().map(|c| (c.x, c.y)).collect()])?;
        }
        Geometry::Polygon(polygon) => {
            encode_parts(&mut buf, &polygon_rings(polygon))?;
        }
        Geometry::MultiPolygon(mp) => {
            let rings: Vec<Vec<(f64, f64)>> =
                mp.0.iter().flat_map(|p| polygon_rings(p)).collect();
            encode_parts(&mut buf, &rings)?;
        }
        other => {
            return Err(Error::Geometry(format!(
                "Geometry type not representable in a shapefile: {other:?}"
            )))
        }
    }
    Ok(buf)
}

/// Rings in shapefile orientation: outer clockwise, holes counter-clockwise
fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Vec<(f64, f64)>> {
    let mut rings = vec![oriented_ring(polygon.exterior(), true)];
    for interior in polygon.interiors() {
        rings.push(oriented_ring(interior, false));
    }
    rings
}

fn oriented_ring(ring: &LineString<f64>, clockwise: bool) -> Vec<(f64, f64)> {
    let mut coords: Vec<(f64, f64)> = ring.0.iter().map(|c| (c.x, c.y)).collect();
    // geo's signed area is positive for counter-clockwise rings
    let ccw = ring_signed_area(ring) > 0.0;
    if ccw == clockwise {
        coords.reverse();
    }
    coords
}

fn ring_signed_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).signed_area()
}

/// Multi-part body shared by PolyLine and Polygon records
fn encode_parts(buf: &mut Vec<u8>, parts: &[Vec<(f64, f64)>]) -> Result<()> {
    let all: Vec<(f64, f64)> = parts.iter().flatten().copied().collect();
    let (min_x, min_y, max_x, max_y) = all.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |acc, &(x, y)| (acc.0.min(x), acc.1.min(y), acc.2.max(x), acc.3.max(y)),
    );
    buf.write_f64::<LittleEndian>(min_x)?;
    buf.write_f64::<LittleEndian>(min_y)?;
    buf.write_f64::<LittleEndian>(max_x)?;
    buf.write_f64::<LittleEndian>(max_y)?;
    buf.write_i32::<LittleEndian>(parts.len() as i32)?;
    buf.write_i32::<LittleEndian>(all.len() as i32)?;
    let mut offset = 0i32;
    for part in parts {
        buf.write_i32::<LittleEndian>(offset)?;
        offset += part.len() as i32;
    }
    for (x, y) in all {
        buf.write_f64::<LittleEndian>(x)?;
        buf.write_f64::<LittleEndian>(y)?;
    }
    Ok(())
}

fn write_main_header<W: Write>(
    w: &mut W,
    file_len_words: i32,
    shape_type: i32,
    extent: &Extent,
) -> std::io::Result<()> {
    w.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        w.write_i32::<BigEndian>(0)?;
    }
    w.write_i32::<BigEndian>(file_len_words)?;
    w.write_i32::<LittleEndian>(VERSION)?;
    w.write_i32::<LittleEndian>(shape_type)?;
    w.write_f64::<LittleEndian>(extent.min_x)?;
    w.write_f64::<LittleEndian>(extent.min_y)?;
    w.write_f64::<LittleEndian>(extent.max_x)?;
    w.write_f64::<LittleEndian>(extent.max_y)?;
    // Z and M ranges, unused
    for _ in 0..4 {
        w.write_f64::<LittleEndian>(0.0)?;
    }
    Ok(())
}

fn write_shp_and_shx<W1: Write, W2: Write>(
    shp: &mut W1,
    shx: &mut W2,
    shape_type: i32,
    extent: &Extent,
    records: &[Vec<u8>],
) -> std::io::Result<()> {
    // Lengths throughout are in 16-bit words
    let shp_len_words =
        50 + records.iter().map(|r| 4 + r.len() as i32 / 2).sum::<i32>();
    let shx_len_words = 50 + records.len() as i32 * 4;

    write_main_header(shp, shp_len_words, shape_type, extent)?;
    write_main_header(shx, shx_len_words, shape_type, extent)?;

    let mut offset_words = 50i32;
    for (index, record) in records.iter().enumerate() {
        let content_words = record.len() as i32 / 2;
        shx.write_i32::<BigEndian>(offset_words)?;
        shx.write_i32::<BigEndian>(content_words)?;

        shp.write_i32::<BigEndian>(index as i32 + 1)?;
        shp.write_i32::<BigEndian>(content_words)?;
        shp.write_all(record)?;
        offset_words += 4 + content_words;
    }
    Ok(())
}

/// Field layout for the dBASE attribute table
struct DbfField {
    name: String,
    kind: u8,
    width: u8,
}

fn dbf_fields(collection: &FeatureCollection) -> Vec<DbfField> {
    collection
        .schema
        .iter()
        .map(|field| {
            // Field type inferred from the first non-null value
            let sample = collection
                .iter()
                .find_map(|f| match f.get_property(field) {
                    Some(AttributeValue::Null) | None => None,
                    Some(v) => Some(v),
                });
            let (kind, width) = match sample {
                Some(AttributeValue::Int(_)) => (b'N', 18),
                Some(AttributeValue::Float(_)) => (b'N', 24),
                Some(AttributeValue::Bool(_)) => (b'L', 1),
                _ => (b'C', 64),
            };
            // dBASE caps names at 10 bytes
            let name: String = field.chars().take(10).collect();
            DbfField { name, kind, width }
        })
        .collect()
}

fn dbf_value_text(value: Option<&AttributeValue>, field: &DbfField) -> String {
    let text = match value {
        None | Some(AttributeValue::Null) => String::new(),
        Some(AttributeValue::Bool(b)) => if *b { "T" } else { "F" }.to_string(),
        Some(AttributeValue::Int(i)) => i.to_string(),
        Some(AttributeValue::Float(f)) => format!("{f:.6}"),
        Some(AttributeValue::String(s)) => s.clone(),
    };
    // Field widths count bytes; cut on a char boundary so the record
    // never overruns its declared size
    let width = field.width as usize;
    let mut text = text;
    if text.len() > width {
        let mut cut = width;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    if field.kind == b'N' {
        // Numbers are right-justified
        while text.len() < width {
            text.insert(0, ' ');
        }
    } else {
        while text.len() < width {
            text.push(' ');
        }
    }
    text
}

fn write_dbf<W: Write>(w: &mut W, collection: &FeatureCollection) -> std::io::Result<()> {
    let fields = dbf_fields(collection);
    let header_size = 32 + 32 * fields.len() as u16 + 1;
    let record_size = 1 + fields.iter().map(|f| f.width as u16).sum::<u16>();

    w.write_u8(0x03)?;
    // Last-update date, not meaningful for generated files
    w.write_all(&[126, 1, 1])?;
    w.write_u32::<LittleEndian>(collection.len() as u32)?;
    w.write_u16::<LittleEndian>(header_size)?;
    w.write_u16::<LittleEndian>(record_size)?;
    w.write_all(&[0u8; 20])?;

    for field in &fields {
        let mut name_bytes = [0u8; 11];
        let raw = field.name.as_bytes();
        name_bytes[..raw.len().min(11)].copy_from_slice(&raw[..raw.len().min(11)]);
        w.write_all(&name_bytes)?;
        w.write_u8(field.kind)?;
        w.write_all(&[0u8; 4])?;
        w.write_u8(field.width)?;
        w.write_u8(if field.kind == b'N' { 6 } else { 0 })?;
        w.write_all(&[0u8; 14])?;
    }
    w.write_u8(0x0D)?;

    for feature in collection.iter() {
        w.write_u8(b' ')?;
        for (field, schema_name) in fields.iter().zip(&collection.schema) {
            let text = dbf_value_text(feature.get_property(schema_name), field);
            w.write_all(text.as_bytes())?;
        }
    }
    w.write_u8(0x1A)?;
    Ok(())
}
