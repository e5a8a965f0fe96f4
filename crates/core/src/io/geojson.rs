//! GeoJSON reading and writing via the `geojson` crate

use std::convert::TryFrom;
use std::fs;
use std::io::Write;
use std::path::Path;

use geojson::{GeoJson, JsonObject, JsonValue};
use tracing::debug;

use crate::crs::{Crs, CrsResolver};
use crate::error::{Error, Result};
use crate::io::staged::{path_locks, StagedWriter};
use crate::vector::{AttributeValue, Feature, FeatureCollection};

/// Read a GeoJSON file into a feature collection.
///
/// RFC 7946 drops the `crs` member, so absent any hint the collection is
/// tagged WGS84. Legacy named CRS members are honored when they parse to
/// a supported EPSG code.
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| Error::Input(format!("{}: invalid GeoJSON: {e}", path.display())))?;

    let gj_collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => geojson::FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(g) => geojson::FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };

    let crs = gj_collection
        .foreign_members
        .as_ref()
        .and_then(parse_legacy_crs)
        .unwrap_or_else(Crs::wgs84);

    let mut collection = FeatureCollection::new(Some(crs));
    for gj_feature in gj_collection.features {
        let geometry = gj_feature
            .geometry
            .ok_or_else(|| Error::Input(format!("{}: feature without geometry", path.display())))?;
        let geometry = geo_types::Geometry::<f64>::try_from(geometry.value)
            .map_err(|e| Error::Input(format!("{}: unsupported geometry: {e}", path.display())))?;
        let mut feature = Feature::new(geometry);
        feature.id = match gj_feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => None,
        };
        if let Some(props) = gj_feature.properties {
            for (key, value) in props {
                feature.set_property(key, json_to_attribute(value));
            }
        }
        collection.push(feature);
    }
    debug!(path = %path.display(), count = collection.len(), "read geojson");
    Ok(collection)
}

fn parse_legacy_crs(members: &JsonObject) -> Option<Crs> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    // Accept both "EPSG:32633" and "urn:ogc:def:crs:EPSG::32633"
    let code = name.rsplit(':').next()?;
    CrsResolver::new().resolve(code).ok()
}

fn json_to_attribute(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Int(i)
            } else {
                AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Int(i) => JsonValue::from(*i),
        AttributeValue::Float(f) => JsonValue::from(*f),
        AttributeValue::String(s) => JsonValue::String(s.clone()),
    }
}

/// Write a feature collection as GeoJSON, staged and atomically renamed.
///
/// A non-WGS84 collection gets a legacy `crs` member naming its EPSG code.
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let path = path.as_ref();
    let lock = path_locks().for_path(path);
    let _guard = lock.lock().unwrap();

    let features: Vec<geojson::Feature> = collection
        .iter()
        .map(|feature| {
            let mut props = JsonObject::new();
            for field in &collection.schema {
                if let Some(value) = feature.get_property(field) {
                    props.insert(field.clone(), attribute_to_json(value));
                }
            }
            geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &feature.geometry,
                ))),
                id: feature
                    .id
                    .clone()
                    .map(geojson::feature::Id::String),
                properties: Some(props),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = match collection.crs {
        Some(crs) if crs.epsg() != 4326 => {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                serde_json::json!({
                    "type": "name",
                    "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) }
                }),
            );
            Some(members)
        }
        _ => None,
    };

    let gj = GeoJson::FeatureCollection(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    });

    let staged = StagedWriter::begin(path)?;
    let mut file = staged.create()?;
    file.write_all(gj.to_string().as_bytes())
        .map_err(|e| Error::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    staged.commit()?;
    Ok(())
}
