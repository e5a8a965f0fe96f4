//! Vector data structures: features, attributes and collections

use geo::BoundingRect;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crs::Crs;
use crate::geometry::Extent;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A geographic feature: one geometry plus its attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: HashMap::new(),
            id: None,
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Axis-aligned envelope, `None` for empty geometries
    pub fn extent(&self) -> Option<Extent> {
        self.geometry.bounding_rect().map(|r| Extent {
            min_x: r.min().x,
            min_y: r.min().y,
            max_x: r.max().x,
            max_y: r.max().y,
        })
    }
}

/// An ordered collection of features sharing one CRS and one schema.
///
/// The schema records field names in load order so writers emit columns
/// deterministically even though per-feature properties live in maps.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<Crs>,
    pub schema: Vec<String>,
}

impl FeatureCollection {
    pub fn new(crs: Option<Crs>) -> Self {
        Self {
            features: Vec::new(),
            crs,
            schema: Vec::new(),
        }
    }

    /// Append a feature, extending the schema with any new field names
    pub fn push(&mut self, feature: Feature) {
        let mut new_fields: Vec<&String> = feature
            .properties
            .keys()
            .filter(|k| !self.schema.contains(k))
            .collect();
        new_fields.sort();
        for field in new_fields {
            self.schema.push(field.clone());
        }
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Envelope of all feature geometries
    pub fn extent(&self) -> Option<Extent> {
        let mut combined: Option<Extent> = None;
        for feature in &self.features {
            if let Some(e) = feature.extent() {
                combined = Some(match combined {
                    Some(acc) => acc.union(&e),
                    None => e,
                });
            }
        }
        combined
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
