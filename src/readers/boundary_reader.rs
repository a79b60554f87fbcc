use crate::error::{ProcessingError, Result};
use crate::models::city::oblast_code;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

const NAME_PROPERTIES: &[&str] = &["name:uk", "name"];
const CODE_PROPERTIES: &[&str] = &["koatuu", "KOATUU"];

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Value>,
}

/// One administrative region polygon
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub name: Option<String>,
    pub code: Option<String>,
    /// GeoJSON geometry serialized back to text
    pub geometry: Option<String>,
}

/// Boundaries indexed by oblast code and by trimmed name
#[derive(Debug, Default)]
pub struct BoundaryIndex {
    boundaries: Vec<Boundary>,
    by_code: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl BoundaryIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    fn insert(&mut self, boundary: Boundary) {
        let idx = self.boundaries.len();
        if let Some(code) = &boundary.code {
            self.by_code.entry(code.clone()).or_insert(idx);
        }
        if let Some(name) = &boundary.name {
            self.by_name.entry(name.clone()).or_insert(idx);
        }
        self.boundaries.push(boundary);
    }

    /// Match by region code first, then by region name
    pub fn lookup(&self, code: Option<&str>, name: Option<&str>) -> Option<&Boundary> {
        code.and_then(|c| self.by_code.get(c))
            .or_else(|| name.and_then(|n| self.by_name.get(n.trim())))
            .map(|&idx| &self.boundaries[idx])
    }
}

pub struct BoundaryReader;

impl BoundaryReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_boundaries(&self, path: &Path) -> Result<BoundaryIndex> {
        let file = File::open(path)?;
        let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))?;
        let index = self.index_features(collection.features)?;
        debug!("Loaded {} boundaries from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn parse_boundaries(&self, json: &str) -> Result<BoundaryIndex> {
        let collection: FeatureCollection = serde_json::from_str(json)?;
        self.index_features(collection.features)
    }

    fn index_features(&self, features: Vec<Feature>) -> Result<BoundaryIndex> {
        let mut index = BoundaryIndex::empty();
        let mut keyed = false;

        for feature in features {
            let properties = feature.properties.unwrap_or_default();
            let name = first_string(&properties, NAME_PROPERTIES)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let code = first_string(&properties, CODE_PROPERTIES).and_then(|c| oblast_code(&c));
            keyed |= name.is_some() || code.is_some();

            index.insert(Boundary {
                name,
                code,
                geometry: feature.geometry.map(|g| g.to_string()),
            });
        }

        if !index.is_empty() && !keyed {
            return Err(ProcessingError::InvalidFormat(
                "administrative boundaries carry neither name nor koatuu attributes".to_string(),
            ));
        }
        Ok(index)
    }
}

impl Default for BoundaryReader {
    fn default() -> Self {
        Self::new()
    }
}

fn first_string(properties: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match properties.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"name:uk": " Львівська область ", "koatuu": "4600000000"},
             "geometry": {"type": "Point", "coordinates": [24.0, 49.8]}},
            {"type": "Feature",
             "properties": {"name": "Київ"},
             "geometry": {"type": "Point", "coordinates": [30.5, 50.4]}}
        ]
    }"#;

    #[test]
    fn test_lookup_by_code_then_name() -> Result<()> {
        let index = BoundaryReader::new().parse_boundaries(SAMPLE)?;
        assert_eq!(index.len(), 2);

        let by_code = index.lookup(Some("4600000000"), Some("whatever")).unwrap();
        assert_eq!(by_code.name.as_deref(), Some("Львівська область"));

        let by_name = index.lookup(Some("8000000000"), Some(" Київ ")).unwrap();
        assert!(by_name.geometry.as_deref().unwrap().contains("Point"));

        assert!(index.lookup(None, Some("Одеська")).is_none());
        Ok(())
    }

    #[test]
    fn test_unkeyed_features_rejected() {
        let json = r#"{"features": [{"properties": {"id": 3}, "geometry": null}]}"#;
        let result = BoundaryReader::new().parse_boundaries(json);
        assert!(matches!(result, Err(ProcessingError::InvalidFormat(_))));
    }
}
