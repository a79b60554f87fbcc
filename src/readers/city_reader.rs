use crate::error::{ProcessingError, Result};
use crate::models::CityMetadata;
use crate::readers::header::HeaderIndex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

const ID_COLUMNS: &[&str] = &["city_id", "id"];
const NAME_COLUMNS: &[&str] = &["city_name", "name"];
const ROMANIZED_COLUMNS: &[&str] = &["romanized_name", "city_name_en", "name_en"];

/// Reads the city reference table (one row per sensor city)
pub struct CityReader;

impl CityReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_cities(&self, path: &Path) -> Result<Vec<CityMetadata>> {
        let file_name = display_name(path);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| source_error(&file_name, &e))?;

        let headers = HeaderIndex::new(reader.headers().map_err(|e| source_error(&file_name, &e))?);
        let id_col = headers.require_any(ID_COLUMNS, &file_name)?;
        let name_col = headers.require_any(NAME_COLUMNS, &file_name)?;
        let romanized_col = headers.find_any(ROMANIZED_COLUMNS);
        let koatuu_col = headers.find("koatuu");
        let katottg_col = headers.find("katottg");
        let region_col = headers.find("region_name");

        let mut cities = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| source_error(&file_name, &e))?;
            let line = record.position().map_or(0, |p| p.line());

            let Some(city_id) = record.get(id_col).and_then(parse_city_id) else {
                warn!("{}, line {}: skipping city without a numeric id", file_name, line);
                continue;
            };

            let field = |col: Option<usize>| {
                col.and_then(|c| record.get(c))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            cities.push(CityMetadata {
                city_id,
                city_name: record.get(name_col).unwrap_or_default().to_string(),
                romanized_name: field(romanized_col),
                koatuu: field(koatuu_col),
                katottg: field(katottg_col),
                region_name: field(region_col),
            });
        }

        debug!("Loaded {} cities from {}", cities.len(), file_name);
        Ok(cities)
    }

    /// City metadata keyed by id; later duplicates replace earlier rows
    pub fn read_cities_map(&self, path: &Path) -> Result<BTreeMap<i64, CityMetadata>> {
        let cities = self.read_cities(path)?;
        let mut map = BTreeMap::new();
        for city in cities {
            if let Some(previous) = map.insert(city.city_id, city) {
                warn!("Duplicate metadata for city {}", previous.city_id);
            }
        }
        Ok(map)
    }
}

impl Default for CityReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer id, tolerating float renderings such as "12.0"
pub fn parse_city_id(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(id) = value.parse::<i64>() {
        return Some(id);
    }
    let float = value.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 {
        Some(float as i64)
    } else {
        None
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn source_error(file_name: &str, err: &csv::Error) -> ProcessingError {
    let line = err.position().map_or(0, |p| p.line());
    ProcessingError::SourceFile {
        file: file_name.to_string(),
        line,
        message: err.to_string(),
    }
}
