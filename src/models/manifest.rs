use crate::error::Result;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSource {
    pub file: String,
    pub error: String,
}

/// Parameters that determine ingestion output; a change forces a rerun
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestParameters {
    pub timezone: String,
    pub hourly_files: Vec<String>,
    pub archive_file: Option<String>,
    pub year: Option<i32>,
}

/// Row accounting for one ingestion run.
///
/// `rows_read` always equals written rows plus every dropped category, so a
/// reader can reconcile the partitions against the sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestManifest {
    pub parameters: IngestParameters,
    pub records_per_year: BTreeMap<i32, usize>,
    pub rows_read: usize,
    pub rows_missing_keys: usize,
    pub duplicates_dropped: usize,
    pub archive_rows_superseded: usize,
    pub rows_outside_year_filter: usize,
    pub unknown_city_rows: usize,
    pub pm25_out_of_range: usize,
    pub aqi_out_of_range: usize,
    pub failed_files: Vec<FailedSource>,
    /// Partitions left from an earlier run because their yearly file failed
    #[serde(default)]
    pub kept_partitions: Vec<i32>,
}

impl IngestManifest {
    pub fn total_records(&self) -> usize {
        self.records_per_year.values().sum()
    }

    pub fn rows_dropped(&self) -> usize {
        self.rows_missing_keys
            + self.duplicates_dropped
            + self.archive_rows_superseded
            + self.rows_outside_year_filter
    }

    pub fn reconciles(&self) -> bool {
        self.parameters.year.is_some()
            || self.rows_read == self.total_records() + self.rows_dropped()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationParameters {
    pub timezone: String,
    pub wartime_start: NaiveDate,
    pub pm25_guideline: f64,
    pub qualifying_years_only: bool,
    pub admin_boundaries: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationManifest {
    pub parameters: AggregationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timestamp: Option<String>,
    pub hourly_rows_read: usize,
    pub hourly_rows_retained: usize,
    pub hourly_rows_excluded: usize,
    pub daily_rows_total: usize,
    pub daily_rows_retained: usize,
    pub daily_rows_excluded: usize,
    pub cities_total: usize,
    pub eligible_cities: Vec<i64>,
    pub excluded_cities: Vec<i64>,
    pub cities_without_metadata: Vec<i64>,
    pub unmapped_regions: Vec<String>,
    pub city_distribution_rows: usize,
    pub region_period_rows: usize,
}

impl AggregationManifest {
    pub fn reconciles(&self) -> bool {
        self.hourly_rows_read == self.hourly_rows_retained + self.hourly_rows_excluded
            && self.daily_rows_total == self.daily_rows_retained + self.daily_rows_excluded
            && self.cities_total == self.eligible_cities.len() + self.excluded_cities.len()
    }
}

pub fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

/// Load a manifest if present; unreadable manifests are treated as absent
pub fn read_manifest_opt<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match read_manifest(path) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest_manifest() -> IngestManifest {
        IngestManifest {
            parameters: IngestParameters {
                timezone: "Europe/Kyiv".to_string(),
                hourly_files: vec!["a_2021.csv".to_string()],
                archive_file: None,
                year: None,
            },
            records_per_year: BTreeMap::from([(2021, 8), (2022, 2)]),
            rows_read: 14,
            rows_missing_keys: 1,
            duplicates_dropped: 2,
            archive_rows_superseded: 1,
            rows_outside_year_filter: 0,
            unknown_city_rows: 0,
            pm25_out_of_range: 0,
            aqi_out_of_range: 0,
            failed_files: Vec::new(),
            kept_partitions: Vec::new(),
        }
    }

    #[test]
    fn test_ingest_manifest_reconciles() {
        let manifest = ingest_manifest();
        assert_eq!(manifest.total_records(), 10);
        assert_eq!(manifest.rows_dropped(), 4);
        assert!(manifest.reconciles());

        let mut broken = manifest;
        broken.rows_read = 15;
        assert!(!broken.reconciles());
    }

    #[test]
    fn test_manifest_json_round_trip() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("ingest_manifest.json");
        let manifest = ingest_manifest();
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;

        let loaded: IngestManifest = read_manifest(&path)?;
        assert_eq!(loaded, manifest);
        assert!(read_manifest_opt::<IngestManifest>(&dir.path().join("absent.json")).is_none());
        Ok(())
    }
}
