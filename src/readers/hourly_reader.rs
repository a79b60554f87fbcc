use crate::error::Result;
use crate::models::{HourlyReading, SourceKind};
use crate::readers::city_reader::{display_name, parse_city_id, source_error};
use crate::readers::header::HeaderIndex;
use crate::utils::year_from_file_stem;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const REQUIRED_HOURLY_COLUMNS: &[&str] = &["city_id", "logged_at", "pm25", "aqi"];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A source CSV to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn yearly(path: PathBuf) -> Self {
        Self {
            path,
            kind: SourceKind::Yearly,
        }
    }

    pub fn archive(path: PathBuf) -> Self {
        Self {
            path,
            kind: SourceKind::Archive,
        }
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

/// Every row of one source file that carried a usable key
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub file_name: String,
    pub kind: SourceKind,
    pub readings: Vec<HourlyReading>,
    pub rows_read: usize,
    pub rows_missing_keys: usize,
    /// Year named in the file stem, if any
    pub declared_year: Option<i32>,
}

impl SourceBatch {
    /// Local years this file is authoritative for.
    ///
    /// The year in the file name when present, otherwise every year seen in
    /// the rows.
    pub fn covered_years(&self) -> BTreeSet<i32> {
        match self.declared_year {
            Some(year) => BTreeSet::from([year]),
            None => self.readings.iter().map(|r| r.year()).collect(),
        }
    }
}

/// Parses hourly PM2.5/AQI exports.
///
/// Rows without a city id or timestamp are counted and skipped; unparsable
/// measurements become missing values. Structural problems (missing
/// columns, malformed CSV) fail the whole file.
pub struct HourlyReader {
    tz: Tz,
}

impl HourlyReader {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn read_source(&self, source: &SourceFile) -> Result<SourceBatch> {
        let file_name = source.file_name();
        let mut batch = SourceBatch {
            file_name: file_name.clone(),
            kind: source.kind,
            readings: Vec::new(),
            rows_read: 0,
            rows_missing_keys: 0,
            declared_year: match source.kind {
                SourceKind::Yearly => year_from_file_stem(&source.path),
                SourceKind::Archive => None,
            },
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&source.path)
            .map_err(|e| source_error(&file_name, &e))?;
        let headers = HeaderIndex::new(reader.headers().map_err(|e| source_error(&file_name, &e))?);
        let cols = headers.require_all(REQUIRED_HOURLY_COLUMNS, &file_name)?;
        let (id_col, ts_col, pm25_col, aqi_col) = (cols[0], cols[1], cols[2], cols[3]);

        for result in reader.records() {
            let record = result.map_err(|e| source_error(&file_name, &e))?;
            batch.rows_read += 1;

            let city_id = record.get(id_col).and_then(parse_city_id);
            let logged_at = record.get(ts_col).and_then(parse_timestamp);
            let (Some(city_id), Some(logged_at)) = (city_id, logged_at) else {
                batch.rows_missing_keys += 1;
                continue;
            };

            batch.readings.push(HourlyReading::new(
                city_id,
                logged_at,
                self.tz,
                record.get(pm25_col).and_then(parse_measurement),
                record.get(aqi_col).and_then(parse_measurement),
                file_name.clone(),
            ));
        }

        debug!(
            "{}: {} rows read, {} without key",
            file_name, batch.rows_read, batch.rows_missing_keys
        );
        Ok(batch)
    }

    pub fn read_path(&self, path: &Path, kind: SourceKind) -> Result<SourceBatch> {
        self.read_source(&SourceFile {
            path: path.to_path_buf(),
            kind,
        })
    }
}

/// Parse a source timestamp as UTC.
///
/// Offsets are honoured when present; naive timestamps are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = value
        .strip_suffix(" UTC")
        .or_else(|| value.strip_suffix('Z'))
        .unwrap_or(value);
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc())
}

/// Numeric value or missing; non-finite numbers count as missing
pub fn parse_measurement(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2021-03-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-01 10:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-01 12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-01T10:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-01 10:00:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_parse_measurement() {
        assert_eq!(parse_measurement("12.5"), Some(12.5));
        assert_eq!(parse_measurement("-5"), Some(-5.0));
        assert_eq!(parse_measurement("n/a"), None);
        assert_eq!(parse_measurement("NaN"), None);
        assert_eq!(parse_measurement(""), None);
    }

    #[test]
    fn test_read_hourly_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(
            &dir,
            "pm25_2021.csv",
            &[
                "city_id,aqi,pm25,logged_at",
                "1,50,12.0,2021-03-01 10:00:00",
                "1,,bad,2021-03-01 11:00:00",
                ",40,10.0,2021-03-01 12:00:00",
                "2,40,10.0,not-a-date",
            ],
        );

        let batch =
            HourlyReader::new(chrono_tz::Europe::Kyiv).read_path(&path, SourceKind::Yearly)?;

        assert_eq!(batch.rows_read, 4);
        assert_eq!(batch.rows_missing_keys, 2);
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(batch.declared_year, Some(2021));
        assert_eq!(batch.readings[0].pm25, Some(12.0));
        assert_eq!(batch.readings[1].pm25, None);
        assert_eq!(batch.readings[1].aqi, None);
        assert_eq!(batch.readings[0].source_file, "pm25_2021.csv");
        Ok(())
    }

    #[test]
    fn test_missing_columns_fail_the_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(
            &dir,
            "bad_2020.csv",
            &["city_id,logged_at", "1,2020-01-01 00:00:00"],
        );

        let result = HourlyReader::new(chrono_tz::UTC).read_path(&path, SourceKind::Yearly);
        match result {
            Err(ProcessingError::MissingColumns { file, columns }) => {
                assert_eq!(file, "bad_2020.csv");
                assert_eq!(columns, "pm25, aqi");
            }
            other => panic!("expected schema error, got {:?}", other.map(|b| b.rows_read)),
        }
        Ok(())
    }

    #[test]
    fn test_malformed_row_reports_line() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(
            &dir,
            "ragged_2020.csv",
            &[
                "city_id,aqi,pm25,logged_at",
                "1,50,12.0,2020-03-01 10:00:00",
                "1,50,12.0",
            ],
        );

        let result = HourlyReader::new(chrono_tz::UTC).read_path(&path, SourceKind::Yearly);
        match result {
            Err(ProcessingError::SourceFile { file, line, .. }) => {
                assert_eq!(file, "ragged_2020.csv");
                assert_eq!(line, 3);
            }
            other => panic!("expected source error, got {:?}", other.map(|b| b.rows_read)),
        }
        Ok(())
    }

    #[test]
    fn test_unreadable_file_is_named() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("gone_2022.csv");

        let result = HourlyReader::new(chrono_tz::UTC).read_path(&path, SourceKind::Yearly);
        match result {
            Err(ProcessingError::SourceFile { file, line, .. }) => {
                assert_eq!(file, "gone_2022.csv");
                assert_eq!(line, 0);
            }
            other => panic!("expected source error, got {:?}", other.map(|b| b.rows_read)),
        }
        Ok(())
    }

    #[test]
    fn test_archive_has_no_declared_year() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(
            &dir,
            "combined.csv",
            &["city_id,aqi,pm25,logged_at", "1,50,12.0,2024-03-01 10:00:00"],
        );
        let batch = HourlyReader::new(chrono_tz::UTC).read_path(&path, SourceKind::Archive)?;
        assert_eq!(batch.declared_year, None);
        assert_eq!(batch.covered_years(), BTreeSet::from([2024]));
        Ok(())
    }
}
