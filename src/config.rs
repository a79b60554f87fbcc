use crate::error::{ProcessingError, Result};
use crate::utils::constants::*;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Every tunable the pipeline stages read.
///
/// Values are layered: built-in defaults, then an optional TOML file, then
/// `AQ_*` environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(length(min = 1))]
    pub timezone: String,

    pub wartime_start: NaiveDate,

    #[validate(range(min = 0.0, max = 1000.0))]
    pub pm25_guideline: f64,

    #[validate(length(min = 1))]
    pub hourly_pattern: String,

    #[serde(default)]
    pub archive_csv: Option<PathBuf>,

    pub cities_metadata: PathBuf,

    #[serde(default)]
    pub admin_boundaries: Option<PathBuf>,

    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub qa_dir: PathBuf,

    pub compression: String,

    #[validate(range(min = 1))]
    pub row_group_size: usize,

    #[serde(default)]
    pub qualifying_years_only: bool,

    /// Recorded verbatim in manifests; never taken from the clock
    #[serde(default)]
    pub run_timestamp: Option<String>,
}

impl PipelineConfig {
    /// Load defaults, the optional config file and the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("timezone", DEFAULT_TIMEZONE)?
            .set_default("wartime_start", DEFAULT_WARTIME_START)?
            .set_default("pm25_guideline", DEFAULT_PM25_GUIDELINE)?
            .set_default("hourly_pattern", DEFAULT_HOURLY_PATTERN)?
            .set_default("cities_metadata", DEFAULT_CITIES_METADATA)?
            .set_default("admin_boundaries", DEFAULT_ADMIN_BOUNDARIES)?
            .set_default("raw_dir", DEFAULT_RAW_DIR)?
            .set_default("processed_dir", DEFAULT_PROCESSED_DIR)?
            .set_default("qa_dir", DEFAULT_QA_DIR)?
            .set_default("compression", COMPRESSION_SNAPPY)?
            .set_default("row_group_size", DEFAULT_ROW_GROUP_SIZE as i64)?
            .set_default("qualifying_years_only", false)?;

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ProcessingError::MissingInput(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check every field that can be checked before a stage touches disk
    pub fn validate_settings(&self) -> Result<()> {
        self.validate()?;
        self.tz()?;
        crate::writers::ParquetWriter::new().with_compression(&self.compression)?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ProcessingError::UnknownTimezone(name.to_string()))
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        ProcessingError::Config(format!("invalid date '{}' (expected YYYY-MM-DD): {}", value, e))
    })
}

/// Replace a setting when a flag was given
pub fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Fail unless a required input file exists
pub fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProcessingError::MissingInput(path.to_path_buf()))
    }
}

pub fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ProcessingError::MissingInput(path.to_path_buf()))
    }
}
