use crate::utils::constants::{MAX_VALID_AQI, MAX_VALID_PM25, MIN_VALID_AQI, MIN_VALID_PM25};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Where a row came from; yearly exports are authoritative over the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Yearly,
    Archive,
}

/// One hourly observation after ingestion.
///
/// Both timestamps are kept: `logged_at` is the instant as published,
/// `logged_at_local` the same instant in the configured zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyReading {
    pub city_id: i64,
    pub logged_at: DateTime<Utc>,
    pub logged_at_local: DateTime<Tz>,
    pub pm25: Option<f64>,
    pub aqi: Option<f64>,
    pub source_file: String,
}

impl HourlyReading {
    pub fn new(
        city_id: i64,
        logged_at: DateTime<Utc>,
        tz: Tz,
        pm25: Option<f64>,
        aqi: Option<f64>,
        source_file: String,
    ) -> Self {
        Self {
            city_id,
            logged_at,
            logged_at_local: logged_at.with_timezone(&tz),
            pm25,
            aqi,
            source_file,
        }
    }

    pub fn key(&self) -> (i64, DateTime<Utc>) {
        (self.city_id, self.logged_at)
    }

    /// Calendar year in local time; partitions are keyed on this
    pub fn year(&self) -> i32 {
        self.logged_at_local.year()
    }

    pub fn date_local(&self) -> NaiveDate {
        self.logged_at_local.date_naive()
    }

    pub fn pm25_valid(&self) -> bool {
        is_valid_pm25(self.pm25)
    }

    pub fn aqi_valid(&self) -> bool {
        is_valid_aqi(self.aqi)
    }

    /// Present but outside plausible bounds
    pub fn pm25_out_of_range(&self) -> bool {
        self.pm25.is_some() && !self.pm25_valid()
    }

    pub fn aqi_out_of_range(&self) -> bool {
        self.aqi.is_some() && !self.aqi_valid()
    }

    /// Valid pm25 value, if any
    pub fn valid_pm25(&self) -> Option<f64> {
        self.pm25.filter(|v| is_valid_pm25(Some(*v)))
    }

    pub fn valid_aqi(&self) -> Option<f64> {
        self.aqi.filter(|v| is_valid_aqi(Some(*v)))
    }
}

pub fn is_valid_pm25(value: Option<f64>) -> bool {
    value.is_some_and(|v| (MIN_VALID_PM25..=MAX_VALID_PM25).contains(&v))
}

pub fn is_valid_aqi(value: Option<f64>) -> bool {
    value.is_some_and(|v| (MIN_VALID_AQI..=MAX_VALID_AQI).contains(&v))
}
