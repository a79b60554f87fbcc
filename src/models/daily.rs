use crate::models::calendar::DateFeatures;
use crate::utils::constants::MIN_HOURS_PER_COVERED_DAY;
use chrono::NaiveDate;

/// Per-city, per-local-day summary of hourly readings.
///
/// Concentration statistics are `None` when the day has no valid pm25 hour;
/// `exceedance_share` is then defined as 0.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub city_id: i64,
    pub city_name: Option<String>,
    pub region_name: Option<String>,
    pub date_local: NaiveDate,
    pub pm25_mean: Option<f64>,
    pub pm25_median: Option<f64>,
    pub pm25_p10: Option<f64>,
    pub pm25_p90: Option<f64>,
    pub pm25_max: Option<f64>,
    /// Every reading received that day, valid or not
    pub received_hours: u32,
    /// Readings with a valid pm25 value; the only count used for coverage
    pub available_hours: u32,
    pub exceedance_hours: u32,
    pub exceedance_share: f64,
    pub aqi_mean: Option<f64>,
    pub aqi_available_hours: u32,
    pub features: DateFeatures,
    pub metadata_matched: bool,
    pub region_mapped: bool,
}

impl DailySummary {
    pub fn is_covered(&self) -> bool {
        self.available_hours >= MIN_HOURS_PER_COVERED_DAY
    }

    pub fn year(&self) -> i32 {
        self.features.year
    }
}
