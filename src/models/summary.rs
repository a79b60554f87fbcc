use crate::models::calendar::Period;
use serde::{Deserialize, Serialize};

/// Daily coverage of one city in one calendar year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityYearCoverage {
    pub city_id: i64,
    pub year: i32,
    pub days_in_year: u32,
    pub days_observed: u32,
    pub covered_days: u32,
    /// covered_days / days_in_year
    pub coverage_fraction: f64,
    pub period: Period,
    pub qualifies: bool,
}

impl CityYearCoverage {
    pub fn is_prewar(&self) -> bool {
        self.period == Period::PreWar
    }

    pub fn is_wartime(&self) -> bool {
        self.period == Period::Wartime
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    Period,
    Year,
}

impl AggregationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationLevel::Period => "period",
            AggregationLevel::Year => "year",
        }
    }
}

/// Distribution of daily values for one city over a period or a year
#[derive(Debug, Clone, PartialEq)]
pub struct CityDistribution {
    pub city_id: i64,
    pub city_name: Option<String>,
    pub region_name: Option<String>,
    pub aggregation_level: AggregationLevel,
    pub period: Option<Period>,
    pub year: Option<i32>,
    pub days: u32,
    pub pm25_mean: Option<f64>,
    pub pm25_median: Option<f64>,
    pub pm25_p10: Option<f64>,
    pub pm25_p90: Option<f64>,
    pub exceedance_share: Option<f64>,
    pub available_hours_mean: Option<f64>,
    pub days_with_coverage_ge18: u32,
}

/// Region-level rollup for one period, optionally carrying boundary geometry
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPeriodSummary {
    pub region_name: Option<String>,
    pub region_code: Option<String>,
    pub period: Period,
    pub cities: u32,
    pub days: u32,
    pub pm25_mean: Option<f64>,
    pub pm25_median: Option<f64>,
    pub pm25_p90: Option<f64>,
    pub exceedance_share: Option<f64>,
    pub mapped: bool,
    /// GeoJSON geometry object serialized as text
    pub geometry: Option<String>,
}
