use crate::models::{CityMetadata, DailySummary, DateFeatures, HourlyReading};
use crate::readers::BoundaryIndex;
use crate::utils::stats::{mean, Distribution};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Rolls hourly readings up to one row per (city, local date)
pub struct DailyAggregator {
    pm25_guideline: f64,
    war_start: NaiveDate,
}

impl DailyAggregator {
    pub fn new(pm25_guideline: f64, war_start: NaiveDate) -> Self {
        Self {
            pm25_guideline,
            war_start,
        }
    }

    /// Summaries sorted by (city_id, date_local).
    ///
    /// Statistics cover valid pm25 hours only; a day whose hours are all
    /// invalid or missing still gets a row with `available_hours == 0`.
    pub fn aggregate(
        &self,
        readings: &[HourlyReading],
        cities: &BTreeMap<i64, CityMetadata>,
        boundaries: &BoundaryIndex,
    ) -> Vec<DailySummary> {
        let mut groups: BTreeMap<(i64, NaiveDate), Vec<&HourlyReading>> = BTreeMap::new();
        for reading in readings {
            groups
                .entry((reading.city_id, reading.date_local()))
                .or_default()
                .push(reading);
        }

        groups
            .into_par_iter()
            .map(|((city_id, date), hours)| {
                let city = cities.get(&city_id);
                let region_mapped = city.is_some_and(|c| {
                    boundaries
                        .lookup(c.region_code().as_deref(), c.region_key().as_deref())
                        .is_some()
                });
                self.summarize_day(city_id, date, &hours, city, region_mapped)
            })
            .collect()
    }

    fn summarize_day(
        &self,
        city_id: i64,
        date_local: NaiveDate,
        hours: &[&HourlyReading],
        city: Option<&CityMetadata>,
        region_mapped: bool,
    ) -> DailySummary {
        let pm25: Vec<f64> = hours.iter().filter_map(|h| h.valid_pm25()).collect();
        let aqi: Vec<f64> = hours.iter().filter_map(|h| h.valid_aqi()).collect();
        let dist = Distribution::from_values(&pm25);

        let available_hours = pm25.len() as u32;
        let exceedance_hours = pm25.iter().filter(|v| **v > self.pm25_guideline).count() as u32;
        let exceedance_share = if available_hours == 0 {
            0.0
        } else {
            exceedance_hours as f64 / available_hours as f64
        };

        DailySummary {
            city_id,
            city_name: city.map(|c| c.city_name.clone()),
            region_name: city.and_then(|c| c.region_name.clone()),
            date_local,
            pm25_mean: dist.map(|d| d.mean),
            pm25_median: dist.map(|d| d.median),
            pm25_p10: dist.map(|d| d.p10),
            pm25_p90: dist.map(|d| d.p90),
            pm25_max: dist.map(|d| d.max),
            received_hours: hours.len() as u32,
            available_hours,
            exceedance_hours,
            exceedance_share,
            aqi_mean: mean(&aqi),
            aqi_available_hours: aqi.len() as u32,
            features: DateFeatures::derive(date_local, self.war_start),
            metadata_matched: city.is_some(),
            region_mapped,
        }
    }
}
