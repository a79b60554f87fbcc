use crate::models::{AggregationLevel, CityDistribution, DailySummary, Period};
use crate::utils::stats::{mean, median, quantile};
use std::collections::BTreeMap;

/// Statistics over a set of daily rows, shared by city and regional rollups
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DayStats {
    pub days: u32,
    pub pm25_mean: Option<f64>,
    pub pm25_median: Option<f64>,
    pub pm25_p10: Option<f64>,
    pub pm25_p90: Option<f64>,
    pub exceedance_share: Option<f64>,
    pub available_hours_mean: Option<f64>,
    pub covered_days: u32,
}

impl DayStats {
    /// Mean of daily means, median and p10/p90 of daily medians. Exceedance
    /// share is averaged over days with at least one available hour.
    pub fn from_days(days: &[&DailySummary]) -> Self {
        let means: Vec<f64> = days.iter().filter_map(|d| d.pm25_mean).collect();
        let medians: Vec<f64> = days.iter().filter_map(|d| d.pm25_median).collect();
        let shares: Vec<f64> = days
            .iter()
            .filter(|d| d.available_hours > 0)
            .map(|d| d.exceedance_share)
            .collect();
        let hours: Vec<f64> = days.iter().map(|d| d.available_hours as f64).collect();

        Self {
            days: days.len() as u32,
            pm25_mean: mean(&means),
            pm25_median: median(&medians),
            pm25_p10: quantile(&medians, 0.1),
            pm25_p90: quantile(&medians, 0.9),
            exceedance_share: mean(&shares),
            available_hours_mean: mean(&hours),
            covered_days: days.iter().filter(|d| d.is_covered()).count() as u32,
        }
    }
}

/// Per-city summaries at period level followed by year level, sorted by city
pub fn city_distributions(days: &[DailySummary]) -> Vec<CityDistribution> {
    let mut by_period: BTreeMap<(i64, Period), Vec<&DailySummary>> = BTreeMap::new();
    let mut by_year: BTreeMap<(i64, i32), Vec<&DailySummary>> = BTreeMap::new();
    for day in days {
        by_period
            .entry((day.city_id, day.features.period))
            .or_default()
            .push(day);
        by_year.entry((day.city_id, day.year())).or_default().push(day);
    }

    let mut rows: Vec<CityDistribution> = by_period
        .iter()
        .map(|((_, period), group)| {
            distribution_row(group, AggregationLevel::Period, Some(*period), None)
        })
        .chain(by_year.iter().map(|((_, year), group)| {
            distribution_row(group, AggregationLevel::Year, None, Some(*year))
        }))
        .collect();

    rows.sort_by_key(|r| (r.city_id, r.aggregation_level == AggregationLevel::Year));
    rows
}

fn distribution_row(
    group: &[&DailySummary],
    aggregation_level: AggregationLevel,
    period: Option<Period>,
    year: Option<i32>,
) -> CityDistribution {
    // groups are never empty: each was created by pushing a day
    let first = group[0];
    let stats = DayStats::from_days(group);
    CityDistribution {
        city_id: first.city_id,
        city_name: first.city_name.clone(),
        region_name: first.region_name.clone(),
        aggregation_level,
        period,
        year,
        days: stats.days,
        pm25_mean: stats.pm25_mean,
        pm25_median: stats.pm25_median,
        pm25_p10: stats.pm25_p10,
        pm25_p90: stats.pm25_p90,
        exceedance_share: stats.exceedance_share,
        available_hours_mean: stats.available_hours_mean,
        days_with_coverage_ge18: stats.covered_days,
    }
}
