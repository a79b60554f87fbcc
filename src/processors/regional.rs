use crate::models::{CityMetadata, DailySummary, Period, RegionPeriodSummary};
use crate::processors::distributions::DayStats;
use crate::readers::BoundaryIndex;
use std::collections::{BTreeMap, BTreeSet};

/// Roll daily rows up to (region, period) and attach boundary geometry.
///
/// Regions are matched to boundaries by oblast code first, then by trimmed
/// name. Rows for cities without a region are kept under a `None` region,
/// unmapped.
pub fn region_period_summaries(
    days: &[DailySummary],
    cities: &BTreeMap<i64, CityMetadata>,
    boundaries: &BoundaryIndex,
) -> Vec<RegionPeriodSummary> {
    let mut groups: BTreeMap<(Option<String>, Period), Vec<&DailySummary>> = BTreeMap::new();
    let mut codes: BTreeMap<String, String> = BTreeMap::new();

    for day in days {
        let city = cities.get(&day.city_id);
        let key = city
            .and_then(CityMetadata::region_key)
            .or_else(|| day.region_name.as_deref().map(str::trim).map(str::to_string));
        if let (Some(name), Some(code)) = (&key, city.and_then(CityMetadata::region_code)) {
            codes.entry(name.clone()).or_insert(code);
        }
        groups.entry((key, day.features.period)).or_default().push(day);
    }

    groups
        .into_iter()
        .map(|((region_name, period), group)| {
            let region_code = region_name.as_ref().and_then(|n| codes.get(n).cloned());
            let boundary = boundaries.lookup(region_code.as_deref(), region_name.as_deref());
            let stats = DayStats::from_days(&group);
            let cities: BTreeSet<i64> = group.iter().map(|d| d.city_id).collect();

            RegionPeriodSummary {
                region_name,
                region_code,
                period,
                cities: cities.len() as u32,
                days: stats.days,
                pm25_mean: stats.pm25_mean,
                pm25_median: stats.pm25_median,
                pm25_p90: stats.pm25_p90,
                exceedance_share: stats.exceedance_share,
                mapped: boundary.is_some(),
                geometry: boundary.and_then(|b| b.geometry.clone()),
            }
        })
        .collect()
}

/// Region names that found no boundary
pub fn unmapped_regions(rows: &[RegionPeriodSummary]) -> Vec<String> {
    let names: BTreeSet<String> = rows
        .iter()
        .filter(|r| !r.mapped)
        .map(|r| r.region_name.clone().unwrap_or_else(|| "<none>".to_string()))
        .collect();
    names.into_iter().collect()
}
