use crate::models::calendar::days_in_year;
use crate::models::{CityYearCoverage, DailySummary, Period};
use crate::utils::constants::{
    MIN_COVERAGE_RATIO, MIN_PREWAR_YEARS, MIN_TOTAL_YEARS, MIN_WARTIME_YEARS,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Thresholds a city must meet to enter the analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibilityCriteria {
    pub min_coverage_ratio: f64,
    pub min_total_years: usize,
    pub min_prewar_years: usize,
    pub min_wartime_years: usize,
}

impl Default for EligibilityCriteria {
    fn default() -> Self {
        Self {
            min_coverage_ratio: MIN_COVERAGE_RATIO,
            min_total_years: MIN_TOTAL_YEARS,
            min_prewar_years: MIN_PREWAR_YEARS,
            min_wartime_years: MIN_WARTIME_YEARS,
        }
    }
}

/// Coverage of every observed city-year plus the cities that pass
#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    pub coverage: Vec<CityYearCoverage>,
    pub eligible: BTreeSet<i64>,
}

impl Eligibility {
    pub fn evaluate(
        days: &[DailySummary],
        war_start: NaiveDate,
        criteria: &EligibilityCriteria,
    ) -> Self {
        let coverage = city_year_coverage(days, war_start, criteria);
        let eligible = eligible_cities(&coverage, criteria);
        Self { coverage, eligible }
    }

    pub fn is_eligible(&self, city_id: i64) -> bool {
        self.eligible.contains(&city_id)
    }

    /// Covered (city, year) pairs of eligible cities
    pub fn qualifying_years(&self) -> BTreeSet<(i64, i32)> {
        self.coverage
            .iter()
            .filter(|c| c.qualifies && self.is_eligible(c.city_id))
            .map(|c| (c.city_id, c.year))
            .collect()
    }

    pub fn excluded(&self) -> Vec<i64> {
        let cities: BTreeSet<i64> = self.coverage.iter().map(|c| c.city_id).collect();
        cities.difference(&self.eligible).copied().collect()
    }
}

/// Per (city, year): covered days over calendar days, sorted by key
pub fn city_year_coverage(
    days: &[DailySummary],
    war_start: NaiveDate,
    criteria: &EligibilityCriteria,
) -> Vec<CityYearCoverage> {
    let mut counts: BTreeMap<(i64, i32), (u32, u32)> = BTreeMap::new();
    for day in days {
        let entry = counts.entry((day.city_id, day.year())).or_default();
        entry.0 += 1;
        if day.is_covered() {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|((city_id, year), (days_observed, covered_days))| {
            let calendar_days = days_in_year(year);
            let coverage_fraction = covered_days as f64 / calendar_days as f64;
            CityYearCoverage {
                city_id,
                year,
                days_in_year: calendar_days,
                days_observed,
                covered_days,
                coverage_fraction,
                period: Period::for_year(year, war_start),
                qualifies: coverage_fraction >= criteria.min_coverage_ratio,
            }
        })
        .collect()
}

pub fn eligible_cities(
    coverage: &[CityYearCoverage],
    criteria: &EligibilityCriteria,
) -> BTreeSet<i64> {
    let mut tallies: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
    for c in coverage.iter().filter(|c| c.qualifies) {
        let entry = tallies.entry(c.city_id).or_default();
        match c.period {
            Period::PreWar => entry.0 += 1,
            Period::Wartime => entry.1 += 1,
        }
    }

    tallies
        .into_iter()
        .filter(|(_, (prewar, wartime))| {
            prewar + wartime >= criteria.min_total_years
                && *prewar >= criteria.min_prewar_years
                && *wartime >= criteria.min_wartime_years
        })
        .map(|(city_id, _)| city_id)
        .collect()
}
