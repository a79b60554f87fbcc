use crate::config::require_file;
use crate::error::Result;
use crate::models::calendar::days_in_year;
use crate::models::manifest::read_manifest_opt;
use crate::models::{AggregationManifest, DailySummary, IngestManifest, Period};
use crate::readers::ParquetReader;
use crate::utils::constants::*;
use crate::utils::stats::{mean, median, sample_variance};
use crate::writers::{write_csv, write_json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Coverage and exceedance diagnostics of one city-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityYearQa {
    pub city_id: i64,
    pub city_name: Option<String>,
    pub region_name: Option<String>,
    pub year: i32,
    pub days_observed: u32,
    pub mean_available_hours: Option<f64>,
    pub median_available_hours: Option<f64>,
    pub covered_days: u32,
    pub coverage_fraction: f64,
    pub observed_day_share: f64,
    pub share_days_ge18: f64,
    pub mean_exceedance_share: Option<f64>,
    pub exceedance_share_variance: Option<f64>,
    pub share_days_above_guideline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodQa {
    pub period: Period,
    pub cities: u32,
    pub days: u32,
    pub pm25_median: Option<f64>,
    pub exceedance_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReconciliation {
    pub rows_read: usize,
    pub records_written: usize,
    pub rows_dropped: usize,
    pub failed_files: usize,
    pub reconciles: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReconciliation {
    pub hourly_rows_read: usize,
    pub hourly_rows_retained: usize,
    pub daily_rows_retained: usize,
    pub eligible_cities: usize,
    pub reconciles: bool,
    /// Daily table row count agrees with the manifest
    pub daily_table_matches: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub ingest: Option<IngestReconciliation>,
    pub aggregation: Option<AggregationReconciliation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSummary {
    pub cities: usize,
    pub years: Vec<i32>,
    pub daily_rows: usize,
    pub pm25_guideline: f64,
    pub city_years: usize,
    pub periods: Vec<PeriodQa>,
    pub reconciliation: Reconciliation,
}

/// Everything the QA stage computes
#[derive(Debug, Clone, PartialEq)]
pub struct QaReport {
    pub coverage: Vec<CityYearQa>,
    pub periods: Vec<PeriodQa>,
    pub summary: QaSummary,
}

fn share(count: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| count as f64 / total as f64)
}

/// QA stage: diagnostics over the processed daily table
pub struct QualityChecker {
    pm25_guideline: f64,
}

impl QualityChecker {
    pub fn new(pm25_guideline: f64) -> Self {
        Self { pm25_guideline }
    }

    pub fn city_year_coverage(&self, days: &[DailySummary]) -> Vec<CityYearQa> {
        let mut groups: BTreeMap<(i64, i32), Vec<&DailySummary>> = BTreeMap::new();
        for day in days {
            groups.entry((day.city_id, day.year())).or_default().push(day);
        }

        groups
            .into_iter()
            .map(|((city_id, year), group)| {
                let calendar_days = days_in_year(year) as f64;
                let hours: Vec<f64> = group.iter().map(|d| d.available_hours as f64).collect();
                let shares: Vec<f64> = group
                    .iter()
                    .filter(|d| d.available_hours > 0)
                    .map(|d| d.exceedance_share)
                    .collect();
                let means: Vec<f64> = group.iter().filter_map(|d| d.pm25_mean).collect();
                let above = means.iter().filter(|m| **m > self.pm25_guideline).count();
                let covered = group.iter().filter(|d| d.is_covered()).count();

                CityYearQa {
                    city_id,
                    city_name: group[0].city_name.clone(),
                    region_name: group[0].region_name.clone(),
                    year,
                    days_observed: group.len() as u32,
                    mean_available_hours: mean(&hours),
                    median_available_hours: median(&hours),
                    covered_days: covered as u32,
                    coverage_fraction: covered as f64 / calendar_days,
                    observed_day_share: group.len() as f64 / calendar_days,
                    share_days_ge18: share(covered, group.len()).unwrap_or(0.0),
                    mean_exceedance_share: mean(&shares),
                    exceedance_share_variance: sample_variance(&shares),
                    share_days_above_guideline: share(above, means.len()),
                }
            })
            .collect()
    }

    pub fn period_summary(&self, days: &[DailySummary]) -> Vec<PeriodQa> {
        let mut groups: BTreeMap<Period, Vec<&DailySummary>> = BTreeMap::new();
        for day in days {
            groups.entry(day.features.period).or_default().push(day);
        }

        groups
            .into_iter()
            .map(|(period, group)| {
                let medians: Vec<f64> = group.iter().filter_map(|d| d.pm25_median).collect();
                let shares: Vec<f64> = group
                    .iter()
                    .filter(|d| d.available_hours > 0)
                    .map(|d| d.exceedance_share)
                    .collect();
                let cities: BTreeSet<i64> = group.iter().map(|d| d.city_id).collect();
                PeriodQa {
                    period,
                    cities: cities.len() as u32,
                    days: group.len() as u32,
                    pm25_median: median(&medians),
                    exceedance_share: mean(&shares),
                }
            })
            .collect()
    }

    pub fn check(
        &self,
        days: &[DailySummary],
        ingest: Option<&IngestManifest>,
        aggregation: Option<&AggregationManifest>,
    ) -> QaReport {
        let coverage = self.city_year_coverage(days);
        let periods = self.period_summary(days);

        let reconciliation = Reconciliation {
            ingest: ingest.map(|m| IngestReconciliation {
                rows_read: m.rows_read,
                records_written: m.total_records(),
                rows_dropped: m.rows_dropped(),
                failed_files: m.failed_files.len(),
                reconciles: m.reconciles(),
            }),
            aggregation: aggregation.map(|m| AggregationReconciliation {
                hourly_rows_read: m.hourly_rows_read,
                hourly_rows_retained: m.hourly_rows_retained,
                daily_rows_retained: m.daily_rows_retained,
                eligible_cities: m.eligible_cities.len(),
                reconciles: m.reconciles(),
                daily_table_matches: m.daily_rows_retained == days.len(),
            }),
        };

        let summary = QaSummary {
            cities: days.iter().map(|d| d.city_id).collect::<BTreeSet<_>>().len(),
            years: days
                .iter()
                .map(|d| d.year())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            daily_rows: days.len(),
            pm25_guideline: self.pm25_guideline,
            city_years: coverage.len(),
            periods: periods.clone(),
            reconciliation,
        };

        QaReport {
            coverage,
            periods,
            summary,
        }
    }

    /// Read the processed tables, compute diagnostics and write the reports.
    ///
    /// Only `qa_dir` is written.
    pub fn run(&self, processed_dir: &Path, raw_dir: &Path, qa_dir: &Path) -> Result<QaReport> {
        let daily_path = processed_dir.join(DAILY_TABLE_FILE);
        require_file(&daily_path)?;
        let days = ParquetReader::new().read_daily(&daily_path)?;
        if days.is_empty() {
            warn!("{} is empty; QA reports will be empty", daily_path.display());
        }

        let ingest = read_manifest_opt::<IngestManifest>(&raw_dir.join(INGEST_MANIFEST_FILE));
        let aggregation = read_manifest_opt::<AggregationManifest>(
            &processed_dir.join(AGGREGATION_MANIFEST_FILE),
        );
        let report = self.check(&days, ingest.as_ref(), aggregation.as_ref());

        std::fs::create_dir_all(qa_dir)?;
        write_csv(&report.coverage, &qa_dir.join(QA_COVERAGE_FILE))?;
        write_csv(&report.periods, &qa_dir.join(QA_PERIOD_FILE))?;
        write_json(&report.summary, &qa_dir.join(QA_SUMMARY_FILE))?;

        info!(
            "QA finished: {} city-years across {} cities",
            report.summary.city_years, report.summary.cities
        );
        Ok(report)
    }

    pub fn output_paths(qa_dir: &Path) -> Vec<PathBuf> {
        [QA_COVERAGE_FILE, QA_PERIOD_FILE, QA_SUMMARY_FILE]
            .iter()
            .map(|name| qa_dir.join(name))
            .collect()
    }

    /// Human-readable digest of a QA run
    pub fn generate_summary(&self, report: &QaReport) -> String {
        let summary = &report.summary;
        let mut text = String::new();

        text.push_str("=== Data Quality Report ===\n");
        text.push_str(&format!("Cities: {}\n", summary.cities));
        text.push_str(&format!("Daily rows: {}\n", summary.daily_rows));
        text.push_str(&format!(
            "Years: {}\n",
            summary
                .years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        text.push_str(&format!("PM2.5 guideline: {} µg/m³\n", summary.pm25_guideline));

        for period in &report.periods {
            text.push_str(&format!(
                "  {}: {} days, {} cities, median {}, exceedance share {}\n",
                period.period,
                period.days,
                period.cities,
                fmt_opt(period.pm25_median),
                fmt_opt(period.exceedance_share)
            ));
        }

        let low: Vec<&CityYearQa> = report
            .coverage
            .iter()
            .filter(|c| c.coverage_fraction < MIN_COVERAGE_RATIO)
            .collect();
        text.push_str(&format!("\nCity-years below coverage threshold: {}\n", low.len()));
        for (i, c) in low.iter().take(10).enumerate() {
            text.push_str(&format!(
                "  {}. City {} in {}: {:.1}% covered\n",
                i + 1,
                c.city_id,
                c.year,
                100.0 * c.coverage_fraction
            ));
        }

        if let Some(ingest) = &summary.reconciliation.ingest {
            text.push_str(&format!(
                "\nIngest: {} read, {} written, {} dropped ({})\n",
                ingest.rows_read,
                ingest.records_written,
                ingest.rows_dropped,
                if ingest.reconciles { "reconciled" } else { "MISMATCH" }
            ));
        }
        if let Some(agg) = &summary.reconciliation.aggregation {
            text.push_str(&format!(
                "Aggregation: {} of {} hourly rows retained, {} eligible cities ({})\n",
                agg.hourly_rows_retained,
                agg.hourly_rows_read,
                agg.eligible_cities,
                if agg.reconciles && agg.daily_table_matches {
                    "reconciled"
                } else {
                    "MISMATCH"
                }
            ));
        }

        text
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::distributions::tests::day;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_city_year_diagnostics() {
        let days = vec![
            day(1, date(2021, 1, 1), 10.0, 24),
            day(1, date(2021, 1, 2), 30.0, 20),
            day(1, date(2021, 1, 3), 0.0, 0),
            day(1, date(2021, 1, 4), 20.0, 6),
        ];
        let coverage = QualityChecker::new(15.0).city_year_coverage(&days);
        assert_eq!(coverage.len(), 1);
        let c = &coverage[0];
        assert_eq!(c.days_observed, 4);
        assert_eq!(c.covered_days, 2);
        assert_eq!(c.coverage_fraction, 2.0 / 365.0);
        assert_eq!(c.observed_day_share, 4.0 / 365.0);
        assert_eq!(c.share_days_ge18, 0.5);
        assert_eq!(c.mean_available_hours, Some(12.5));
        assert_eq!(c.median_available_hours, Some(13.0));
        // shares of the three days with data: 0, 1, 1
        assert_eq!(c.mean_exceedance_share, Some(2.0 / 3.0));
        assert!((c.exceedance_share_variance.unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.share_days_above_guideline, Some(2.0 / 3.0));
    }

    #[test]
    fn test_period_summary_and_summary_counts() {
        let days = vec![
            day(1, date(2021, 6, 1), 10.0, 24),
            day(2, date(2021, 6, 1), 20.0, 24),
            day(1, date(2022, 6, 1), 40.0, 24),
        ];
        let report = QualityChecker::new(15.0).check(&days, None, None);
        assert_eq!(report.periods.len(), 2);
        assert_eq!(report.periods[0].period, Period::PreWar);
        assert_eq!(report.periods[0].pm25_median, Some(15.0));
        assert_eq!(report.periods[0].cities, 2);
        assert_eq!(report.summary.years, vec![2021, 2022]);
        assert_eq!(report.summary.cities, 2);
        assert_eq!(report.summary.reconciliation, Reconciliation::default());

        let text = QualityChecker::new(15.0).generate_summary(&report);
        assert!(text.contains("Daily rows: 3"));
    }

    #[test]
    fn test_empty_daily_table_gives_empty_reports() -> Result<()> {
        let dir = TempDir::new()?;
        let processed = dir.path().join("processed");
        let qa = dir.path().join("qa");
        crate::writers::ParquetWriter::new().write_daily(&[], &processed.join(DAILY_TABLE_FILE))?;

        let report = QualityChecker::new(15.0).run(&processed, &dir.path().join("raw"), &qa)?;
        assert!(report.coverage.is_empty());
        assert_eq!(report.summary.daily_rows, 0);
        assert_eq!(std::fs::read_to_string(qa.join(QA_COVERAGE_FILE))?, "");
        assert!(qa.join(QA_SUMMARY_FILE).exists());
        Ok(())
    }
}
