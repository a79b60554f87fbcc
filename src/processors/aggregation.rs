use crate::config::{require_dir, require_file, PipelineConfig};
use crate::error::{ProcessingError, Result};
use crate::models::{
    AggregationManifest, AggregationParameters, CityMetadata, DailySummary, HourlyReading,
};
use crate::processors::daily_aggregator::DailyAggregator;
use crate::processors::distributions::city_distributions;
use crate::processors::eligibility::{Eligibility, EligibilityCriteria};
use crate::processors::enrichment::enrich_readings;
use crate::processors::ingestion::existing_partitions;
use crate::processors::regional::{region_period_summaries, unmapped_regions};
use crate::readers::{BoundaryIndex, BoundaryReader, CityReader, ParquetReader};
use crate::utils::constants::*;
use crate::utils::ProgressReporter;
use crate::writers::{write_json, ParquetWriter};
use chrono::NaiveDate;
use chrono_tz::Tz;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Aggregation stage: raw partitions to the processed analysis tables
pub struct Aggregator {
    tz: Tz,
    timezone: String,
    war_start: NaiveDate,
    pm25_guideline: f64,
    qualifying_years_only: bool,
    cities_metadata: PathBuf,
    admin_boundaries: Option<PathBuf>,
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    run_timestamp: Option<String>,
    criteria: EligibilityCriteria,
    writer: ParquetWriter,
    show_progress: bool,
}

impl Aggregator {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            tz: config.tz()?,
            timezone: config.timezone.clone(),
            war_start: config.wartime_start,
            pm25_guideline: config.pm25_guideline,
            qualifying_years_only: config.qualifying_years_only,
            cities_metadata: config.cities_metadata.clone(),
            admin_boundaries: config.admin_boundaries.clone(),
            raw_dir: config.raw_dir.clone(),
            processed_dir: config.processed_dir.clone(),
            run_timestamp: config.run_timestamp.clone(),
            criteria: EligibilityCriteria::default(),
            writer: ParquetWriter::new()
                .with_compression(&config.compression)?
                .with_row_group_size(config.row_group_size),
            show_progress: false,
        })
    }

    pub fn with_criteria(mut self, criteria: EligibilityCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn parameters(&self) -> AggregationParameters {
        AggregationParameters {
            timezone: self.timezone.clone(),
            wartime_start: self.war_start,
            pm25_guideline: self.pm25_guideline,
            qualifying_years_only: self.qualifying_years_only,
            admin_boundaries: self
                .admin_boundaries
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.processed_dir.join(AGGREGATION_MANIFEST_FILE)
    }

    /// Files whose modification makes the processed tables stale
    pub fn input_paths(&self) -> Result<Vec<PathBuf>> {
        let mut inputs = existing_partitions(&self.raw_dir)?;
        inputs.push(self.raw_dir.join(INGEST_MANIFEST_FILE));
        inputs.push(self.cities_metadata.clone());
        inputs.extend(self.admin_boundaries.iter().cloned());
        Ok(inputs)
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        [
            HOURLY_TABLE_FILE,
            DAILY_TABLE_FILE,
            DISTRIBUTIONS_TABLE_FILE,
            COVERAGE_TABLE_FILE,
            REGION_TABLE_FILE,
            AGGREGATION_MANIFEST_FILE,
        ]
        .iter()
        .map(|name| self.processed_dir.join(name))
        .collect()
    }

    fn load_boundaries(&self) -> Result<BoundaryIndex> {
        match &self.admin_boundaries {
            Some(path) if path.exists() => BoundaryReader::new().read_boundaries(path),
            Some(path) => {
                warn!(
                    "Administrative boundaries {} not found; regions will be unmapped",
                    path.display()
                );
                Ok(BoundaryIndex::empty())
            }
            None => Ok(BoundaryIndex::empty()),
        }
    }

    fn load_hourly(&self) -> Result<Vec<HourlyReading>> {
        require_dir(&self.raw_dir)?;
        let partitions = existing_partitions(&self.raw_dir)?;
        if partitions.is_empty() {
            return Err(ProcessingError::MissingInput(self.raw_dir.clone()));
        }

        let reader = ParquetReader::new();
        let per_partition = partitions
            .par_iter()
            .map(|path| {
                let rows = reader.read_hourly(path, self.tz)?;
                debug!("Loaded {} rows from {}", rows.len(), path.display());
                Ok(rows)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(per_partition.into_iter().flatten().collect())
    }

    pub fn run(&self) -> Result<AggregationManifest> {
        require_file(&self.cities_metadata)?;
        let progress = ProgressReporter::new_spinner("Loading partitions", !self.show_progress);
        let hourly = self.load_hourly()?;
        let cities = CityReader::new().read_cities_map(&self.cities_metadata)?;
        let boundaries = self.load_boundaries()?;

        info!(
            "Aggregating {} hourly rows for {} known cities",
            hourly.len(),
            cities.len()
        );

        progress.set_message("Aggregating daily summaries");
        let daily = DailyAggregator::new(self.pm25_guideline, self.war_start)
            .aggregate(&hourly, &cities, &boundaries);
        let eligibility = Eligibility::evaluate(&daily, self.war_start, &self.criteria);
        let qualifying = eligibility.qualifying_years();

        let keep = |city_id: i64, year: i32| {
            if self.qualifying_years_only {
                qualifying.contains(&(city_id, year))
            } else {
                eligibility.is_eligible(city_id)
            }
        };

        let hourly_rows_read = hourly.len();
        let cities_without_metadata = missing_metadata(&hourly, &cities);
        let hourly_retained: Vec<HourlyReading> = hourly
            .into_iter()
            .filter(|r| keep(r.city_id, r.year()))
            .collect();
        let daily_rows_total = daily.len();
        let daily_retained: Vec<DailySummary> = daily
            .into_iter()
            .filter(|d| keep(d.city_id, d.year()))
            .collect();

        if eligibility.eligible.is_empty() {
            warn!("No city meets the coverage criteria; writing empty tables");
        } else {
            info!(
                "{} of {} cities eligible",
                eligibility.eligible.len(),
                eligibility
                    .coverage
                    .iter()
                    .map(|c| c.city_id)
                    .collect::<BTreeSet<_>>()
                    .len()
            );
        }

        let distributions = city_distributions(&daily_retained);
        let regions = region_period_summaries(&daily_retained, &cities, &boundaries);
        let hourly_retained_count = hourly_retained.len();
        let enriched = enrich_readings(hourly_retained, self.war_start);

        progress.set_message("Writing processed tables");
        let dir = &self.processed_dir;
        std::fs::create_dir_all(dir)?;
        self.writer.write_enriched_hourly(
            &enriched,
            &cities,
            self.tz,
            &dir.join(HOURLY_TABLE_FILE),
        )?;
        self.writer
            .write_daily(&daily_retained, &dir.join(DAILY_TABLE_FILE))?;
        self.writer
            .write_distributions(&distributions, &dir.join(DISTRIBUTIONS_TABLE_FILE))?;
        self.writer.write_coverage(
            &eligibility.coverage,
            &eligibility.eligible,
            &dir.join(COVERAGE_TABLE_FILE),
        )?;
        self.writer
            .write_regions(&regions, &dir.join(REGION_TABLE_FILE))?;

        let unmapped = unmapped_regions(&regions);
        if !unmapped.is_empty() {
            warn!(
                "{} region(s) without boundaries: {}",
                unmapped.len(),
                unmapped.join(", ")
            );
        }

        let manifest = AggregationManifest {
            parameters: self.parameters(),
            run_timestamp: self.run_timestamp.clone(),
            hourly_rows_read,
            hourly_rows_retained: hourly_retained_count,
            hourly_rows_excluded: hourly_rows_read - hourly_retained_count,
            daily_rows_total,
            daily_rows_retained: daily_retained.len(),
            daily_rows_excluded: daily_rows_total - daily_retained.len(),
            cities_total: eligibility.eligible.len() + eligibility.excluded().len(),
            eligible_cities: eligibility.eligible.iter().copied().collect(),
            excluded_cities: eligibility.excluded(),
            cities_without_metadata,
            unmapped_regions: unmapped,
            city_distribution_rows: distributions.len(),
            region_period_rows: regions.len(),
        };
        write_json(&manifest, &self.manifest_path())?;
        progress.finish_with_message("Processed tables written");

        info!(
            "Aggregation finished: {} daily rows, {} distribution rows, {} region-period rows",
            manifest.daily_rows_retained,
            manifest.city_distribution_rows,
            manifest.region_period_rows
        );
        Ok(manifest)
    }
}

fn missing_metadata(hourly: &[HourlyReading], cities: &BTreeMap<i64, CityMetadata>) -> Vec<i64> {
    let missing: BTreeSet<i64> = hourly
        .iter()
        .map(|r| r.city_id)
        .filter(|id| !cities.contains_key(id))
        .collect();
    missing.into_iter().collect()
}
