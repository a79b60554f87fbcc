use crate::config::{require_file, PipelineConfig};
use crate::error::{ProcessingError, Result};
use crate::models::manifest::read_manifest_opt;
use crate::models::{FailedSource, HourlyReading, IngestManifest, IngestParameters, SourceKind};
use crate::readers::{CityReader, HourlyReader, SourceBatch, SourceFile};
use crate::utils::constants::INGEST_MANIFEST_FILE;
use crate::utils::{list_partitions, partition_path, year_from_file_stem, ProgressReporter};
use crate::writers::{write_json, ParquetWriter};
use chrono_tz::Tz;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Row accounting produced while merging source batches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub rows_read: usize,
    pub rows_missing_keys: usize,
    pub duplicates_dropped: usize,
    pub archive_rows_superseded: usize,
    pub rows_outside_year_filter: usize,
    pub unknown_city_rows: usize,
    pub pm25_out_of_range: usize,
    pub aqi_out_of_range: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergedReadings {
    pub partitions: BTreeMap<i32, Vec<HourlyReading>>,
    pub stats: MergeStats,
}

impl MergedReadings {
    pub fn total_records(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }
}

/// Merge parsed source files into per-year partitions.
///
/// Yearly files take precedence over the archive: archive rows in a local
/// year that a yearly file covers are discarded, and for a repeated
/// (city_id, logged_at) key the first row wins, with yearly files visited in
/// the order given and the archive last. Partitions are sorted by key.
///
/// `declared_years` are the years named by every matched yearly file,
/// including files that failed to parse; the archive never fills them.
pub fn merge_batches(
    mut batches: Vec<SourceBatch>,
    year: Option<i32>,
    declared_years: &BTreeSet<i32>,
    known_cities: &BTreeSet<i64>,
) -> MergedReadings {
    batches.sort_by_key(|b| b.kind);

    let mut yearly_years = declared_years.clone();
    yearly_years.extend(
        batches
            .iter()
            .filter(|b| b.kind == SourceKind::Yearly)
            .flat_map(|b| b.covered_years()),
    );

    let mut merged = MergedReadings::default();
    let stats = &mut merged.stats;
    let mut seen = HashSet::new();

    for batch in batches {
        stats.rows_read += batch.rows_read;
        stats.rows_missing_keys += batch.rows_missing_keys;

        for reading in batch.readings {
            let reading_year = reading.year();
            if year.is_some_and(|y| y != reading_year) {
                stats.rows_outside_year_filter += 1;
                continue;
            }
            if batch.kind == SourceKind::Archive && yearly_years.contains(&reading_year) {
                stats.archive_rows_superseded += 1;
                continue;
            }
            if !seen.insert(reading.key()) {
                stats.duplicates_dropped += 1;
                continue;
            }

            if !known_cities.contains(&reading.city_id) {
                stats.unknown_city_rows += 1;
            }
            if reading.pm25_out_of_range() {
                stats.pm25_out_of_range += 1;
            }
            if reading.aqi_out_of_range() {
                stats.aqi_out_of_range += 1;
            }
            merged
                .partitions
                .entry(reading_year)
                .or_default()
                .push(reading);
        }
    }

    for rows in merged.partitions.values_mut() {
        rows.sort_by_key(|r| r.key());
    }
    merged
}

/// Ingestion stage: source CSVs to yearly hourly partitions
pub struct Ingestor {
    tz: Tz,
    timezone: String,
    hourly_pattern: String,
    archive_csv: Option<PathBuf>,
    cities_metadata: PathBuf,
    raw_dir: PathBuf,
    year: Option<i32>,
    max_workers: usize,
    writer: ParquetWriter,
    show_progress: bool,
}

impl Ingestor {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            tz: config.tz()?,
            timezone: config.timezone.clone(),
            hourly_pattern: config.hourly_pattern.clone(),
            archive_csv: config.archive_csv.clone(),
            cities_metadata: config.cities_metadata.clone(),
            raw_dir: config.raw_dir.clone(),
            year: None,
            max_workers: num_cpus::get(),
            writer: ParquetWriter::new()
                .with_compression(&config.compression)?
                .with_row_group_size(config.row_group_size),
            show_progress: false,
        })
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.raw_dir.join(INGEST_MANIFEST_FILE)
    }

    /// Yearly files matching the pattern in sorted order, then the archive.
    ///
    /// Every input must exist; nothing is written when one is missing.
    pub fn resolve_sources(&self) -> Result<Vec<SourceFile>> {
        let mut files: Vec<PathBuf> = glob::glob(&self.hourly_pattern)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|p| p.is_file() && Some(p) != self.archive_csv.as_ref())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(ProcessingError::MissingInput(PathBuf::from(
                &self.hourly_pattern,
            )));
        }

        if let Some(year) = self.year {
            files.retain(|p| match year_from_file_stem(p) {
                Some(y) if y != year => {
                    debug!("Skipping {} outside year {}", p.display(), year);
                    false
                }
                _ => true,
            });
        }

        let mut sources: Vec<SourceFile> = files.into_iter().map(SourceFile::yearly).collect();
        if let Some(archive) = &self.archive_csv {
            require_file(archive)?;
            sources.push(SourceFile::archive(archive.clone()));
        }
        Ok(sources)
    }

    pub fn parameters(&self, sources: &[SourceFile]) -> IngestParameters {
        IngestParameters {
            timezone: self.timezone.clone(),
            hourly_files: sources
                .iter()
                .filter(|s| s.kind == SourceKind::Yearly)
                .map(SourceFile::file_name)
                .collect(),
            archive_file: sources
                .iter()
                .find(|s| s.kind == SourceKind::Archive)
                .map(SourceFile::file_name),
            year: self.year,
        }
    }

    /// Parse every source on blocking tasks, at most `max_workers` at a time.
    ///
    /// Results come back in source order regardless of completion order.
    async fn parse_sources(
        &self,
        sources: &[SourceFile],
        progress: &ProgressReporter,
    ) -> Result<Vec<(SourceFile, Result<SourceBatch>)>> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ProcessingError::Config(e.to_string()))?;
            let reader = HourlyReader::new(self.tz);
            let task_source = source.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                reader.read_source(&task_source)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (source, handle) in sources.iter().zip(handles) {
            let result = handle.await?;
            progress.increment(1);
            results.push((source.clone(), result));
        }
        Ok(results)
    }

    fn write_partitions(
        &self,
        partitions: &BTreeMap<i32, Vec<HourlyReading>>,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.raw_dir)?;
        let progress = ProgressReporter::new(
            partitions.len() as u64,
            "Writing partitions",
            !self.show_progress,
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;

        let written = pool.install(|| {
            partitions
                .par_iter()
                .map(|(year, rows)| {
                    let path = partition_path(&self.raw_dir, *year);
                    self.writer.write_hourly_partition(rows, self.tz, &path)?;
                    info!("Wrote {} rows to {}", rows.len(), path.display());
                    progress.increment(1);
                    Ok(path)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        progress.finish_with_message("Partitions written");
        Ok(written)
    }

    /// Delete partitions this run no longer produces.
    ///
    /// Years whose yearly file failed keep their previous partition.
    fn remove_stale_partitions(
        &self,
        produced: &BTreeMap<i32, Vec<HourlyReading>>,
        failed_years: &BTreeSet<i32>,
    ) -> Result<()> {
        if !self.raw_dir.is_dir() {
            return Ok(());
        }
        for (year, path) in list_partitions(&self.raw_dir)? {
            let in_scope = self.year.map_or(true, |y| y == year);
            if in_scope && !produced.contains_key(&year) && !failed_years.contains(&year) {
                info!("Removing stale partition {}", path.display());
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Run ingestion end to end.
    ///
    /// A source that fails to parse does not stop the others: partitions and
    /// the manifest are still written, then `PartialIngest` is returned.
    pub async fn run(&self) -> Result<IngestManifest> {
        let sources = self.resolve_sources()?;
        require_file(&self.cities_metadata)?;
        let known_cities: BTreeSet<i64> = CityReader::new()
            .read_cities_map(&self.cities_metadata)?
            .into_keys()
            .collect();

        info!(
            "Ingesting {} source file(s) into {}",
            sources.len(),
            self.raw_dir.display()
        );

        let progress = ProgressReporter::new(
            sources.len() as u64,
            "Parsing source files",
            !self.show_progress,
        );
        let results = self.parse_sources(&sources, &progress).await?;
        progress.finish_with_message("Source files parsed");

        let declared_years: BTreeSet<i32> = sources
            .iter()
            .filter(|s| s.kind == SourceKind::Yearly)
            .filter_map(|s| year_from_file_stem(&s.path))
            .collect();

        let mut batches = Vec::new();
        let mut failed = Vec::new();
        let mut failed_years = BTreeSet::new();
        for (source, result) in results {
            match result {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    error!("Failed to ingest {}: {}", source.path.display(), e);
                    failed_years.extend(year_from_file_stem(&source.path));
                    failed.push(FailedSource {
                        file: source.file_name(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if batches.is_empty() && !failed.is_empty() {
            return Err(partial_ingest_error(&failed));
        }

        let merged = merge_batches(batches, self.year, &declared_years, &known_cities);
        let stats = &merged.stats;
        if stats.unknown_city_rows > 0 {
            warn!(
                "{} row(s) reference city ids missing from {}",
                stats.unknown_city_rows,
                self.cities_metadata.display()
            );
        }

        self.write_partitions(&merged.partitions)?;
        self.remove_stale_partitions(&merged.partitions, &failed_years)?;

        let manifest = self.build_manifest(&sources, &merged, &failed_years, failed);
        for year in &manifest.kept_partitions {
            warn!("Keeping previous {} partition after its source failed", year);
        }
        write_json(&manifest, &self.manifest_path())?;

        info!(
            "Ingestion finished: {} rows read, {} written, {} duplicates, {} superseded",
            stats.rows_read,
            merged.total_records(),
            stats.duplicates_dropped,
            stats.archive_rows_superseded
        );

        if !manifest.failed_files.is_empty() {
            return Err(partial_ingest_error(&manifest.failed_files));
        }
        Ok(manifest)
    }

    fn build_manifest(
        &self,
        sources: &[SourceFile],
        merged: &MergedReadings,
        failed_years: &BTreeSet<i32>,
        failed_files: Vec<FailedSource>,
    ) -> IngestManifest {
        let kept_partitions: Vec<i32> = failed_years
            .iter()
            .copied()
            .filter(|y| !merged.partitions.contains_key(y))
            .filter(|y| partition_path(&self.raw_dir, *y).exists())
            .collect();

        let mut records_per_year: BTreeMap<i32, usize> = merged
            .partitions
            .iter()
            .map(|(year, rows)| (*year, rows.len()))
            .collect();

        // A single-year run keeps the counts of partitions it left alone
        if let Some(year) = self.year {
            if let Some(previous) = read_manifest_opt::<IngestManifest>(&self.manifest_path()) {
                for (y, count) in previous.records_per_year {
                    if y != year && partition_path(&self.raw_dir, y).exists() {
                        records_per_year.entry(y).or_insert(count);
                    }
                }
            }
        }

        let stats = &merged.stats;
        IngestManifest {
            parameters: self.parameters(sources),
            records_per_year,
            rows_read: stats.rows_read,
            rows_missing_keys: stats.rows_missing_keys,
            duplicates_dropped: stats.duplicates_dropped,
            archive_rows_superseded: stats.archive_rows_superseded,
            rows_outside_year_filter: stats.rows_outside_year_filter,
            unknown_city_rows: stats.unknown_city_rows,
            pm25_out_of_range: stats.pm25_out_of_range,
            aqi_out_of_range: stats.aqi_out_of_range,
            failed_files,
            kept_partitions,
        }
    }
}

fn partial_ingest_error(failed: &[FailedSource]) -> ProcessingError {
    ProcessingError::PartialIngest {
        failed: failed.len(),
        files: failed
            .iter()
            .map(|f| f.file.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Paths of the partitions currently on disk
pub fn existing_partitions(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(list_partitions(raw_dir)?
        .into_iter()
        .map(|(_, path)| path)
        .collect())
}
