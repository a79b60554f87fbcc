use aq_processor::error::ProcessingError;
use aq_processor::models::manifest::read_manifest;
use aq_processor::models::{AggregationManifest, IngestManifest};
use aq_processor::processors::{Aggregator, Ingestor, Pipeline, QualityChecker};
use aq_processor::readers::ParquetReader;
use aq_processor::utils::constants::*;
use aq_processor::utils::{list_partitions, partition_path};
use aq_processor::PipelineConfig;
use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CITIES_CSV: &str = "id,city_name,region_name,koatuu\n\
1,Київ,Київська,3200000000\n\
2,Львів,Львівська,4600000000\n";

const BOUNDARIES: &str = r#"{"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {"name:uk": "Київська область", "koatuu": "3200000000"},
     "geometry": {"type": "Point", "coordinates": [30.5, 50.4]}}
]}"#;

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("dataset")).unwrap();
        std::fs::write(root.join("dataset/cities.csv"), CITIES_CSV).unwrap();
        std::fs::write(root.join("dataset/boundaries.geojson"), BOUNDARIES).unwrap();
        Self { _dir: dir, root }
    }

    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::load(None).unwrap();
        config.hourly_pattern = self
            .root
            .join("dataset/pm25_hourly_*.csv")
            .display()
            .to_string();
        config.cities_metadata = self.root.join("dataset/cities.csv");
        config.admin_boundaries = Some(self.root.join("dataset/boundaries.geojson"));
        config.raw_dir = self.root.join("data/raw");
        config.processed_dir = self.root.join("data/processed");
        config.qa_dir = self.root.join("outputs/qa");
        config.run_timestamp = Some("2024-01-01T00:00:00Z".to_string());
        config
    }

    fn yearly_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("dataset/pm25_hourly_{}.csv", year))
    }

    fn archive_path(&self) -> PathBuf {
        self.root.join("dataset/pm25_archive.csv")
    }
}

/// 18 readings per local day (UTC 00:00-17:00) for every day of `year`
fn full_year_rows(out: &mut String, city_id: i64, year: i32, pm25: f64) {
    let mut date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    while date.year() == year {
        for hour in 0..18 {
            let aqi = pm25 * 3.0;
            writeln!(out, "{},{} {:02}:00:00,{},{}", city_id, date, hour, pm25, aqi).unwrap();
        }
        date += Duration::days(1);
    }
}

fn partition_years(raw_dir: &Path) -> Vec<i32> {
    list_partitions(raw_dir)
        .unwrap()
        .into_iter()
        .map(|(y, _)| y)
        .collect()
}

fn ingest_manifest(config: &PipelineConfig) -> IngestManifest {
    read_manifest(&config.raw_dir.join(INGEST_MANIFEST_FILE)).unwrap()
}

fn write_csv(path: &Path, body: &str) {
    std::fs::write(path, format!("city_id,logged_at,pm25,aqi\n{}", body)).unwrap();
}

/// City 1 covers 2019, 2020, 2022, 2023; city 2 covers 2021-2024
fn write_scenario(ws: &Workspace) {
    for year in 2019..=2024 {
        let mut body = String::new();
        if matches!(year, 2019 | 2020 | 2022 | 2023) {
            full_year_rows(&mut body, 1, year, 10.0 + (year - 2019) as f64);
        }
        if year >= 2021 {
            full_year_rows(&mut body, 2, year, 30.0);
        }
        write_csv(&ws.yearly_path(year), &body);
    }
}

#[tokio::test]
async fn test_ingest_row_accounting_and_archive_precedence() {
    let ws = Workspace::new();
    write_csv(
        &ws.yearly_path(2021),
        "1,2021-03-01 10:00:00,12.0,40\n\
         1,2021-03-01 10:00:00,13.0,41\n\
         1,2021-03-01 11:00:00,-5,20\n\
         ,2021-03-01 12:00:00,5,5\n\
         7,2021-03-01 12:00:00,abc,\n",
    );
    write_csv(
        &ws.archive_path(),
        "1,2021-03-01 10:00:00,99.0,300\n\
         1,2018-06-01T08:00:00Z,8.0,30\n\
         1,2018-06-01 08:00:00+00:00,8.0,30\n",
    );

    let mut config = ws.config();
    config.archive_csv = Some(ws.archive_path());
    let manifest = Ingestor::from_config(&config).unwrap().run().await.unwrap();

    assert_eq!(manifest.rows_read, 8);
    assert_eq!(manifest.rows_missing_keys, 1);
    assert_eq!(manifest.duplicates_dropped, 2);
    assert_eq!(manifest.archive_rows_superseded, 1);
    assert_eq!(manifest.unknown_city_rows, 1);
    assert_eq!(manifest.pm25_out_of_range, 1);
    assert_eq!(manifest.records_per_year.get(&2021), Some(&3));
    assert_eq!(manifest.records_per_year.get(&2018), Some(&1));
    assert!(manifest.reconciles());

    assert_eq!(ingest_manifest(&config), manifest);

    let readings = ParquetReader::new()
        .read_hourly(&partition_path(&config.raw_dir, 2021), config.tz().unwrap())
        .unwrap();
    let first = &readings[0];
    assert_eq!(first.pm25, Some(12.0));
    assert_eq!(first.source_file, "pm25_hourly_2021.csv");
    assert!(readings.iter().all(|r| r.logged_at_local.with_timezone(&Utc) == r.logged_at));
    assert_eq!(readings[2].pm25, None);
}

#[tokio::test]
async fn test_ingest_is_idempotent_and_removes_stale_partitions() {
    let ws = Workspace::new();
    write_csv(
        &ws.yearly_path(2020),
        "1,2020-12-31 22:30:00,5,10\n1,2020-06-01 00:00:00,6,12\n",
    );
    let config = ws.config();

    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    // 22:30 UTC on Dec 31 is already 2021 in Kyiv
    assert_eq!(partition_years(&config.raw_dir), vec![2020, 2021]);

    let reader = ParquetReader::new();
    let partition_2021 = partition_path(&config.raw_dir, 2021);
    let before = reader.read_hourly(&partition_2021, config.tz().unwrap()).unwrap();
    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    let after = reader.read_hourly(&partition_2021, config.tz().unwrap()).unwrap();
    assert_eq!(before, after);

    write_csv(&ws.yearly_path(2020), "1,2020-06-01 00:00:00,6,12\n");
    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    assert_eq!(partition_years(&config.raw_dir), vec![2020]);
}

#[tokio::test]
async fn test_single_year_ingest_leaves_other_partitions() {
    let ws = Workspace::new();
    write_csv(&ws.yearly_path(2020), "1,2020-06-01 00:00:00,6,12\n");
    write_csv(
        &ws.yearly_path(2021),
        "1,2021-06-01 00:00:00,7,14\n1,2021-06-01 01:00:00,8,16\n",
    );
    let config = ws.config();
    Ingestor::from_config(&config).unwrap().run().await.unwrap();

    write_csv(&ws.yearly_path(2021), "1,2021-06-01 00:00:00,7,14\n");
    let manifest = Ingestor::from_config(&config)
        .unwrap()
        .with_year(Some(2021))
        .run()
        .await
        .unwrap();

    assert_eq!(manifest.records_per_year.get(&2020), Some(&1));
    assert_eq!(manifest.records_per_year.get(&2021), Some(&1));
    assert!(partition_path(&config.raw_dir, 2020).exists());
}

#[tokio::test]
async fn test_malformed_file_does_not_stop_siblings() {
    let ws = Workspace::new();
    write_csv(&ws.yearly_path(2020), "1,2020-06-01 00:00:00,6,12\n");
    std::fs::write(ws.yearly_path(2021), "city_id,logged_at\n1,2021-06-01 00:00:00\n").unwrap();
    let config = ws.config();

    let result = Ingestor::from_config(&config).unwrap().run().await;
    match result {
        Err(ProcessingError::PartialIngest { failed, files }) => {
            assert_eq!(failed, 1);
            assert_eq!(files, "pm25_hourly_2021.csv");
        }
        other => panic!("expected partial ingest, got {:?}", other.map(|m| m.rows_read)),
    }
    assert!(partition_path(&config.raw_dir, 2020).exists());

    let manifest = ingest_manifest(&config);
    assert_eq!(manifest.failed_files.len(), 1);
    assert!(manifest.failed_files[0].error.contains("pm25, aqi"));
}

#[tokio::test]
async fn test_failed_yearly_file_keeps_partition_and_blocks_archive() {
    let ws = Workspace::new();
    write_csv(&ws.yearly_path(2020), "1,2020-06-01 00:00:00,6,12\n");
    write_csv(&ws.yearly_path(2021), "1,2021-06-01 00:00:00,7,14\n");
    let mut config = ws.config();
    Ingestor::from_config(&config).unwrap().run().await.unwrap();

    // the 2021 export turns malformed while the archive offers the same hour
    std::fs::write(ws.yearly_path(2021), "city_id,logged_at\n1,2021-06-01 00:00:00\n").unwrap();
    write_csv(&ws.archive_path(), "1,2021-06-01 00:00:00,999,300\n");
    config.archive_csv = Some(ws.archive_path());

    let result = Ingestor::from_config(&config).unwrap().run().await;
    assert!(matches!(result, Err(ProcessingError::PartialIngest { failed: 1, .. })));

    assert_eq!(partition_years(&config.raw_dir), vec![2020, 2021]);
    let kept = ParquetReader::new()
        .read_hourly(&partition_path(&config.raw_dir, 2021), config.tz().unwrap())
        .unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].pm25, Some(7.0));
    assert_eq!(kept[0].source_file, "pm25_hourly_2021.csv");

    let manifest = ingest_manifest(&config);
    assert_eq!(manifest.archive_rows_superseded, 1);
    assert_eq!(manifest.kept_partitions, vec![2021]);
    assert!(!manifest.records_per_year.contains_key(&2021));
    assert!(manifest.reconciles());
}

#[tokio::test]
async fn test_missing_inputs_fail_before_output() {
    let ws = Workspace::new();
    let config = ws.config();
    let result = Ingestor::from_config(&config).unwrap().run().await;
    assert!(matches!(result, Err(ProcessingError::MissingInput(_))));

    write_csv(&ws.yearly_path(2020), "1,2020-06-01 00:00:00,6,12\n");
    let mut config = ws.config();
    config.archive_csv = Some(ws.root.join("dataset/absent.csv"));
    let result = Ingestor::from_config(&config).unwrap().run().await;
    assert!(matches!(result, Err(ProcessingError::MissingInput(_))));
    assert!(!config.raw_dir.exists());
}

#[tokio::test]
async fn test_eligibility_scenarios_end_to_end() {
    let ws = Workspace::new();
    write_scenario(&ws);
    let config = ws.config();

    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    let manifest = Aggregator::from_config(&config).unwrap().run().unwrap();

    // 2019/2020/2022/2023 qualifies; 2021 + 2022-2024 has only one pre-war year
    assert_eq!(manifest.eligible_cities, vec![1]);
    assert_eq!(manifest.excluded_cities, vec![2]);
    assert!(manifest.reconciles());
    assert_eq!(manifest.run_timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));

    let days = ParquetReader::new()
        .read_daily(&config.processed_dir.join(DAILY_TABLE_FILE))
        .unwrap();
    assert_eq!(days.len(), manifest.daily_rows_retained);
    assert!(days.iter().all(|d| d.city_id == 1));
    assert!(days.iter().all(|d| d.available_hours == 18 && d.metadata_matched && d.region_mapped));
    assert!(days.windows(2).all(|w| w[0].date_local < w[1].date_local));
    assert!(days.iter().all(|d| (0.0..=1.0).contains(&d.exceedance_share)));

    let on_disk: AggregationManifest =
        read_manifest(&config.processed_dir.join(AGGREGATION_MANIFEST_FILE)).unwrap();
    assert_eq!(on_disk, manifest);
    for name in [
        HOURLY_TABLE_FILE,
        DISTRIBUTIONS_TABLE_FILE,
        COVERAGE_TABLE_FILE,
        REGION_TABLE_FILE,
    ] {
        assert!(config.processed_dir.join(name).exists(), "{} missing", name);
    }

    let qa = QualityChecker::new(config.pm25_guideline)
        .run(&config.processed_dir, &config.raw_dir, &config.qa_dir)
        .unwrap();
    assert_eq!(qa.summary.cities, 1);
    assert_eq!(qa.summary.years, vec![2019, 2020, 2022, 2023]);
    assert!(qa.coverage.iter().all(|c| c.coverage_fraction == 1.0));
    let reconciliation = qa.summary.reconciliation.aggregation.unwrap();
    assert!(reconciliation.reconciles && reconciliation.daily_table_matches);
    assert!(qa.summary.reconciliation.ingest.unwrap().reconciles);
}

#[tokio::test]
async fn test_negative_reading_decides_coverage() {
    let ws = Workspace::new();
    let mut body = String::new();
    // 17 valid hours plus one -5 reading on the same local day
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let stamp = |h: i64| (start + Duration::hours(h)).format("%Y-%m-%d %H:%M:%S");
    for h in 0..17 {
        writeln!(body, "1,{},10,30", stamp(h)).unwrap();
    }
    writeln!(body, "1,{},-5,30", stamp(17)).unwrap();
    write_csv(&ws.yearly_path(2021), &body);

    let config = ws.config();
    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    let manifest = Aggregator::from_config(&config).unwrap().run().unwrap();
    assert!(manifest.eligible_cities.is_empty());

    let coverage_rows = ParquetReader::new()
        .file_info(&config.processed_dir.join(COVERAGE_TABLE_FILE))
        .unwrap();
    assert_eq!(coverage_rows.total_rows, 1);
}

#[tokio::test]
async fn test_zero_eligible_cities_writes_empty_tables() {
    let ws = Workspace::new();
    write_csv(&ws.yearly_path(2021), "2,2021-06-01 00:00:00,6,12\n");
    let config = ws.config();

    Ingestor::from_config(&config).unwrap().run().await.unwrap();
    let manifest = Aggregator::from_config(&config).unwrap().run().unwrap();
    assert!(manifest.eligible_cities.is_empty());
    assert_eq!(manifest.daily_rows_retained, 0);
    assert_eq!(manifest.hourly_rows_excluded, 1);

    let info = ParquetReader::new()
        .file_info(&config.processed_dir.join(DAILY_TABLE_FILE))
        .unwrap();
    assert_eq!(info.total_rows, 0);

    let qa = QualityChecker::new(config.pm25_guideline)
        .run(&config.processed_dir, &config.raw_dir, &config.qa_dir)
        .unwrap();
    assert_eq!(qa.summary.daily_rows, 0);
}

#[tokio::test]
async fn test_pipeline_skips_current_stages() {
    let ws = Workspace::new();
    write_csv(&ws.yearly_path(2021), "1,2021-06-01 00:00:00,6,12\n");
    let config = ws.config();

    let first = Pipeline::new(config.clone()).with_max_workers(2).run().await.unwrap();
    assert!(first.iter().all(|o| o.ran));

    let second = Pipeline::new(config.clone()).with_max_workers(2).run().await.unwrap();
    assert!(second.iter().all(|o| !o.ran));

    let mut changed = config.clone();
    changed.pm25_guideline = 5.0;
    let third = Pipeline::new(changed).with_max_workers(2).run().await.unwrap();
    let ran: Vec<bool> = third.iter().map(|o| o.ran).collect();
    assert_eq!(ran, vec![false, true, true]);

    let forced = Pipeline::new(config).with_force(true).run().await.unwrap();
    assert!(forced.iter().all(|o| o.ran));
}
