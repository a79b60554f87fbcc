/// Validity bounds for raw readings
pub const MIN_VALID_PM25: f64 = 0.0;
pub const MAX_VALID_PM25: f64 = 1000.0;
pub const MIN_VALID_AQI: f64 = 0.0;
pub const MAX_VALID_AQI: f64 = 500.0;

/// A day counts as covered with at least this many valid hourly readings
pub const MIN_HOURS_PER_COVERED_DAY: u32 = 18;

/// Eligibility thresholds
pub const MIN_COVERAGE_RATIO: f64 = 0.7;
pub const MIN_TOTAL_YEARS: usize = 4;
pub const MIN_PREWAR_YEARS: usize = 2;
pub const MIN_WARTIME_YEARS: usize = 2;

/// Configuration defaults
pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";
pub const DEFAULT_WARTIME_START: &str = "2022-02-24";
pub const DEFAULT_PM25_GUIDELINE: f64 = 15.0;
pub const DEFAULT_HOURLY_PATTERN: &str = "dataset/saveecobot_cities_pm25_and_aqi_pm25_*.csv";
pub const DEFAULT_CITIES_METADATA: &str = "dataset/saveecobot_cities.csv";
pub const DEFAULT_ADMIN_BOUNDARIES: &str = "dataset/geo/ukraine_adm_boundaries.geojson";
pub const DEFAULT_RAW_DIR: &str = "data/raw";
pub const DEFAULT_PROCESSED_DIR: &str = "data/processed";
pub const DEFAULT_QA_DIR: &str = "outputs/qa";
pub const ENV_PREFIX: &str = "AQ";

/// Raw partition naming
pub const HOURLY_PARTITION_PREFIX: &str = "city_hourly_";
pub const PARQUET_EXTENSION: &str = "parquet";

/// File names
pub const INGEST_MANIFEST_FILE: &str = "ingest_manifest.json";
pub const AGGREGATION_MANIFEST_FILE: &str = "aggregation_manifest.json";
pub const HOURLY_TABLE_FILE: &str = "city_hourly_pm25.parquet";
pub const DAILY_TABLE_FILE: &str = "city_daily_pm25.parquet";
pub const DISTRIBUTIONS_TABLE_FILE: &str = "city_distributions.parquet";
pub const COVERAGE_TABLE_FILE: &str = "city_year_coverage.parquet";
pub const REGION_TABLE_FILE: &str = "region_period_pm25.parquet";
pub const QA_COVERAGE_FILE: &str = "city_year_coverage.csv";
pub const QA_PERIOD_FILE: &str = "period_summary.csv";
pub const QA_SUMMARY_FILE: &str = "qa_summary.json";

/// Period labels
pub const PERIOD_PRE_WAR: &str = "pre_war";
pub const PERIOD_WARTIME: &str = "wartime";

/// Processing defaults
pub const DEFAULT_BATCH_SIZE: usize = 65_536;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
