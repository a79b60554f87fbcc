use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aq-processor")]
#[command(about = "PM2.5/AQI batch pipeline: ingest hourly exports, aggregate, run QA")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize hourly CSV exports into yearly Parquet partitions
    Ingest {
        #[arg(long, help = "Glob matching the yearly hourly CSV files")]
        hourly_pattern: Option<String>,

        #[arg(long)]
        cities_metadata: Option<PathBuf>,

        #[arg(long)]
        raw_dir: Option<PathBuf>,

        #[arg(long, help = "Multi-year archive CSV; yearly files take precedence")]
        archive_csv: Option<PathBuf>,

        #[arg(long, help = "IANA time zone for local timestamps")]
        timezone: Option<String>,

        #[arg(long, help = "Only (re)build the partition for this local year")]
        year: Option<i32>,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,

        #[arg(long)]
        compression: Option<String>,

        #[arg(long, help = "Maximum rows per Parquet row group")]
        row_group_size: Option<usize>,
    },

    /// Build daily, city and regional tables for eligible cities
    Aggregate {
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        #[arg(long)]
        processed_dir: Option<PathBuf>,

        #[arg(long)]
        cities_metadata: Option<PathBuf>,

        #[arg(long, help = "GeoJSON with oblast boundaries")]
        admin_boundaries: Option<PathBuf>,

        #[arg(long)]
        timezone: Option<String>,

        #[arg(long, help = "First wartime day, YYYY-MM-DD")]
        wartime_start: Option<String>,

        #[arg(long, help = "PM2.5 guideline in µg/m³")]
        pm25_guideline: Option<f64>,

        #[arg(long, help = "Keep only covered years of eligible cities")]
        qualifying_years_only: bool,

        #[arg(long, help = "Timestamp recorded in the manifest")]
        run_timestamp: Option<String>,

        #[arg(long)]
        compression: Option<String>,

        #[arg(long, help = "Maximum rows per Parquet row group")]
        row_group_size: Option<usize>,
    },

    /// Coverage and exceedance diagnostics over the processed tables
    Qa {
        #[arg(long)]
        processed_dir: Option<PathBuf>,

        #[arg(long)]
        qa_dir: Option<PathBuf>,

        #[arg(long)]
        pm25_guideline: Option<f64>,
    },

    /// Run every stage, skipping those whose outputs are current
    Run {
        #[arg(long, help = "Recompute every stage")]
        force: bool,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,

        #[arg(long)]
        qualifying_years_only: bool,

        #[arg(long)]
        run_timestamp: Option<String>,
    },

    /// Show Parquet file statistics
    Info {
        #[arg(help = "Parquet file to inspect")]
        file: PathBuf,
    },
}
