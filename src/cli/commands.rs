use crate::cli::args::{Cli, Commands};
use crate::config::{override_with, parse_date, PipelineConfig};
use crate::error::Result;
use crate::processors::{Aggregator, Ingestor, Pipeline, QualityChecker};
use crate::readers::ParquetReader;

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    let show_progress = !cli.verbose;

    match cli.command {
        Commands::Ingest {
            hourly_pattern,
            cities_metadata,
            raw_dir,
            archive_csv,
            timezone,
            year,
            max_workers,
            compression,
            row_group_size,
        } => {
            override_with(&mut config.hourly_pattern, hourly_pattern);
            override_with(&mut config.cities_metadata, cities_metadata);
            override_with(&mut config.raw_dir, raw_dir);
            override_with(&mut config.timezone, timezone);
            override_with(&mut config.compression, compression);
            override_with(&mut config.row_group_size, row_group_size);
            if archive_csv.is_some() {
                config.archive_csv = archive_csv;
            }
            config.validate_settings()?;

            println!("Ingesting hourly data...");
            println!("Pattern: {}", config.hourly_pattern);
            println!("Output directory: {}", config.raw_dir.display());

            let manifest = Ingestor::from_config(&config)?
                .with_year(year)
                .with_max_workers(max_workers)
                .with_progress(show_progress)
                .run()
                .await?;

            println!("\nRecords per year:");
            for (year, count) in &manifest.records_per_year {
                println!("  {}: {}", year, count);
            }
            println!(
                "Rows read: {}, dropped: {} ({} duplicates, {} superseded, {} without key)",
                manifest.rows_read,
                manifest.rows_dropped(),
                manifest.duplicates_dropped,
                manifest.archive_rows_superseded,
                manifest.rows_missing_keys
            );
        }

        Commands::Aggregate {
            raw_dir,
            processed_dir,
            cities_metadata,
            admin_boundaries,
            timezone,
            wartime_start,
            pm25_guideline,
            qualifying_years_only,
            run_timestamp,
            compression,
            row_group_size,
        } => {
            override_with(&mut config.raw_dir, raw_dir);
            override_with(&mut config.processed_dir, processed_dir);
            override_with(&mut config.cities_metadata, cities_metadata);
            override_with(&mut config.timezone, timezone);
            override_with(&mut config.pm25_guideline, pm25_guideline);
            override_with(&mut config.compression, compression);
            override_with(&mut config.row_group_size, row_group_size);
            let wartime_start = wartime_start.as_deref().map(parse_date).transpose()?;
            override_with(&mut config.wartime_start, wartime_start);
            if admin_boundaries.is_some() {
                config.admin_boundaries = admin_boundaries;
            }
            if run_timestamp.is_some() {
                config.run_timestamp = run_timestamp;
            }
            config.qualifying_years_only |= qualifying_years_only;
            config.validate_settings()?;

            println!("Aggregating hourly partitions...");
            println!("Input directory: {}", config.raw_dir.display());
            println!("Output directory: {}", config.processed_dir.display());

            let manifest = Aggregator::from_config(&config)?
                .with_progress(show_progress)
                .run()?;

            println!(
                "\nEligible cities: {} of {}",
                manifest.eligible_cities.len(),
                manifest.cities_total
            );
            println!(
                "Daily rows: {} retained, {} excluded",
                manifest.daily_rows_retained, manifest.daily_rows_excluded
            );
            println!(
                "City distribution rows: {}, region-period rows: {}",
                manifest.city_distribution_rows, manifest.region_period_rows
            );
        }

        Commands::Qa {
            processed_dir,
            qa_dir,
            pm25_guideline,
        } => {
            override_with(&mut config.processed_dir, processed_dir);
            override_with(&mut config.qa_dir, qa_dir);
            override_with(&mut config.pm25_guideline, pm25_guideline);
            config.validate_settings()?;

            let checker = QualityChecker::new(config.pm25_guideline);
            let report = checker.run(&config.processed_dir, &config.raw_dir, &config.qa_dir)?;
            println!("\n{}", checker.generate_summary(&report));
        }

        Commands::Run {
            force,
            max_workers,
            qualifying_years_only,
            run_timestamp,
        } => {
            config.qualifying_years_only |= qualifying_years_only;
            if run_timestamp.is_some() {
                config.run_timestamp = run_timestamp;
            }

            let outcomes = Pipeline::new(config)
                .with_force(force)
                .with_max_workers(max_workers)
                .with_progress(show_progress)
                .run()
                .await?;

            for outcome in outcomes {
                println!(
                    "{:<10} {:<8} {}",
                    outcome.stage.as_str(),
                    if outcome.ran { "ran" } else { "skipped" },
                    outcome.reason.describe()
                );
            }
        }

        Commands::Info { file } => {
            println!("Analyzing Parquet file: {}", file.display());
            let info = ParquetReader::new().file_info(&file)?;
            println!("\n{}", info.summary());
        }
    }

    Ok(())
}
