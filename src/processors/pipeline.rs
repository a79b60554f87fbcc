use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::manifest::read_manifest_opt;
use crate::models::{AggregationManifest, IngestManifest};
use crate::processors::aggregation::Aggregator;
use crate::processors::ingestion::Ingestor;
use crate::processors::quality::{QaSummary, QualityChecker};
use crate::utils::constants::*;
use crate::utils::{check_freshness, partition_path, Freshness};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Aggregate,
    Qa,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Aggregate => "aggregate",
            Stage::Qa => "qa",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub ran: bool,
    pub reason: Freshness,
}

/// Runs ingest, aggregate and qa in order, skipping stages whose outputs
/// are current
pub struct Pipeline {
    config: PipelineConfig,
    force: bool,
    max_workers: usize,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            force: false,
            max_workers: num_cpus::get(),
            show_progress: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn ingest_freshness(&self, ingestor: &Ingestor) -> Result<Freshness> {
        let sources = ingestor.resolve_sources()?;
        let manifest_path = ingestor.manifest_path();
        let Some(manifest) = read_manifest_opt::<IngestManifest>(&manifest_path) else {
            return Ok(Freshness::MissingOutput(manifest_path));
        };
        if manifest.parameters != ingestor.parameters(&sources)
            || !manifest.failed_files.is_empty()
        {
            return Ok(Freshness::ParametersChanged);
        }

        let mut outputs = vec![manifest_path];
        outputs.extend(
            manifest
                .records_per_year
                .keys()
                .map(|year| partition_path(&self.config.raw_dir, *year)),
        );
        let mut inputs: Vec<PathBuf> = sources.into_iter().map(|s| s.path).collect();
        inputs.push(self.config.cities_metadata.clone());
        check_freshness(&inputs, &outputs)
    }

    fn aggregate_freshness(&self, aggregator: &Aggregator) -> Result<Freshness> {
        let manifest_path = aggregator.manifest_path();
        let Some(manifest) = read_manifest_opt::<AggregationManifest>(&manifest_path) else {
            return Ok(Freshness::MissingOutput(manifest_path));
        };
        if manifest.parameters != aggregator.parameters() {
            return Ok(Freshness::ParametersChanged);
        }
        check_freshness(&aggregator.input_paths()?, &aggregator.output_paths())
    }

    fn qa_freshness(&self) -> Result<Freshness> {
        let summary_path = self.config.qa_dir.join(QA_SUMMARY_FILE);
        let Some(summary) = read_manifest_opt::<QaSummary>(&summary_path) else {
            return Ok(Freshness::MissingOutput(summary_path));
        };
        if summary.pm25_guideline != self.config.pm25_guideline {
            return Ok(Freshness::ParametersChanged);
        }
        let inputs = vec![
            self.config.processed_dir.join(DAILY_TABLE_FILE),
            self.config.processed_dir.join(AGGREGATION_MANIFEST_FILE),
        ];
        check_freshness(&inputs, &QualityChecker::output_paths(&self.config.qa_dir))
    }

    /// Decide whether a stage runs; anything upstream that ran forces it
    fn decide(
        &self,
        upstream_ran: bool,
        check: impl FnOnce() -> Result<Freshness>,
    ) -> Result<Freshness> {
        if self.force || upstream_ran {
            Ok(Freshness::Forced)
        } else {
            check()
        }
    }

    pub async fn run(&self) -> Result<Vec<StageOutcome>> {
        self.config.validate_settings()?;
        let mut outcomes = Vec::new();

        let ingestor = Ingestor::from_config(&self.config)?
            .with_max_workers(self.max_workers)
            .with_progress(self.show_progress);
        let reason = self.decide(false, || self.ingest_freshness(&ingestor))?;
        let ingest_ran = reason.is_stale();
        if ingest_ran {
            info!("Running ingest: {}", reason.describe());
            ingestor.run().await?;
        } else {
            info!("Skipping ingest: {}", reason.describe());
        }
        outcomes.push(StageOutcome {
            stage: Stage::Ingest,
            ran: ingest_ran,
            reason,
        });

        let aggregator = Aggregator::from_config(&self.config)?.with_progress(self.show_progress);
        let reason = self.decide(ingest_ran, || self.aggregate_freshness(&aggregator))?;
        let aggregate_ran = reason.is_stale();
        if aggregate_ran {
            info!("Running aggregate: {}", reason.describe());
            aggregator.run()?;
        } else {
            info!("Skipping aggregate: {}", reason.describe());
        }
        outcomes.push(StageOutcome {
            stage: Stage::Aggregate,
            ran: aggregate_ran,
            reason,
        });

        let reason = self.decide(aggregate_ran, || self.qa_freshness())?;
        let qa_ran = reason.is_stale();
        if qa_ran {
            info!("Running qa: {}", reason.describe());
            QualityChecker::new(self.config.pm25_guideline).run(
                &self.config.processed_dir,
                &self.config.raw_dir,
                &self.config.qa_dir,
            )?;
        } else {
            info!("Skipping qa: {}", reason.describe());
        }
        outcomes.push(StageOutcome {
            stage: Stage::Qa,
            ran: qa_ran,
            reason,
        });

        Ok(outcomes)
    }
}
