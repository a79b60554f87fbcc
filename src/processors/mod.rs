pub mod aggregation;
pub mod daily_aggregator;
pub mod distributions;
pub mod eligibility;
pub mod enrichment;
pub mod ingestion;
pub mod pipeline;
pub mod quality;
pub mod regional;

pub use aggregation::Aggregator;
pub use daily_aggregator::DailyAggregator;
pub use distributions::city_distributions;
pub use eligibility::{Eligibility, EligibilityCriteria};
pub use enrichment::{enrich_readings, EnrichedHour};
pub use ingestion::{merge_batches, Ingestor, MergeStats, MergedReadings};
pub use pipeline::{Pipeline, Stage, StageOutcome};
pub use quality::{QaReport, QaSummary, QualityChecker};
pub use regional::region_period_summaries;
