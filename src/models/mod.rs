pub mod calendar;
pub mod city;
pub mod daily;
pub mod hourly;
pub mod manifest;
pub mod summary;

pub use calendar::{DateFeatures, HourFeatures, Period, Season};
pub use city::CityMetadata;
pub use daily::DailySummary;
pub use hourly::{HourlyReading, SourceKind};
pub use manifest::{
    AggregationManifest, AggregationParameters, FailedSource, IngestManifest, IngestParameters,
};
pub use summary::{AggregationLevel, CityDistribution, CityYearCoverage, RegionPeriodSummary};
