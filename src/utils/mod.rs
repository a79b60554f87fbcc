pub mod constants;
pub mod filename;
pub mod progress;
pub mod staleness;
pub mod stats;

pub use constants::*;
pub use filename::{
    list_partitions, partition_file_name, partition_path, partition_year, year_from_file_stem,
};
pub use progress::ProgressReporter;
pub use staleness::{check_freshness, Freshness};
pub use stats::Distribution;
