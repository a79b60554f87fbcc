pub mod parquet_writer;
pub mod report_writer;

pub use parquet_writer::ParquetWriter;
pub use report_writer::{write_csv, write_json};
