pub mod boundary_reader;
pub mod city_reader;
pub mod header;
pub mod hourly_reader;
pub mod parquet_reader;

pub use boundary_reader::{Boundary, BoundaryIndex, BoundaryReader};
pub use city_reader::CityReader;
pub use hourly_reader::{HourlyReader, SourceBatch, SourceFile};
pub use parquet_reader::ParquetReader;
