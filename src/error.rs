use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Unknown time zone: {0}")]
    UnknownTimezone(String),

    #[error("Required input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("{file}: missing required columns: {columns}")]
    MissingColumns { file: String, columns: String },

    #[error("{file}, line {line}: {message}")]
    SourceFile {
        file: String,
        line: u64,
        message: String,
    },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Ingestion incomplete: {failed} source file(s) failed: {files}")]
    PartialIngest { failed: usize, files: String },

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
