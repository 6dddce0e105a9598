use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid category definition '{code}': {details}")]
    InvalidCategory { code: String, details: String },

    #[error("Duplicate category code: {0}")]
    DuplicateCategory(String),

    #[error("Invalid cancellation settings: {0}")]
    InvalidCancellationSettings(String),

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
