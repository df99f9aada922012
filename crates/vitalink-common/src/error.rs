//! Error types for Vitalink

use thiserror::Error;

/// Result type alias for Vitalink operations
pub type Result<T> = std::result::Result<T, VitalinkError>;

/// Main error type for Vitalink
#[derive(Error, Debug)]
pub enum VitalinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid report type: '{0}'. Expected blood, genetic or combined")]
    InvalidReportType(String),

    #[error("Invalid processing status: '{0}'")]
    InvalidStatus(String),
}
