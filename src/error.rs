//! Error types for WMI table handling

use std::io;
use thiserror::Error;

use crate::value_store::GetRateError;

/// Result type alias for table and counter operations
pub type Result<T> = std::result::Result<T, WmiError>;

/// Main error type for wmi-perf
#[derive(Error, Debug)]
pub enum WmiError {
    /// The key field given at table construction is not a header
    #[error("Key field {field:?} missing, valid keys: {valid}")]
    KeyFieldNotFound { field: String, valid: String },

    /// Unknown row key or row index
    #[error("Row {row} missing, valid keys: {valid}")]
    RowNotFound { row: String, valid: String },

    /// Unknown column name or column index
    #[error("Column {column:?} missing, valid keys: {valid}")]
    ColumnNotFound { column: String, valid: String },

    /// The agent reported a WMI timeout for this table
    #[error("WMI query timed out (table {table:?})")]
    Timeout { table: String },

    /// Counter or base cell absent this cycle
    #[error("Counter not present: {column}")]
    MissingCounter { column: String },

    /// Cell is not a number
    #[error("Invalid number in column {column}: {value:?}")]
    InvalidNumber { column: String, value: String },

    /// Rate computation failed (first sample, no time passed, overflow)
    #[error("Rate error: {0}")]
    Rate(#[from] GetRateError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl WmiError {
    /// Whether this error only means "no data for this item this cycle"
    ///
    /// Check helpers translate these into an empty result instead of failing.
    pub fn is_missing_data(&self) -> bool {
        matches!(
            self,
            Self::RowNotFound { .. } | Self::ColumnNotFound { .. } | Self::MissingCounter { .. }
        )
    }
}
