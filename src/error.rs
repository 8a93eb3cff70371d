//! Unified error hierarchy for cyclecast
//!
//! Only a handful of conditions ever reach a caller: a phase lookup without
//! any history, invalid user-supplied dates, and failures of the log store
//! itself. Malformed stored records never surface as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all cyclecast operations
#[derive(Debug, Error)]
pub enum CycleError {
    /// No parseable cycle history exists for the user
    #[error("No period data available for user {user_id}")]
    NoData { user_id: String },

    /// A caller-supplied date could not be parsed
    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// A caller-supplied date range is inconsistent
    #[error("Invalid date range: {reason}")]
    InvalidRange { reason: String },

    /// An end date was logged for a start date that does not exist
    #[error("No period starting {start_date} found for user {user_id}")]
    EventNotFound { user_id: String, start_date: String },

    /// Log store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Import/export errors
    #[error("Import/Export error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Period log store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An event with the same (user, start date) key already exists
    #[error("Duplicate entry: {user_id} already has a period starting {start_date}")]
    Duplicate { user_id: String, start_date: String },

    /// Store is unreachable or refused the operation
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Import and export errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// Unsupported format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// CSV reader/writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing required column
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Export failed
    #[error("Export failed to {path}: {reason}")]
    ExportFailed { path: PathBuf, reason: String },
}

/// Result type alias for cyclecast operations
pub type Result<T> = std::result::Result<T, CycleError>;

impl CycleError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CycleError::Store(StoreError::Unavailable { .. }) | CycleError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CycleError::NoData { .. } => ErrorSeverity::Info,
            CycleError::InvalidDate { .. } | CycleError::InvalidRange { .. } => {
                ErrorSeverity::Warning
            }
            CycleError::EventNotFound { .. } => ErrorSeverity::Warning,
            CycleError::Store(StoreError::Duplicate { .. }) => ErrorSeverity::Warning,
            CycleError::Store(_) => ErrorSeverity::Error,
            CycleError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CycleError::NoData { .. } => {
                "No period data yet. Log a period start first, e.g. `cyclecast log-start 2024-03-01`."
                    .to_string()
            }
            CycleError::InvalidDate { value } => {
                format!("'{}' is not a valid date. Use the YYYY-MM-DD format.", value)
            }
            CycleError::Store(StoreError::Duplicate { start_date, .. }) => {
                format!("A period starting {} is already logged.", start_date)
            }
            CycleError::Store(StoreError::Unavailable { .. }) => {
                "Unable to reach the period log. Please check your configuration.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the operation
    Error,
    /// Rejected input that doesn't affect stored data
    Warning,
    /// Expected condition worth reporting
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
