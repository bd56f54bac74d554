//! Unified error hierarchy for WeightRS
//!
//! Storage failures, rejected input and import/export problems each get their
//! own enum; `WeightRsError` ties them together for callers that just want `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all WeightRS operations
#[derive(Debug, Error)]
pub enum WeightRsError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Rejected measurement input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Import/export errors
    #[error("Import/Export error: {0}")]
    ImportExport(#[from] ImportExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage failures
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file could not be opened or initialized
    #[error("Database connection failed for {path}: {reason}")]
    ConnectionFailed { path: PathBuf, reason: String },

    /// Record not found
    #[error("Record not found: {table}.{id}")]
    NotFound { table: String, id: String },
}

/// Domain validation failures for a single measurement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("weight must be between {min}kg and {max}kg, got {value}kg")]
    WeightOutOfRange { value: f64, min: f64, max: f64 },

    #[error("body fat must be between {min}% and {max}%, got {value}%")]
    BodyFatOutOfRange { value: f64, min: f64, max: f64 },

    #[error("date {date} is in the future")]
    FutureDate { date: chrono::NaiveDate },

    #[error("date is empty")]
    EmptyDate,

    #[error("unable to parse date: {value}")]
    UnparseableDate { value: String },

    #[error("unable to parse {field}: {value:?}")]
    UnparseableNumber { field: String, value: String },
}

/// CSV/JSON file problems
#[derive(Debug, Error)]
pub enum ImportExportError {
    /// CSV reader/writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required columns are absent from the header row
    #[error("Missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// Unsupported format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },
}

/// Result type alias for WeightRS operations
pub type Result<T> = std::result::Result<T, WeightRsError>;

impl WeightRsError {
    /// Whether trying again later might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeightRsError::Database(DatabaseError::ConnectionFailed { .. }) | WeightRsError::Io(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WeightRsError::Database(DatabaseError::NotFound { .. }) => ErrorSeverity::Warning,
            WeightRsError::Validation(_) => ErrorSeverity::Warning,
            WeightRsError::ImportExport(ImportExportError::MissingColumns { .. }) => {
                ErrorSeverity::Warning
            }
            WeightRsError::Database(_) => ErrorSeverity::Error,
            WeightRsError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Message for the terminal, without the error chain
    pub fn user_message(&self) -> String {
        match self {
            WeightRsError::Database(DatabaseError::ConnectionFailed { path, .. }) => {
                format!(
                    "Unable to open the weight database at {}. Please check the path and permissions.",
                    path.display()
                )
            }
            WeightRsError::Database(DatabaseError::NotFound { id, .. }) => {
                format!("No measurement with id {}", id)
            }
            WeightRsError::ImportExport(ImportExportError::MissingColumns { missing }) => {
                format!(
                    "The CSV file needs at least 'date' and 'weight' columns (missing: {})",
                    missing.join(", ")
                )
            }
            WeightRsError::Validation(err) => err.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Bug or broken invariant
    Critical,
    /// The operation failed
    Error,
    /// Bad input the user can fix
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = WeightRsError::Validation(ValidationError::EmptyDate);
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = WeightRsError::Internal("test".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_error_retryable() {
        let err = WeightRsError::Database(DatabaseError::ConnectionFailed {
            path: PathBuf::from("data.db"),
            reason: "locked".to_string(),
        });
        assert!(err.is_retryable());

        let err = WeightRsError::Configuration("bad".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = WeightRsError::ImportExport(ImportExportError::MissingColumns {
            missing: vec!["weight".to_string()],
        });
        assert!(err.user_message().contains("'date' and 'weight'"));
        assert!(err.user_message().contains("missing: weight"));

        let err = WeightRsError::Validation(ValidationError::WeightOutOfRange {
            value: 5.0,
            min: 10.0,
            max: 300.0,
        });
        assert!(err.user_message().contains("between 10kg and 300kg"));
    }
}
