// Library interface for WeightRS
// The CLI binary and the integration tests both go through these modules

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod models;
pub mod stats;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use database::{Database, DatabaseStats};
pub use error::{DatabaseError, ImportExportError, Result, ValidationError, WeightRsError};
pub use export::ExportFormat;
pub use import::{DuplicatePolicy, ImportEngine, ImportPreview, ImportReport, ImportRow, RowError};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use stats::{GoalProgress, MovingAveragePoint, StatsCalculator, StatsSummary, Trend};
pub use validation::{
    CheckCategory, MeasurementValidator, Severity, ValidationConfig, ValidationFinding,
    ValidationReport,
};
