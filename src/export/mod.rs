use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::ImportExportError;
use crate::models::Measurement;

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ImportExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ImportExportError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// `weight_data_YYYYMMDD.<ext>` for the given day
pub fn default_export_filename(date: NaiveDate, format: ExportFormat) -> String {
    format!("weight_data_{}.{}", date.format("%Y%m%d"), format.extension())
}

/// Write `measurements` to `output_path` in the requested format
pub fn export_to_path<P: AsRef<Path>>(
    measurements: &[Measurement],
    output_path: P,
    format: ExportFormat,
) -> Result<usize, ImportExportError> {
    let output_path = output_path.as_ref();
    let written = match format {
        ExportFormat::Csv => csv::export_to_path(measurements, output_path)?,
        ExportFormat::Json => json::export_to_path(measurements, output_path)?,
    };

    tracing::info!(
        records = written,
        path = %output_path.display(),
        %format,
        "Export finished"
    );
    Ok(written)
}
