use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::database::Database;
use crate::error::{DatabaseError, ValidationError};
use crate::models::{parse_date, validate_body_fat, validate_weight, MeasurementInput};

pub mod csv;

/// How to treat a row whose date already has a stored measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the stored record and count the row as skipped
    #[default]
    Skip,
    /// Replace the stored values (the record keeps its id)
    Overwrite,
}

/// A raw row as read from an external table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    /// 1-based line number in the source file (header is line 1)
    pub line: usize,
    pub date: String,
    pub weight: String,
    pub body_fat: Option<String>,
}

impl ImportRow {
    pub fn new(
        line: usize,
        date: impl Into<String>,
        weight: impl Into<String>,
        body_fat: Option<&str>,
    ) -> Self {
        Self {
            line,
            date: date.into(),
            weight: weight.into(),
            body_fat: body_fat.map(str::to_string),
        }
    }

    /// Parse and range-check the row
    pub fn validate(&self) -> Result<MeasurementInput, ValidationError> {
        let date = parse_date(&self.date)?;

        let weight = parse_number("weight", &self.weight)?;
        validate_weight(weight)?;

        let body_fat = match self.body_fat.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) if value.eq_ignore_ascii_case("nan") => None,
            Some(value) => {
                let body_fat = parse_number("body_fat", value)?;
                validate_body_fat(body_fat)?;
                Some(body_fat)
            }
        };

        Ok(MeasurementInput::new(date, weight, body_fat))
    }
}

fn parse_number(field: &str, value: &str) -> Result<f64, ValidationError> {
    let trimmed = value.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::UnparseableNumber {
            field: field.to_string(),
            value: trimmed.to_string(),
        })
}

/// Why a row was not imported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

/// Outcome counts of an import; they always add up to the number of rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    /// Number of rows accounted for
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.failed
    }

    fn fail(&mut self, line: usize, reason: impl Into<String>) {
        self.failed += 1;
        self.errors.push(RowError {
            line,
            reason: reason.into(),
        });
    }
}

/// Result of validating a batch without writing it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportPreview {
    /// Rows that passed validation, in input order
    pub valid: Vec<(usize, MeasurementInput)>,
    pub errors: Vec<RowError>,
    /// Dates of valid rows that are already stored or repeat an earlier row
    pub duplicate_dates: BTreeSet<NaiveDate>,
    /// Valid rows that `import_batch` would treat as duplicates
    pub duplicate_rows: usize,
}

/// Validates external rows and writes them to a [`Database`]
pub struct ImportEngine<'a> {
    db: &'a Database,
    show_progress: bool,
}

impl<'a> ImportEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            show_progress: false,
        }
    }

    /// Draw a terminal progress bar while importing
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Validate every row and find duplicates without touching the store
    pub fn preview(&self, rows: &[ImportRow]) -> Result<ImportPreview, DatabaseError> {
        let mut seen = self.db.existing_dates()?;
        let mut preview = ImportPreview::default();

        for row in rows {
            match row.validate() {
                Ok(input) => {
                    // Same rule as import_batch: earlier rows count as stored
                    if !seen.insert(input.date) {
                        preview.duplicate_dates.insert(input.date);
                        preview.duplicate_rows += 1;
                    }
                    preview.valid.push((row.line, input));
                }
                Err(e) => preview.errors.push(RowError {
                    line: row.line,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(preview)
    }

    /// Import `rows`, applying `policy` to dates that are already stored.
    ///
    /// Rows are written one at a time; a bad row is counted as failed and the
    /// batch carries on. Earlier rows of the same batch count as stored, so a
    /// repeated date within the file is also a duplicate. Only a failure to
    /// read the current dates up front aborts the call.
    pub fn import_batch(
        &self,
        rows: &[ImportRow],
        policy: DuplicatePolicy,
    ) -> Result<ImportReport, DatabaseError> {
        let mut existing = self.db.existing_dates()?;
        let mut report = ImportReport::default();
        let progress = self.progress_bar(rows.len());

        for row in rows {
            progress.inc(1);

            let input = match row.validate() {
                Ok(input) => input,
                Err(e) => {
                    warn!(line = row.line, error = %e, "Import row rejected");
                    report.fail(row.line, e.to_string());
                    continue;
                }
            };

            let duplicate = existing.contains(&input.date);
            if duplicate && policy == DuplicatePolicy::Skip {
                report.skipped += 1;
                continue;
            }

            match self.db.upsert(input.date, input.weight, input.body_fat) {
                Ok(_) => {
                    existing.insert(input.date);
                    if duplicate {
                        report.updated += 1;
                    } else {
                        report.inserted += 1;
                    }
                }
                Err(e) => {
                    warn!(line = row.line, error = %e, "Import row could not be stored");
                    report.fail(row.line, format!("storage error: {}", e));
                }
            }
        }

        progress.finish_and_clear();
        info!(
            rows = rows.len(),
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            ?policy,
            "Import finished"
        );

        Ok(report)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
