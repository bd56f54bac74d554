//! Advisory screening of a candidate measurement against recent history
//!
//! Four independent checks run for every candidate: day-over-day change,
//! statistical outlier, trend consistency and measurement conditions. None of
//! them blocks persistence; the caller decides what to do with the findings.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

use crate::database::Database;
use crate::error::DatabaseError;
use crate::models::{is_weekend, Measurement, MeasurementInput};

/// Finding severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, nothing suspicious
    Info,
    /// Suspicious, worth a second look
    Warning,
    /// Very likely a wrong entry
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// One advisory message about a candidate measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationFinding {
    fn new(severity: Severity, message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Which check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    ChangeAnalysis,
    StatisticalOutlier,
    TrendConsistency,
    MeasurementConditions,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 4] = [
        CheckCategory::ChangeAnalysis,
        CheckCategory::StatisticalOutlier,
        CheckCategory::TrendConsistency,
        CheckCategory::MeasurementConditions,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CheckCategory::ChangeAnalysis => "change analysis",
            CheckCategory::StatisticalOutlier => "statistical analysis",
            CheckCategory::TrendConsistency => "trend analysis",
            CheckCategory::MeasurementConditions => "measurement conditions",
        }
    }
}

/// Counts per severity across a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub info: usize,
    pub warning: usize,
    pub error: usize,
}

/// Findings for one candidate, grouped by check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: BTreeMap<CheckCategory, Vec<ValidationFinding>>,
}

impl ValidationReport {
    /// Findings of one check (empty if it produced none)
    pub fn category(&self, category: CheckCategory) -> &[ValidationFinding] {
        self.results
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All findings, in check order
    pub fn findings(&self) -> impl Iterator<Item = (CheckCategory, &ValidationFinding)> {
        self.results
            .iter()
            .flat_map(|(category, findings)| findings.iter().map(move |f| (*category, f)))
    }

    pub fn summary(&self) -> ValidationSummary {
        let mut summary = ValidationSummary::default();
        for (_, finding) in self.findings() {
            summary.total += 1;
            match finding.severity {
                Severity::Info => summary.info += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Error => summary.error += 1,
            }
        }
        summary
    }

    pub fn has_errors(&self) -> bool {
        self.findings().any(|(_, f)| f.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.results.values().all(Vec::is_empty)
    }
}

/// Thresholds for the validation checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Records considered by the day-over-day check
    pub change_window: usize,
    /// Warn above this many kg per day
    pub max_daily_rate_kg: f64,
    /// Error above this many kg between consecutive records
    pub max_change_kg: f64,
    /// Warn when the previous record is older than this
    pub max_gap_days: i64,
    /// Warn above this many body-fat percentage points
    pub max_body_fat_change_pct: f64,

    pub outlier_window: usize,
    pub outlier_min_records: usize,
    pub z_score_threshold: f64,
    /// Width of the reported normal range, in standard deviations
    pub normal_range_sigma: f64,

    pub trend_window: usize,
    pub trend_min_records: usize,
    pub trend_tolerance_kg: f64,

    /// Measurements taken before this hour are flagged
    pub early_hour: u32,
    /// Measurements taken after this hour are flagged
    pub late_hour: u32,
    pub weekend_window: usize,
    pub min_weekend_records: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            change_window: 7,
            max_daily_rate_kg: 1.0,
            max_change_kg: 5.0,
            max_gap_days: 7,
            max_body_fat_change_pct: 5.0,
            outlier_window: 30,
            outlier_min_records: 7,
            z_score_threshold: 2.5,
            normal_range_sigma: 2.0,
            trend_window: 14,
            trend_min_records: 7,
            trend_tolerance_kg: 0.5,
            early_hour: 6,
            late_hour: 22,
            weekend_window: 30,
            min_weekend_records: 2,
        }
    }
}

/// Screens candidate measurements against the history in a [`Database`]
pub struct MeasurementValidator<'a> {
    db: &'a Database,
    config: ValidationConfig,
}

impl<'a> MeasurementValidator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_config(db, ValidationConfig::default())
    }

    pub fn with_config(db: &'a Database, config: ValidationConfig) -> Self {
        Self { db, config }
    }

    /// Run every check using the current local time
    pub fn validate(&self, input: &MeasurementInput) -> Result<ValidationReport, DatabaseError> {
        self.validate_at(input, Local::now().naive_local())
    }

    /// Run every check as if the local time were `now`
    pub fn validate_at(
        &self,
        input: &MeasurementInput,
        now: NaiveDateTime,
    ) -> Result<ValidationReport, DatabaseError> {
        let history = self.history(input)?;
        Ok(evaluate(&self.config, input, &history, now))
    }

    /// The most recent records, excluding any record on the candidate's own date
    fn history(&self, input: &MeasurementInput) -> Result<Vec<Measurement>, DatabaseError> {
        let depth = [
            self.config.change_window,
            self.config.outlier_window,
            self.config.trend_window,
            self.config.weekend_window,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        // One extra row in case the candidate's date is already stored
        let mut history = self.db.get_recent(Some(depth + 1))?;
        history.retain(|m| m.date != input.date);
        if history.len() > depth {
            history.remove(0);
        }
        Ok(history)
    }
}

/// Run all checks against an already-loaded history (oldest first)
pub fn evaluate(
    config: &ValidationConfig,
    input: &MeasurementInput,
    history: &[Measurement],
    now: NaiveDateTime,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    report.results.insert(
        CheckCategory::ChangeAnalysis,
        check_change(config, input, tail(history, config.change_window)),
    );
    report.results.insert(
        CheckCategory::StatisticalOutlier,
        check_outlier(config, input, tail(history, config.outlier_window)),
    );
    report.results.insert(
        CheckCategory::TrendConsistency,
        check_trend(config, input, tail(history, config.trend_window)),
    );
    report.results.insert(
        CheckCategory::MeasurementConditions,
        check_conditions(config, input, tail(history, config.weekend_window), now),
    );

    let summary = report.summary();
    debug!(
        date = %input.date,
        weight = input.weight,
        info = summary.info,
        warning = summary.warning,
        error = summary.error,
        "Measurement screened"
    );
    report
}

fn tail(history: &[Measurement], n: usize) -> &[Measurement] {
    &history[history.len().saturating_sub(n)..]
}

/// Compare against the latest record in the window
pub fn check_change(
    config: &ValidationConfig,
    input: &MeasurementInput,
    window: &[Measurement],
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    let Some(prior) = window.last() else {
        findings.push(ValidationFinding::new(
            Severity::Info,
            "This is your first record. Keep recording regularly.",
            "Weighing at the same time every day makes changes easier to read",
        ));
        return findings;
    };

    let days_gap = (input.date - prior.date).num_days();
    if days_gap > config.max_gap_days {
        findings.push(ValidationFinding::new(
            Severity::Warning,
            format!("{} days have passed since the previous record.", days_gap),
            "Regular records give a more accurate picture of change",
        ));
    }

    let diff = input.weight - prior.weight;
    let daily_rate = diff / days_gap.max(1) as f64;

    if diff.abs() > config.max_change_kg {
        findings.push(ValidationFinding::new(
            Severity::Error,
            format!("Weight changed by {:+.1}kg. Please double-check the value.", diff),
            "Check the measurement conditions (time of day, clothing, meals before weighing)",
        ));
    } else if daily_rate.abs() > config.max_daily_rate_kg {
        findings.push(ValidationFinding::new(
            Severity::Warning,
            format!(
                "Weight changed by {:+.1}kg ({:+.1}kg per day).",
                diff, daily_rate
            ),
            "For large changes, check the measurement conditions",
        ));
    }

    if let (Some(body_fat), Some(prior_body_fat)) = (input.body_fat, prior.body_fat) {
        let body_fat_diff = body_fat - prior_body_fat;
        if body_fat_diff.abs() > config.max_body_fat_change_pct {
            findings.push(ValidationFinding::new(
                Severity::Warning,
                format!("Body fat changed by {:+.1}%.", body_fat_diff),
                "Body fat readings vary a lot during the day; measure at the same time",
            ));
        }
    }

    findings
}

/// Z-score of the candidate against the window's mean and sample std-dev
pub fn check_outlier(
    config: &ValidationConfig,
    input: &MeasurementInput,
    window: &[Measurement],
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    if window.len() < config.outlier_min_records {
        return findings;
    }

    let weights: Vec<f64> = window.iter().map(|m| m.weight).collect();
    if let Some((mean, std_dev)) = outlier_stats(config, input.weight, &weights) {
        findings.push(ValidationFinding::new(
            Severity::Warning,
            format!(
                "{:.1}kg is far from your recent average of {:.1}kg.",
                input.weight, mean
            ),
            format!(
                "Normal range: {:.1}kg - {:.1}kg",
                mean - config.normal_range_sigma * std_dev,
                mean + config.normal_range_sigma * std_dev
            ),
        ));
    }

    if let Some(body_fat) = input.body_fat {
        let body_fats: Vec<f64> = window.iter().filter_map(|m| m.body_fat).collect();
        if body_fats.len() >= config.outlier_min_records {
            if let Some((mean, std_dev)) = outlier_stats(config, body_fat, &body_fats) {
                findings.push(ValidationFinding::new(
                    Severity::Warning,
                    format!(
                        "Body fat {:.1}% is far from your recent average of {:.1}%.",
                        body_fat, mean
                    ),
                    format!(
                        "Normal range: {:.1}% - {:.1}%",
                        mean - config.normal_range_sigma * std_dev,
                        mean + config.normal_range_sigma * std_dev
                    ),
                ));
            }
        }
    }

    findings
}

/// `Some((mean, std_dev))` when `value` exceeds the z-score threshold
fn outlier_stats(config: &ValidationConfig, value: f64, sample: &[f64]) -> Option<(f64, f64)> {
    let mean = sample.iter().mean();
    let std_dev = sample.iter().std_dev();

    let z_score = if std_dev > 0.0 {
        (value - mean).abs() / std_dev
    } else {
        0.0
    };

    (z_score > config.z_score_threshold).then_some((mean, std_dev))
}

/// Flag a candidate that moves against the recent half-over-half trend
pub fn check_trend(
    config: &ValidationConfig,
    input: &MeasurementInput,
    window: &[Measurement],
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let Some(latest) = window.last() else {
        return findings;
    };
    if window.len() < config.trend_min_records {
        return findings;
    }

    let mid = window.len() / 2;
    let first_half = window[..mid].iter().map(|m| m.weight).mean();
    let second_half = window[mid..].iter().map(|m| m.weight).mean();
    let decreasing = second_half < first_half;

    if decreasing && input.weight > latest.weight + config.trend_tolerance_kg {
        findings.push(ValidationFinding::new(
            Severity::Info,
            format!(
                "Weight went up against the recent downward trend ({:.1}kg vs previous {:.1}kg).",
                input.weight, latest.weight
            ),
            "Weight fluctuates daily; judge by the trend",
        ));
    } else if !decreasing && input.weight < latest.weight - config.trend_tolerance_kg {
        findings.push(ValidationFinding::new(
            Severity::Info,
            format!(
                "Weight went down against the recent upward trend ({:.1}kg vs previous {:.1}kg).",
                input.weight, latest.weight
            ),
            "Weight fluctuates daily; judge by the trend",
        ));
    }

    findings
}

/// Time-of-day and weekend-consistency notes
pub fn check_conditions(
    config: &ValidationConfig,
    input: &MeasurementInput,
    window: &[Measurement],
    now: NaiveDateTime,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    if input.date == now.date() {
        let hour = now.hour();
        if hour < config.early_hour || hour > config.late_hour {
            findings.push(ValidationFinding::new(
                Severity::Info,
                "This is a late-night or early-morning measurement.",
                "Weighing right after getting up is the most consistent",
            ));
        }
    }

    // No note without history to compare against
    if is_weekend(input.date) && !window.is_empty() {
        let weekend_records = window.iter().filter(|m| m.is_weekend()).count();
        if weekend_records < config.min_weekend_records {
            findings.push(ValidationFinding::new(
                Severity::Info,
                "This is a weekend measurement.",
                "Weighing on weekends too gives a more accurate picture of change",
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate, NaiveTime, Utc};

    fn base_date() -> NaiveDate {
        // A Monday
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(offset: u64) -> NaiveDate {
        base_date() + Days::new(offset)
    }

    fn measurement(offset: u64, weight: f64, body_fat: Option<f64>) -> Measurement {
        Measurement {
            id: offset as i64 + 1,
            date: day(offset),
            weight,
            body_fat,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn noon(date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
    }

    #[test]
    fn test_first_record_is_informational() {
        let config = ValidationConfig::default();
        let input = MeasurementInput::new(day(0), 70.0, None);

        let findings = check_change(&config, &input, &[]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
    }

    #[test]
    fn test_large_change_is_error_not_warning() {
        let config = ValidationConfig::default();
        let history = vec![measurement(0, 70.0, None)];
        let input = MeasurementInput::new(day(1), 76.0, None);

        let findings = check_change(&config, &input, &history);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].message.contains("+6.0kg"));
    }

    #[test]
    fn test_daily_rate_warning() {
        let config = ValidationConfig::default();
        let history = vec![measurement(0, 70.0, None)];
        let input = MeasurementInput::new(day(2), 72.5, None);

        let findings = check_change(&config, &input, &history);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_gradual_change_is_clean() {
        let config = ValidationConfig::default();
        let history = vec![measurement(0, 70.0, None)];
        let input = MeasurementInput::new(day(5), 73.0, None);

        assert!(check_change(&config, &input, &history).is_empty());
    }

    #[test]
    fn test_gap_warning_and_body_fat_change() {
        let config = ValidationConfig::default();
        let history = vec![measurement(0, 70.0, Some(18.0))];
        let input = MeasurementInput::new(day(10), 70.5, Some(24.0));

        let findings = check_change(&config, &input, &history);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
        assert!(findings[0].message.contains("10 days"));
        assert!(findings[1].message.contains("Body fat"));
    }

    #[test]
    fn test_outlier_needs_minimum_history() {
        let config = ValidationConfig::default();
        let history: Vec<_> = (0..6).map(|d| measurement(d, 70.0 + d as f64, None)).collect();
        let input = MeasurementInput::new(day(7), 120.0, None);

        assert!(check_outlier(&config, &input, &history).is_empty());
    }

    #[test]
    fn test_outlier_detected_with_normal_range() {
        let config = ValidationConfig::default();
        // Alternating 68/72: mean 70, sample std-dev slightly above 2
        let history: Vec<_> = (0..30)
            .map(|d| measurement(d, if d % 2 == 0 { 68.0 } else { 72.0 }, None))
            .collect();
        let input = MeasurementInput::new(day(30), 90.0, None);

        let findings = check_outlier(&config, &input, &history);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        let suggestion = findings[0].suggestion.as_deref().unwrap();
        assert!(suggestion.contains("65.9kg - 74.1kg"));
    }

    #[test]
    fn test_zero_std_dev_never_flags() {
        let config = ValidationConfig::default();
        let history: Vec<_> = (0..10).map(|d| measurement(d, 70.0, None)).collect();
        let input = MeasurementInput::new(day(10), 75.0, None);

        assert!(check_outlier(&config, &input, &history).is_empty());
    }

    #[test]
    fn test_body_fat_outlier_requires_enough_values() {
        let config = ValidationConfig::default();
        let mut history: Vec<_> = (0..10)
            .map(|d| measurement(d, 70.0 + (d % 2) as f64, Some(20.0 + (d % 2) as f64)))
            .collect();
        let input = MeasurementInput::new(day(10), 70.5, Some(35.0));

        let findings = check_outlier(&config, &input, &history);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("Body fat"));

        for m in history.iter_mut().skip(4) {
            m.body_fat = None;
        }
        assert!(check_outlier(&config, &input, &history).is_empty());
    }

    #[test]
    fn test_trend_against_downward_trend() {
        let config = ValidationConfig::default();
        let history: Vec<_> = (0..14).map(|d| measurement(d, 80.0 - d as f64 * 0.3, None)).collect();
        let latest = history.last().unwrap().weight;

        let up = MeasurementInput::new(day(14), latest + 0.8, None);
        let findings = check_trend(&config, &up, &history);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert!(findings[0].message.contains("downward"));

        let small = MeasurementInput::new(day(14), latest + 0.4, None);
        assert!(check_trend(&config, &small, &history).is_empty());
    }

    #[test]
    fn test_trend_against_upward_trend() {
        let config = ValidationConfig::default();
        let history: Vec<_> = (0..9).map(|d| measurement(d, 70.0 + d as f64 * 0.2, None)).collect();
        let latest = history.last().unwrap().weight;

        let down = MeasurementInput::new(day(9), latest - 1.0, None);
        let findings = check_trend(&config, &down, &history);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("upward"));
    }

    #[test]
    fn test_trend_skipped_with_short_history() {
        let config = ValidationConfig::default();
        let history: Vec<_> = (0..6).map(|d| measurement(d, 80.0 - d as f64, None)).collect();
        let input = MeasurementInput::new(day(6), 90.0, None);

        assert!(check_trend(&config, &input, &history).is_empty());
    }

    #[test]
    fn test_late_night_measurement_today() {
        let config = ValidationConfig::default();
        let today = day(2); // Wednesday
        let input = MeasurementInput::new(today, 70.0, None);

        let late = today.and_time(NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        let findings = check_conditions(&config, &input, &[], late);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);

        assert!(check_conditions(&config, &input, &[], noon(today)).is_empty());
        // Past dates are never flagged for time of day
        assert!(check_conditions(&config, &input, &[], late + Days::new(1)).is_empty());
    }

    #[test]
    fn test_weekend_consistency_note() {
        let config = ValidationConfig::default();
        let saturday = day(5);
        let input = MeasurementInput::new(saturday, 70.0, None);

        let weekdays: Vec<_> = (0..5).map(|d| measurement(d, 70.0, None)).collect();
        let findings = check_conditions(&config, &input, &weekdays, noon(day(20)));
        assert_eq!(findings.len(), 1);

        let mut with_weekends = weekdays.clone();
        with_weekends.push(measurement(6, 70.0, None));
        with_weekends.push(measurement(12, 70.0, None));
        assert!(check_conditions(&config, &input, &with_weekends, noon(day(20))).is_empty());
    }

    #[test]
    fn test_weekend_note_needs_history() {
        let config = ValidationConfig::default();
        let sunday = day(6);
        let input = MeasurementInput::new(sunday, 70.0, None);

        assert!(check_conditions(&config, &input, &[], noon(day(20))).is_empty());
        let report = evaluate(&config, &input, &[], noon(day(20)));
        assert!(report.category(CheckCategory::MeasurementConditions).is_empty());
    }

    #[test]
    fn test_report_summary() {
        let config = ValidationConfig::default();
        let history = vec![measurement(0, 70.0, None)];
        let input = MeasurementInput::new(day(1), 76.0, None);

        let report = evaluate(&config, &input, &history, noon(day(30)));
        let summary = report.summary();
        assert_eq!(summary.error, 1);
        assert_eq!(summary.total, 1);
        assert!(report.has_errors());
        assert_eq!(report.category(CheckCategory::ChangeAnalysis).len(), 1);
        assert!(report.category(CheckCategory::TrendConsistency).is_empty());
    }
}
