use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lower bound for a plausible body weight in kilograms
pub const WEIGHT_MIN_KG: f64 = 10.0;
/// Upper bound for a plausible body weight in kilograms
pub const WEIGHT_MAX_KG: f64 = 300.0;
/// Lower bound for body-fat percentage
pub const BODY_FAT_MIN_PCT: f64 = 0.0;
/// Upper bound for body-fat percentage
pub const BODY_FAT_MAX_PCT: f64 = 100.0;

/// Setting key for the target weight (kg)
pub const TARGET_WEIGHT_KEY: &str = "target_weight";
/// Setting key for the user's height (cm)
pub const HEIGHT_KEY: &str = "height";
pub const DEFAULT_TARGET_WEIGHT: f64 = 70.0;
pub const DEFAULT_HEIGHT_CM: f64 = 170.0;

/// One dated weight observation as stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Surrogate key, stable across re-inserts for the same date
    pub id: i64,

    /// Calendar date of the measurement (unique)
    pub date: NaiveDate,

    /// Body weight in kilograms
    pub weight: f64,

    /// Body-fat percentage, if recorded
    pub body_fat: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Measurement {
    /// True if the measurement falls on a Saturday or Sunday
    pub fn is_weekend(&self) -> bool {
        is_weekend(self.date)
    }
}

/// A candidate measurement that has not been persisted yet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    pub date: NaiveDate,
    pub weight: f64,
    pub body_fat: Option<f64>,
}

impl MeasurementInput {
    pub fn new(date: NaiveDate, weight: f64, body_fat: Option<f64>) -> Self {
        Self {
            date,
            weight,
            body_fat,
        }
    }

    /// Check the value ranges and reject dates after `today`
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        validate_weight(self.weight)?;
        if let Some(body_fat) = self.body_fat {
            validate_body_fat(body_fat)?;
        }
        if self.date > today {
            return Err(ValidationError::FutureDate { date: self.date });
        }
        Ok(())
    }
}

/// Named numeric setting (target weight, height, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Weight must be a finite number within the plausible human range
pub fn validate_weight(weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() || !(WEIGHT_MIN_KG..=WEIGHT_MAX_KG).contains(&weight) {
        return Err(ValidationError::WeightOutOfRange {
            value: weight,
            min: WEIGHT_MIN_KG,
            max: WEIGHT_MAX_KG,
        });
    }
    Ok(())
}

pub fn validate_body_fat(body_fat: f64) -> Result<(), ValidationError> {
    if !body_fat.is_finite() || !(BODY_FAT_MIN_PCT..=BODY_FAT_MAX_PCT).contains(&body_fat) {
        return Err(ValidationError::BodyFatOutOfRange {
            value: body_fat,
            min: BODY_FAT_MIN_PCT,
            max: BODY_FAT_MAX_PCT,
        });
    }
    Ok(())
}

/// Parse a date string in one of the accepted layouts.
///
/// Plain dates (`2024-01-31`, `2024/01/31`) are tried first, then datetimes
/// whose date part is kept (spreadsheets like to append `00:00:00`).
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
    {
        return Err(ValidationError::EmptyDate);
    }

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    for format in &DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    for format in &DATETIME_FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        // keep the calendar date as written, not its UTC equivalent
        return Ok(dt.naive_local().date());
    }

    Err(ValidationError::UnparseableDate {
        value: trimmed.to_string(),
    })
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_input_validation_ranges() {
        let today = date(2024, 6, 1);

        assert!(MeasurementInput::new(today, 70.0, Some(18.0)).validate(today).is_ok());
        assert!(MeasurementInput::new(today, 10.0, Some(0.0)).validate(today).is_ok());
        assert!(MeasurementInput::new(today, 300.0, Some(100.0)).validate(today).is_ok());

        assert!(matches!(
            MeasurementInput::new(today, 9.9, None).validate(today),
            Err(ValidationError::WeightOutOfRange { .. })
        ));
        assert!(matches!(
            MeasurementInput::new(today, f64::NAN, None).validate(today),
            Err(ValidationError::WeightOutOfRange { .. })
        ));
        assert!(matches!(
            MeasurementInput::new(today, 70.0, Some(100.5)).validate(today),
            Err(ValidationError::BodyFatOutOfRange { .. })
        ));
    }

    #[test]
    fn test_future_date_rejected() {
        let today = date(2024, 6, 1);
        let input = MeasurementInput::new(date(2024, 6, 2), 70.0, None);
        assert_eq!(
            input.validate(today),
            Err(ValidationError::FutureDate { date: date(2024, 6, 2) })
        );
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-01-31").unwrap(), date(2024, 1, 31));
        assert_eq!(parse_date(" 2024/01/31 ").unwrap(), date(2024, 1, 31));
        assert_eq!(parse_date("2024-01-31 07:15:00").unwrap(), date(2024, 1, 31));
        assert_eq!(parse_date("2024-01-31T07:15:00+09:00").unwrap(), date(2024, 1, 31));

        assert_eq!(parse_date(""), Err(ValidationError::EmptyDate));
        assert_eq!(parse_date("NaN"), Err(ValidationError::EmptyDate));
        assert!(matches!(
            parse_date("31st of January"),
            Err(ValidationError::UnparseableDate { .. })
        ));
        assert!(matches!(
            parse_date("2024-02-30"),
            Err(ValidationError::UnparseableDate { .. })
        ));
    }

    #[test]
    fn test_weekend_detection() {
        // 2024-01-06 is a Saturday
        assert!(is_weekend(date(2024, 1, 6)));
        assert!(is_weekend(date(2024, 1, 7)));
        assert!(!is_weekend(date(2024, 1, 8)));
    }
}
