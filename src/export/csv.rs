use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::ImportExportError;
use crate::models::Measurement;

/// One exported row; field order defines the header
#[derive(Debug, Serialize)]
struct MeasurementRecord {
    id: i64,
    date: NaiveDate,
    weight: f64,
    body_fat: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Measurement> for MeasurementRecord {
    fn from(m: &Measurement) -> Self {
        Self {
            id: m.id,
            date: m.date,
            weight: m.weight,
            body_fat: m.body_fat,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Export measurements as CSV with columns
/// `id,date,weight,body_fat,created_at,updated_at`.
///
/// Rows are written in the order given; callers pass the full history
/// ascending by date. An empty slice still produces the header.
pub fn export_measurements<W: Write>(
    measurements: &[Measurement],
    writer: W,
) -> Result<usize, ImportExportError> {
    let mut csv_writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(["id", "date", "weight", "body_fat", "created_at", "updated_at"])?;
    for measurement in measurements {
        csv_writer.serialize(MeasurementRecord::from(measurement))?;
    }
    csv_writer.flush()?;

    Ok(measurements.len())
}

/// Export measurements to a CSV file, replacing it if present
pub fn export_to_path<P: AsRef<Path>>(
    measurements: &[Measurement],
    output_path: P,
) -> Result<usize, ImportExportError> {
    let file = File::create(output_path)?;
    export_measurements(measurements, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement(id: i64, day: u32, weight: f64, body_fat: Option<f64>) -> Measurement {
        let ts = Utc.with_ymd_and_hms(2024, 1, day, 7, 30, 0).unwrap();
        Measurement {
            id,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            weight,
            body_fat,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let data = vec![
            measurement(2, 1, 70.0, Some(18.0)),
            measurement(1, 2, 69.5, None),
        ];
        let mut buffer = Vec::new();
        let written = export_measurements(&data, &mut buffer).unwrap();
        assert_eq!(written, 2);

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "id,date,weight,body_fat,created_at,updated_at");
        assert!(lines[1].starts_with("2,2024-01-01,70.0,18.0,2024-01-01T07:30:00"));
        assert!(lines[2].starts_with("1,2024-01-02,69.5,,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_export_has_header() {
        let mut buffer = Vec::new();
        export_measurements(&[], &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap().trim_end(),
            "id,date,weight,body_fat,created_at,updated_at"
        );
    }

    #[test]
    fn test_export_can_be_reimported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("weights.csv");
        export_to_path(&[measurement(1, 5, 71.2, Some(20.1))], &path).unwrap();

        let rows = crate::import::csv::read_csv_file(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-05");
        assert_eq!(rows[0].weight, "71.2");
        assert_eq!(rows[0].body_fat.as_deref(), Some("20.1"));
    }
}
