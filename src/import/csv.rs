use csv::{ByteRecord, ReaderBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::ImportRow;
use crate::error::ImportExportError;

const DATE: &str = "date";
const WEIGHT: &str = "weight";
const BODY_FAT: &str = "body_fat";

/// CSV reader with flexible column naming
pub struct CsvImporter {
    column_mapping: HashMap<String, &'static str>,
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        // Common column name variations
        Self::add_mapping(&mut column_mapping, DATE, &["date", "day", "measured_on"]);
        Self::add_mapping(
            &mut column_mapping,
            WEIGHT,
            &["weight", "weight_kg", "kg", "body_weight"],
        );
        Self::add_mapping(
            &mut column_mapping,
            BODY_FAT,
            &["body_fat", "bodyfat", "fat", "body_fat_pct", "body_fat_percent", "fat_pct"],
        );

        Self { column_mapping }
    }

    fn add_mapping(
        mapping: &mut HashMap<String, &'static str>,
        standard: &'static str,
        variations: &[&str],
    ) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard);
        }
    }

    fn normalize_column_name(&self, name: &str) -> Option<&'static str> {
        let normalized = name
            .trim()
            .trim_start_matches('\u{feff}')
            .to_lowercase()
            .replace([' ', '-'], "_");

        self.column_mapping.get(&normalized).copied()
    }

    /// Read rows from a CSV file on disk
    pub fn read_file(&self, path: &Path) -> Result<Vec<ImportRow>, ImportExportError> {
        let file = File::open(path)?;
        self.read(file)
    }

    /// Read rows from any CSV source.
    ///
    /// The header must provide `date` and `weight` (or an alias); other
    /// columns are ignored and never decoded. Cell contents are passed
    /// through untouched so that validation can report them per row. A
    /// mapped cell that is not valid UTF-8 is decoded lossily, which makes
    /// that row fail validation without aborting the read.
    pub fn read<R: Read>(&self, source: R) -> Result<Vec<ImportRow>, ImportExportError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|header| String::from_utf8_lossy(header).into_owned())
            .collect();
        let columns = self.map_columns(&headers)?;

        let mut rows = Vec::new();
        for (index, result) in reader.byte_records().enumerate() {
            let record = result?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }

            // Line 1 is the header
            let line = record.position().map(|p| p.line() as usize).unwrap_or(index + 2);
            let cell = |column: usize| decode_cell(&record, column, line);
            rows.push(ImportRow {
                line,
                date: cell(columns.date).unwrap_or_default(),
                weight: cell(columns.weight).unwrap_or_default(),
                body_fat: columns.body_fat.and_then(&cell),
            });
        }

        Ok(rows)
    }

    fn map_columns(&self, headers: &[String]) -> Result<ColumnIndexes, ImportExportError> {
        let mut date = None;
        let mut weight = None;
        let mut body_fat = None;

        for (i, header) in headers.iter().enumerate() {
            // First matching column wins
            match self.normalize_column_name(header) {
                Some(DATE) if date.is_none() => date = Some(i),
                Some(WEIGHT) if weight.is_none() => weight = Some(i),
                Some(BODY_FAT) if body_fat.is_none() => body_fat = Some(i),
                _ => {}
            }
        }

        match (date, weight) {
            (Some(date), Some(weight)) => Ok(ColumnIndexes {
                date,
                weight,
                body_fat,
            }),
            _ => {
                let mut missing = Vec::new();
                if date.is_none() {
                    missing.push(DATE.to_string());
                }
                if weight.is_none() {
                    missing.push(WEIGHT.to_string());
                }
                Err(ImportExportError::MissingColumns { missing })
            }
        }
    }
}

/// Read import rows from a CSV source using the default column aliases
pub fn read_csv<R: Read>(source: R) -> Result<Vec<ImportRow>, ImportExportError> {
    CsvImporter::new().read(source)
}

/// Read import rows from a CSV file
pub fn read_csv_file<P: AsRef<Path>>(path: P) -> Result<Vec<ImportRow>, ImportExportError> {
    CsvImporter::new().read_file(path.as_ref())
}

fn decode_cell(record: &ByteRecord, column: usize, line: usize) -> Option<String> {
    let bytes = record.get(column)?;
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        Err(_) => {
            warn!(line, column, "Cell is not valid UTF-8");
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

struct ColumnIndexes {
    date: usize,
    weight: usize,
    body_fat: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_standard_columns() {
        let data = "date,weight,body_fat\n2024-01-01,70.0,18.0\n2024-01-02,69.8,\n";
        let rows = CsvImporter::new().read(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ImportRow::new(2, "2024-01-01", "70.0", Some("18.0")));
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].body_fat.as_deref(), Some(""));
    }

    #[test]
    fn test_aliases_and_extra_columns() {
        let data = "Day,Note,Weight KG,Body-Fat\n2024-01-01,after run,70.2,17.9\n";
        let rows = CsvImporter::new().read(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-01");
        assert_eq!(rows[0].weight, "70.2");
        assert_eq!(rows[0].body_fat.as_deref(), Some("17.9"));
    }

    #[test]
    fn test_missing_body_fat_column() {
        let data = "date,weight\n2024-01-01,70\n";
        let rows = CsvImporter::new().read(data.as_bytes()).unwrap();
        assert_eq!(rows[0].body_fat, None);
    }

    #[test]
    fn test_missing_required_column() {
        let data = "date,body_fat\n2024-01-01,18\n";
        let err = CsvImporter::new().read(data.as_bytes()).unwrap_err();
        match err {
            ImportExportError::MissingColumns { missing } => assert_eq!(missing, vec!["weight"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_lines_skipped_and_short_rows_kept() {
        let data = "date,weight,body_fat\n2024-01-01,70\n,,\n2024-01-03,71,20\n";
        let rows = CsvImporter::new().read(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body_fat, None);
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn test_invalid_utf8_only_affects_mapped_cells() {
        let data: &[u8] =
            b"date,weight,note\n2024-01-01,70.0,ok\n2024-01-02,70.1,caf\xE9\n2024-01-03,7\xE90,x\n";
        let rows = CsvImporter::new().read(data).unwrap();

        assert_eq!(rows.len(), 3);
        // Unmapped column is never decoded
        assert_eq!(rows[1], ImportRow::new(3, "2024-01-02", "70.1", None));
        assert_eq!(rows[2].line, 4);
        assert!(rows[1].validate().is_ok());
        assert!(rows[2].validate().is_err());
    }
}
