use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ImportExportError;
use crate::models::Measurement;

/// Export measurements as a pretty-printed JSON array
pub fn export_measurements<W: Write>(
    measurements: &[Measurement],
    writer: W,
) -> Result<usize, ImportExportError> {
    serde_json::to_writer_pretty(writer, measurements)?;
    Ok(measurements.len())
}

/// Export measurements to a JSON file
pub fn export_to_path<P: AsRef<Path>>(
    measurements: &[Measurement],
    output_path: P,
) -> Result<usize, ImportExportError> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    let written = export_measurements(measurements, &mut writer)?;
    writer.flush()?;
    Ok(written)
}
