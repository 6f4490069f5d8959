//! CSV reading/writing operations.

use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression as Flate2Compression};
use polars::{
    frame::DataFrame,
    io::{SerReader, SerWriter},
    prelude::{CsvReader, CsvWriter},
};

/// Read a CSV file into a DataFrame.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv] Failed to open CSV file: {}", path.display()))?;
    CsvReader::new(file)
        .finish()
        .with_context(|| format!("[io::csv] Failed to read CSV from {:?}", path))
}

/// Write a DataFrame to a CSV file.
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("[io::csv] Failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(file)
        .finish(df)
        .with_context(|| format!("[io::csv] Failed to write CSV to {:?}", path))
}

/// Write a DataFrame to a gzip-compressed CSV file.
pub(crate) fn write_csv_gz(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .finish(df)
        .context("[io::csv] Failed to write CSV to bytes")?;

    let file = File::create(path)
        .with_context(|| format!("[io::csv] Failed to create file: {}", path.display()))?;
    let mut encoder = GzEncoder::new(file, Flate2Compression::default());
    encoder.write_all(&buffer)?;
    encoder
        .finish()
        .with_context(|| format!("[io::csv] Failed to finish gzip stream: {}", path.display()))?;
    Ok(())
}
