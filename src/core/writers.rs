//! CSV writers for stop tables.
//!
//! Two write modes are supported:
//! - create: truncate the file and write the header followed by all rows
//! - append: add rows to the end of an existing file without a header
//!
//! Missing cells are written as empty fields.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::table::Table;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to open file '{path}': {source}")]
    OpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Serialize a table to any writer, optionally preceded by its header.
pub fn write_table<W: Write>(writer: W, table: &Table, include_header: bool) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    if include_header {
        csv_writer.write_record(table.headers())?;
    }

    for row in table.rows() {
        csv_writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn write_to_file(path: &Path, file: File, table: &Table, include_header: bool) -> Result<()> {
    let path_str = path.display().to_string();
    let mut buf_writer = BufWriter::new(file);

    write_table(&mut buf_writer, table, include_header).map_err(|e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    })?;

    buf_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a table to CSV, replacing any existing file.
///
/// Parent directories are created if needed.
///
/// # Example
///
/// ```no_run
/// use stop_ambiguity::core::table::{headers, row, Table};
/// use stop_ambiguity::core::writers::write_table_csv;
/// use std::path::Path;
///
/// let table = Table::from_rows(headers(&["driver_id", "driver_race"]), vec![row(&["0", "White"])]).unwrap();
/// write_table_csv(Path::new("csv/out.csv"), &table).unwrap();
/// ```
pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::OpenFile {
        path: path.display().to_string(),
        source: e,
    })?;
    write_to_file(path, file, table, true)
}

/// Append a table's rows to an existing CSV without repeating the header.
pub fn append_table_csv(path: &Path, table: &Table) -> Result<()> {
    ensure_parent_dirs(path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| WriteError::OpenFile {
            path: path.display().to_string(),
            source: e,
        })?;
    write_to_file(path, file, table, false)
}
