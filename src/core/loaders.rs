//! CSV loaders for traffic-stop tables.
//!
//! Cells are read as strings. A cell is treated as missing when it matches
//! one of [`NA_TOKENS`] exactly, which mirrors the NA conventions of the
//! upstream open-policing exports.
//!
//! Sinks written by this crate encode a missing cell as an empty field only,
//! so they are read back with [`load_sink_csv`], which keeps values such as
//! `"NA"` intact.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use super::table::{Row, SchemaError, Table};

/// Cell spellings that denote a missing value.
pub const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>",
    "#N/A", "#NA",
];

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Returns `true` if the raw cell text denotes a missing value.
#[inline]
pub fn is_na(raw: &str) -> bool {
    NA_TOKENS.contains(&raw)
}

/// Converts raw cell text into a nullable cell.
#[inline]
pub fn parse_cell(raw: &str) -> Option<String> {
    if is_na(raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Converts raw cell text from a sink file; only an empty field is missing.
#[inline]
pub fn parse_sink_cell(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Load a CSV file with a header row into a [`Table`].
///
/// Short rows are padded with missing cells; rows wider than the header are
/// rejected with a schema error.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no header row, or
/// contains malformed rows.
pub fn load_table_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    load_with(path.as_ref(), parse_cell)
}

/// Load a CSV file previously written by a sink store.
///
/// Unlike [`load_table_csv`], NA spellings are kept as values, so a table
/// survives a write and read-back unchanged.
pub fn load_sink_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    load_with(path.as_ref(), parse_sink_cell)
}

fn load_with(path: &Path, parse: fn(&str) -> Option<String>) -> Result<Table> {
    let file = File::open(path)?;
    let table = read_table_with(BufReader::new(file), parse).map_err(|e| match e {
        LoaderError::EmptyFile(_) => LoaderError::EmptyFile(path.to_path_buf()),
        other => other,
    })?;
    Ok(table)
}

/// Read a CSV table from any reader.
pub fn read_table<R: Read>(reader: R) -> Result<Table> {
    read_table_with(reader, parse_cell)
}

/// Read a CSV table from any reader, converting cells with `parse`.
pub fn read_table_with<R: Read>(reader: R, parse: fn(&str) -> Option<String>) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(LoaderError::EmptyFile(PathBuf::new()));
    }

    let mut table = Table::new(headers)?;
    let width = table.num_columns();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() > width {
            return Err(SchemaError::RowWidth {
                row: i,
                expected: width,
                found: record.len(),
            }
            .into());
        }

        let mut row: Row = Vec::with_capacity(width);
        row.extend(record.iter().map(parse));
        row.resize(width, None);
        table.push_row(row)?;
    }

    Ok(table)
}

/// Read only the header row of a CSV file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_table_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "first,last,driver_race,search_conducted").unwrap();
        writeln!(file, "J,S,White,False").unwrap();
        writeln!(file, "K,,NaN,True").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path())?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.headers()[2], "driver_race");
        assert_eq!(table.cell(0, 2), Some("White"));
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.cell(1, 2), None);
        assert_eq!(table.cell(1, 3), Some("True"));

        Ok(())
    }

    #[test]
    fn test_short_rows_padded() -> Result<()> {
        let table = read_table("a,b,c\n1,2\n".as_bytes())?;
        assert_eq!(table.rows()[0], vec![Some("1".into()), Some("2".into()), None]);
        Ok(())
    }

    #[test]
    fn test_wide_rows_rejected() {
        let err = read_table("a,b\n1,2,3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoaderError::Schema(SchemaError::RowWidth { .. })));
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let err = read_table("a,a\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoaderError::Schema(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn test_sink_cells_keep_na_spellings() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "first,last,driver_race").unwrap();
        writeln!(file, "ANA,NA,White").unwrap();
        writeln!(file, "NULL,S,").unwrap();
        file.flush().unwrap();

        let table = load_sink_csv(file.path())?;
        assert_eq!(table.cell(0, 1), Some("NA"));
        assert_eq!(table.cell(1, 0), Some("NULL"));
        assert_eq!(table.cell(1, 2), None);

        let raw = load_table_csv(file.path())?;
        assert_eq!(raw.cell(0, 1), None);
        Ok(())
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let err = load_table_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::EmptyFile(_)));
    }

    #[test]
    fn test_read_header() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "driver_id,officer_id,state").unwrap();
        writeln!(file, "1,2,TX").unwrap();
        file.flush().unwrap();

        let headers = read_header(file.path())?;
        assert_eq!(headers, vec!["driver_id", "officer_id", "state"]);
        Ok(())
    }
}
