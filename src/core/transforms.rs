//! Column-level transformations shared by the standardizers and exports.
//!
//! This module provides:
//! - integer coercion of numeric cells
//! - year extraction and year-based row filtering
//! - column projection onto a keep-list
//! - one-way anonymization of identifier columns

use std::collections::HashSet;
use std::sync::OnceLock;

use log::info;
use regex::Regex;
use md5::{Digest, Md5};

use super::table::{Result, Table};

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d{4})").expect("static year pattern"))
}

/// Parse a cell as an integer, accepting surrounding whitespace only.
///
/// `"2004"` parses, `"2004.0"` and `"04/2004"` do not.
pub fn int_or_none(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Parse a cell as an integer, also accepting integral floats such as `"12.0"`.
pub fn numeric_int_or_none(raw: &str) -> Option<i64> {
    if let Some(v) = int_or_none(raw) {
        return Some(v);
    }
    let v: f64 = raw.trim().parse().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Leading four-digit year of a date-like cell (`"2016-03-02"` → 2016).
pub fn year_of(raw: &str) -> Option<i32> {
    year_pattern()
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Keep only rows whose `column` year is one of `years`.
///
/// Rows with a missing or unparseable date are dropped.
pub fn filter_years(table: &Table, column: &str, years: &[i32]) -> Result<Table> {
    let idx = table.column_index(column)?;
    let years: HashSet<i32> = years.iter().copied().collect();
    Ok(table.filter_rows(|row| {
        row[idx]
            .as_deref()
            .and_then(year_of)
            .map_or(false, |y| years.contains(&y))
    }))
}

/// Project a table onto the columns of `keep` that it actually has,
/// preserving the table's column order.
pub fn select_existing_columns(table: &Table, keep: &[String]) -> Result<Table> {
    let columns: Vec<&str> = table
        .headers()
        .iter()
        .filter(|h| keep.contains(h))
        .map(|h| h.as_str())
        .collect();
    table.project(&columns)
}

/// Rewrite a column so every cell is a canonical integer or missing.
pub fn canonicalize_int_column(table: &mut Table, column: &str) -> Result<()> {
    table.map_column(column, |cell| {
        cell.as_deref()
            .and_then(numeric_int_or_none)
            .map(|v| v.to_string())
    })
}

/// Lowercase hex MD5 digest of an identifier.
///
/// MD5 keeps exported ids comparable with previously released processed
/// files; the digest pseudonymizes, it is not a secrecy guarantee.
pub fn hash_identifier(value: &str) -> String {
    hex::encode(Md5::digest(value.as_bytes()))
}

fn distinct_count(table: &Table, idx: usize) -> usize {
    table
        .rows()
        .iter()
        .filter_map(|r| r[idx].as_deref())
        .collect::<HashSet<_>>()
        .len()
}

/// Replace each named identifier column with its digest. Missing cells stay
/// missing; absent columns are skipped.
///
/// Returns the names of the columns that were anonymized.
pub fn anonymize_columns(table: &mut Table, columns: &[&str]) -> Result<Vec<String>> {
    let mut done = Vec::new();
    for &column in columns {
        if !table.has_column(column) {
            info!("Skipping column {} - not present", column);
            continue;
        }
        let idx = table.column_index(column)?;
        let before = distinct_count(table, idx);

        table.map_column(column, |cell| cell.map(|v| hash_identifier(&v)))?;

        let after = distinct_count(table, idx);
        info!(
            "Anonymized {}: {} distinct values before, {} after",
            column, before, after
        );
        done.push(column.to_string());
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{headers, row};

    #[test]
    fn test_int_or_none() {
        assert_eq!(int_or_none("2004"), Some(2004));
        assert_eq!(int_or_none(" 17 "), Some(17));
        assert_eq!(int_or_none("2004.0"), None);
        assert_eq!(int_or_none("UNK"), None);
    }

    #[test]
    fn test_numeric_int_or_none() {
        assert_eq!(numeric_int_or_none("12.0"), Some(12));
        assert_eq!(numeric_int_or_none("12.5"), None);
        assert_eq!(numeric_int_or_none("abc"), None);
    }

    #[test]
    fn test_year_of() {
        assert_eq!(year_of("2016-05-01"), Some(2016));
        assert_eq!(year_of("2017"), Some(2017));
        assert_eq!(year_of("05/01/2016"), None);
    }

    #[test]
    fn test_filter_years() {
        let table = Table::from_rows(
            headers(&["date", "id"]),
            vec![
                row(&["2015-12-31", "a"]),
                row(&["2016-01-02", "b"]),
                row(&["2017-06-30", "c"]),
                row(&["2018-01-02", "d"]),
                row(&["", "e"]),
            ],
        )
        .unwrap();

        let kept = filter_years(&table, "date", &[2016, 2017]).unwrap();
        let ids: Vec<_> = kept.rows().iter().map(|r| r[1].clone().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_select_existing_columns() {
        let table = Table::from_rows(
            headers(&["a", "driver_id", "b", "state"]),
            vec![row(&["1", "2", "3", "TX"])],
        )
        .unwrap();
        let keep = headers(&["state", "driver_id", "missing"]);
        let projected = select_existing_columns(&table, &keep).unwrap();
        assert_eq!(projected.headers(), &["driver_id", "state"]);
        assert_eq!(projected.rows()[0], row(&["2", "TX"]));
    }

    #[test]
    fn test_anonymize_columns() {
        let mut table = Table::from_rows(
            headers(&["driver_id", "state"]),
            vec![row(&["12", "TX"]), row(&["", "TX"]), row(&["12", "TX"])],
        )
        .unwrap();

        let done = anonymize_columns(&mut table, &["driver_id", "officer_id"]).unwrap();
        assert_eq!(done, vec!["driver_id"]);

        let first = table.cell(0, 0).unwrap();
        assert_eq!(first, "c20ad4d76fe97759aa27a0c99bff6710");
        assert_eq!(first, hash_identifier("12"));
        assert_eq!(table.cell(1, 0), None);
        assert_eq!(table.cell(2, 0), Some(first));
    }

    #[test]
    fn test_canonicalize_int_column() {
        let mut table = Table::from_rows(
            headers(&["officer_id"]),
            vec![row(&["7.0"]), row(&["x"]), row(&["8"])],
        )
        .unwrap();
        canonicalize_int_column(&mut table, "officer_id").unwrap();
        assert_eq!(table.cell(0, 0), Some("7"));
        assert_eq!(table.cell(1, 0), None);
        assert_eq!(table.cell(2, 0), Some("8"));
    }
}
