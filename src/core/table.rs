//! In-memory tabular data model.
//!
//! A [`Table`] is a row-major collection of nullable string cells under a
//! fixed header. Every stage of the pipeline consumes a table and produces a
//! new one; rows are never shared mutably between stages.
//!
//! Driver identity keys are modelled by [`KeyTuple`], an ordered tuple of
//! typed [`KeyField`] values. Two key tuples are equal iff every field is
//! equal: integers compare numerically, text compares byte-for-byte. Hashing
//! and ordering are derived from the same fields, so a `KeyTuple` can be used
//! interchangeably as a grouping key and as a lookup key.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

/// A single row: one optional cell per header column (`None` = missing).
pub type Row = Vec<Option<String>>;

/// Schema violations detected when resolving or building tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Row-major table with named columns and nullable cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
}

fn check_unique(headers: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(headers.len());
    for name in headers {
        if !seen.insert(name.as_str()) {
            return Err(SchemaError::DuplicateColumn(name.clone()));
        }
    }
    Ok(())
}

impl Table {
    /// Creates an empty table with the given header.
    pub fn new(headers: Vec<String>) -> Result<Self> {
        check_unique(&headers)?;
        Ok(Self {
            headers,
            rows: Vec::new(),
        })
    }

    /// Creates a table from a header and rows, validating row widths.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        check_unique(&headers)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(SchemaError::RowWidth {
                    row: i,
                    expected: headers.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Position of a named column, or `SchemaError::MissingColumn`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
    }

    /// Cell value at (row, col); `None` for missing cells or out-of-range indices.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    /// Appends a row, checking its width against the header.
    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(SchemaError::RowWidth {
                row: self.rows.len(),
                expected: self.headers.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Returns a new table containing the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect();
        Table {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Returns a new table with only the rows matching `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Row) -> bool,
    {
        let rows = self.rows.iter().filter(|r| keep(r)).cloned().collect();
        Table {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Consuming variant of [`Table::filter_rows`].
    pub fn retain_rows<F>(mut self, mut keep: F) -> Table
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(|r| keep(r));
        self
    }

    /// Inserts a column at `position` (clamped to the end).
    pub fn insert_column(
        &mut self,
        position: usize,
        name: &str,
        values: Vec<Option<String>>,
    ) -> Result<()> {
        if self.has_column(name) {
            return Err(SchemaError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.rows.len() {
            return Err(SchemaError::RowWidth {
                row: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        let position = position.min(self.headers.len());
        self.headers.insert(position, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(position, value);
        }
        Ok(())
    }

    /// Removes a column and returns its values.
    pub fn remove_column(&mut self, name: &str) -> Result<Vec<Option<String>>> {
        let idx = self.column_index(name)?;
        self.headers.remove(idx);
        Ok(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// Replaces every cell of a column with `f(old_value)`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(Option<String>) -> Option<String>,
    {
        let idx = self.column_index(name)?;
        for row in &mut self.rows {
            let old = row[idx].take();
            row[idx] = f(old);
        }
        Ok(())
    }

    /// Overwrites a column with the given values.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        let idx = self.column_index(name)?;
        if values.len() != self.rows.len() {
            return Err(SchemaError::RowWidth {
                row: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Returns a table restricted to the named columns, in the given order.
    pub fn project(&self, columns: &[&str]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        let headers = columns.iter().map(|c| c.to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table::from_rows(headers, rows)
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.headers, self.rows)
    }
}

/// One typed field of a driver key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyField {
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyField::Int(v) => write!(f, "{}", v),
            KeyField::Text(s) => f.write_str(s),
        }
    }
}

/// How a key column's cells are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Text,
    Integer,
}

impl KeyKind {
    /// Parses a raw cell; integer cells that do not parse are treated as missing.
    pub fn parse(self, raw: &str) -> Option<KeyField> {
        match self {
            KeyKind::Text => Some(KeyField::Text(raw.to_string())),
            KeyKind::Integer => raw.trim().parse::<i64>().ok().map(KeyField::Int),
        }
    }
}

/// Ordered driver-identifying key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTuple(Vec<KeyField>);

impl KeyTuple {
    pub fn new(fields: Vec<KeyField>) -> Self {
        Self(fields)
    }

    /// Convenience constructor for all-text keys.
    pub fn text<S: AsRef<str>>(values: &[S]) -> Self {
        Self(
            values
                .iter()
                .map(|v| KeyField::Text(v.as_ref().to_string()))
                .collect(),
        )
    }

    #[inline]
    pub fn fields(&self) -> &[KeyField] {
        &self.0
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<&KeyField> {
        self.0.get(i)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str(")")
    }
}

/// Key columns resolved against a concrete table header.
#[derive(Debug, Clone)]
pub struct KeySpec {
    names: Vec<String>,
    columns: Vec<usize>,
    kinds: Vec<KeyKind>,
}

impl KeySpec {
    /// Resolves `keys` against `table`. Columns listed in `integer_keys` are
    /// read as integers, everything else as text.
    pub fn resolve(table: &Table, keys: &[String], integer_keys: &[String]) -> Result<Self> {
        check_unique(keys)?;
        let mut columns = Vec::with_capacity(keys.len());
        let mut kinds = Vec::with_capacity(keys.len());
        for key in keys {
            columns.push(table.column_index(key)?);
            kinds.push(if integer_keys.iter().any(|k| k == key) {
                KeyKind::Integer
            } else {
                KeyKind::Text
            });
        }
        Ok(Self {
            names: keys.to_vec(),
            columns,
            kinds,
        })
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Position of a key name within the tuple.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Builds the key tuple of a row; `None` if any key field is missing.
    pub fn extract(&self, row: &Row) -> Option<KeyTuple> {
        let mut fields = Vec::with_capacity(self.columns.len());
        for (&col, &kind) in self.columns.iter().zip(&self.kinds) {
            let raw = row.get(col)?.as_deref()?;
            fields.push(kind.parse(raw)?);
        }
        Some(KeyTuple(fields))
    }
}

/// Builds a header vector from string literals.
pub fn headers<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| n.as_ref().to_string()).collect()
}

/// Builds a row from string literals; empty strings become missing cells.
pub fn row<S: AsRef<str>>(cells: &[S]) -> Row {
    cells
        .iter()
        .map(|c| {
            let c = c.as_ref();
            if c.is_empty() {
                None
            } else {
                Some(c.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            headers(&["first", "last", "year"]),
            vec![row(&["J", "S", "2004"]), row(&["A", "", "1999"])],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = Table::new(headers(&["a", "b", "a"])).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_row_width_checked() {
        let err = Table::from_rows(headers(&["a", "b"]), vec![row(&["1"])]).unwrap_err();
        assert!(matches!(err, SchemaError::RowWidth { row: 0, expected: 2, found: 1 }));
    }

    #[test]
    fn test_insert_and_remove_column() {
        let mut table = sample();
        table
            .insert_column(0, "id", vec![Some("0".into()), Some("1".into())])
            .unwrap();
        assert_eq!(table.headers()[0], "id");
        assert_eq!(table.cell(1, 0), Some("1"));
        assert_eq!(table.cell(0, 1), Some("J"));

        let removed = table.remove_column("last").unwrap();
        assert_eq!(removed, vec![Some("S".to_string()), None]);
        assert_eq!(table.num_columns(), 3);
    }

    #[test]
    fn test_key_spec_skips_incomplete_rows() {
        let table = sample();
        let spec = KeySpec::resolve(
            &table,
            &headers(&["first", "last", "year"]),
            &headers(&["year"]),
        )
        .unwrap();

        let key = spec.extract(&table.rows()[0]).unwrap();
        assert_eq!(
            key,
            KeyTuple::new(vec![
                KeyField::Text("J".into()),
                KeyField::Text("S".into()),
                KeyField::Int(2004),
            ])
        );
        assert!(spec.extract(&table.rows()[1]).is_none());
    }

    #[test]
    fn test_key_spec_rejects_duplicate_and_missing_keys() {
        let table = sample();
        assert_eq!(
            KeySpec::resolve(&table, &headers(&["first", "first"]), &[]).unwrap_err(),
            SchemaError::DuplicateColumn("first".into())
        );
        assert_eq!(
            KeySpec::resolve(&table, &headers(&["dob"]), &[]).unwrap_err(),
            SchemaError::MissingColumn("dob".into())
        );
    }

    #[test]
    fn test_integer_keys_compare_numerically() {
        assert_eq!(KeyKind::Integer.parse(" 2004"), Some(KeyField::Int(2004)));
        assert_eq!(KeyKind::Integer.parse("2004.0"), None);
        assert!(KeyField::Int(9) < KeyField::Int(10));
    }

    #[test]
    fn test_key_tuple_display() {
        let key = KeyTuple::text(&["J", "S"]);
        assert_eq!(key.to_string(), "(J, S)");
    }
}
