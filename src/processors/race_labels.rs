//! Per-driver race label aggregation.
//!
//! Every driver gets one aggregated race string: the recorded race itself
//! when all of the driver's stops agree, otherwise the distinct races in
//! lexicographic order joined with `_` (`{"White", "Hispanic"}` becomes
//! `"Hispanic_White"`).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;
use thiserror::Error;

use crate::config::StateConfig;
use crate::core::table::{KeySpec, KeyTuple, SchemaError, Table};

/// Position of the aggregated race column in labeled output.
pub const RACE_STR_POSITION: usize = 2;

/// Separator between races in an aggregated string.
pub const RACE_SEPARATOR: &str = "_";

/// Errors that can occur while labeling rows.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("no race label for driver {key}")]
    Lookup { key: String },

    #[error("row {row} has an incomplete driver key")]
    IncompleteKey { row: usize },
}

/// Result type for labeling operations.
pub type Result<T> = std::result::Result<T, LabelError>;

/// Aggregated race string of a race label set.
pub fn aggregate_race(races: &BTreeSet<String>) -> String {
    // BTreeSet iterates in sorted order
    races
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(RACE_SEPARATOR)
}

/// Mapping from driver key to aggregated race string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaceLabelMap {
    labels: HashMap<KeyTuple, String>,
}

impl RaceLabelMap {
    /// Collect the race label set of every driver in `table`.
    ///
    /// Rows with an incomplete key are ignored; missing race cells do not
    /// contribute to a driver's set.
    ///
    /// # Errors
    ///
    /// Returns `LabelError::Schema` if `race_column` is absent.
    pub fn build(table: &Table, spec: &KeySpec, race_column: &str) -> Result<Self> {
        let race = table.column_index(race_column)?;
        let mut sets: BTreeMap<KeyTuple, BTreeSet<String>> = BTreeMap::new();

        for row in table.rows() {
            let Some(key) = spec.extract(row) else {
                continue;
            };
            let set = sets.entry(key).or_default();
            if let Some(value) = &row[race] {
                set.insert(value.clone());
            }
        }

        let labels = sets
            .into_iter()
            .map(|(key, races)| (key, aggregate_race(&races)))
            .collect();
        Ok(Self { labels })
    }

    pub fn get(&self, key: &KeyTuple) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Label for `key`; absence is an error, never defaulted.
    pub fn lookup(&self, key: &KeyTuple) -> Result<&str> {
        self.get(key).ok_or_else(|| LabelError::Lookup {
            key: key.to_string(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyTuple, &str)> {
        self.labels.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Number of drivers per aggregated string, sorted by string.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for label in self.labels.values() {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Adds the aggregated race column to a table of grouped stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceLabeler {
    pub keys: Vec<String>,
    pub integer_keys: Vec<String>,
    pub race_column: String,
    pub race_str_column: String,
}

impl RaceLabeler {
    pub fn from_config(config: &StateConfig) -> Self {
        Self {
            keys: config.grouping_keys.clone(),
            integer_keys: config.integer_keys.clone(),
            race_column: config.race_column.clone(),
            race_str_column: config.race_str_column.clone(),
        }
    }

    /// Build the label map from `table` and label its rows.
    pub fn label(&self, table: &Table) -> Result<(Table, RaceLabelMap)> {
        let spec = KeySpec::resolve(table, &self.keys, &self.integer_keys)?;
        let labels = RaceLabelMap::build(table, &spec, &self.race_column)?;
        info!("Aggregated race labels for {} drivers", labels.len());
        let labeled = self.apply(table, &spec, &labels)?;
        Ok((labeled, labels))
    }

    /// Label every row of `table` from an existing map.
    ///
    /// The aggregated column is inserted at index 2. A stale column of the
    /// same name is replaced.
    ///
    /// # Errors
    ///
    /// `LabelError::Lookup` if a row's driver is not in `labels`, and
    /// `LabelError::IncompleteKey` if a row has no complete key at all.
    pub fn apply(&self, table: &Table, spec: &KeySpec, labels: &RaceLabelMap) -> Result<Table> {
        let values = table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let key = spec.extract(row).ok_or(LabelError::IncompleteKey { row: i })?;
                labels.lookup(&key).map(|label| Some(label.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut labeled = table.clone();
        if labeled.has_column(&self.race_str_column) {
            labeled.remove_column(&self.race_str_column)?;
        }
        labeled.insert_column(RACE_STR_POSITION, &self.race_str_column, values)?;
        Ok(labeled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{headers, row};

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn labeler() -> RaceLabeler {
        RaceLabeler {
            keys: headers(&["first", "last"]),
            integer_keys: Vec::new(),
            race_column: "driver_race".into(),
            race_str_column: "race_str".into(),
        }
    }

    fn grouped() -> Table {
        Table::from_rows(
            headers(&["driver_id", "first", "last", "driver_race"]),
            vec![
                row(&["1", "J", "S", "White"]),
                row(&["0", "A", "B", "Black"]),
                row(&["1", "J", "S", "Hispanic"]),
                row(&["1", "J", "S", "White"]),
                row(&["0", "A", "B", "Black"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_aggregate_race() {
        assert_eq!(aggregate_race(&set(&["White"])), "White");
        assert_eq!(aggregate_race(&set(&["White", "Hispanic"])), "Hispanic_White");
        assert_eq!(aggregate_race(&set(&["White", "Hispanic", "White"])), "Hispanic_White");
        assert_eq!(
            aggregate_race(&set(&["White", "Black", "Hispanic"])),
            "Black_Hispanic_White"
        );
    }

    #[test]
    fn test_label_inserts_column_at_index_two() {
        let (labeled, labels) = labeler().label(&grouped()).unwrap();
        assert_eq!(labeled.headers(), &["driver_id", "first", "race_str", "last", "driver_race"]);
        assert_eq!(labels.len(), 2);

        let race_str: Vec<_> = (0..labeled.len()).map(|i| labeled.cell(i, 2).unwrap()).collect();
        assert_eq!(
            race_str,
            vec!["Hispanic_White", "Black", "Hispanic_White", "Hispanic_White", "Black"]
        );
    }

    #[test]
    fn test_label_counts() {
        let (_, labels) = labeler().label(&grouped()).unwrap();
        let counts = labels.label_counts();
        assert_eq!(counts.get("Black"), Some(&1));
        assert_eq!(counts.get("Hispanic_White"), Some(&1));
    }

    #[test]
    fn test_stale_race_str_replaced() {
        let (once, _) = labeler().label(&grouped()).unwrap();
        let (twice, _) = labeler().label(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_key_is_lookup_error() {
        let table = grouped();
        let spec = KeySpec::resolve(&table, &headers(&["first", "last"]), &[]).unwrap();
        let partial = table.select_rows(&[1, 4]);
        let labels = RaceLabelMap::build(&partial, &spec, "driver_race").unwrap();

        let err = labeler().apply(&table, &spec, &labels).unwrap_err();
        match err {
            LabelError::Lookup { key } => assert_eq!(key, "(J, S)"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_race_column() {
        let table = grouped();
        let labeler = RaceLabeler {
            race_column: "race".into(),
            ..labeler()
        };
        assert!(matches!(
            labeler.label(&table),
            Err(LabelError::Schema(SchemaError::MissingColumn(_)))
        ));
    }
}
