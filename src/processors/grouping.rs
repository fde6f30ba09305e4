//! Driver identity grouping.
//!
//! Rows are grouped by their [`KeyTuple`]. Only complete rows take part:
//! every key field plus the race and outcome columns must be present. Each
//! distinct key tuple gets a dense zero-based identity, assigned in
//! ascending key order, and the identity is written to a new first column.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::config::StateConfig;
use crate::core::sink::{SinkError, SinkStore};
use crate::core::table::{KeyKind, KeySpec, KeyTuple, Row, SchemaError, Table};

/// Errors that can occur while grouping.
#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to persist grouped rows: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for grouping operations.
pub type Result<T> = std::result::Result<T, GroupingError>;

/// All rows sharing one key tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverGroup {
    pub identity: usize,
    pub key: KeyTuple,
    /// Row positions in the grouped table.
    pub rows: Vec<usize>,
}

impl DriverGroup {
    /// Number of stops recorded for this driver.
    #[inline]
    pub fn stops(&self) -> usize {
        self.rows.len()
    }
}

/// Group row positions by key tuple, skipping rows with an incomplete key.
///
/// Groups come back in ascending key order; positions within a group keep
/// table order.
pub fn group_by_key(table: &Table, spec: &KeySpec) -> BTreeMap<KeyTuple, Vec<usize>> {
    let mut groups: BTreeMap<KeyTuple, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        if let Some(key) = spec.extract(row) {
            groups.entry(key).or_default().push(i);
        }
    }
    groups
}

/// Identity-tagged complete rows and their driver groups.
#[derive(Debug, Clone)]
pub struct GroupedStops {
    table: Table,
    groups: Vec<DriverGroup>,
    identity_column: String,
    key_spec: KeySpec,
}

impl GroupedStops {
    /// Complete rows with the identity column first.
    #[inline]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Groups indexed by identity.
    #[inline]
    pub fn groups(&self) -> &[DriverGroup] {
        &self.groups
    }

    #[inline]
    pub fn num_drivers(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn identity_column(&self) -> &str {
        &self.identity_column
    }

    /// Key columns resolved against [`GroupedStops::table`].
    #[inline]
    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    /// Member rows of one group.
    pub fn member_rows<'a>(&'a self, group: &'a DriverGroup) -> impl Iterator<Item = &'a Row> + 'a {
        group.rows.iter().map(move |&i| &self.table.rows()[i])
    }

    /// Sub-table holding one group's rows.
    pub fn group_table(&self, group: &DriverGroup) -> Table {
        self.table.select_rows(&group.rows)
    }

    /// Replace `sink` with the full identity-tagged table.
    pub fn persist(&self, store: &mut dyn SinkStore, sink: &Path) -> Result<()> {
        store.replace(sink, &self.table)?;
        info!("Wrote {} identity-tagged rows to {}", self.table.len(), sink.display());
        Ok(())
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Groups stop rows into driver identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityGrouper {
    pub keys: Vec<String>,
    pub integer_keys: Vec<String>,
    pub race_column: String,
    pub outcome_column: String,
    pub identity_column: String,
}

impl IdentityGrouper {
    pub fn from_config(config: &StateConfig) -> Self {
        Self {
            keys: config.grouping_keys.clone(),
            integer_keys: config.integer_keys.clone(),
            race_column: config.race_column.clone(),
            outcome_column: config.outcome_column.clone(),
            identity_column: config.identity_column.clone(),
        }
    }

    fn kind_of(&self, key: &str) -> KeyKind {
        if self.integer_keys.iter().any(|k| k == key) {
            KeyKind::Integer
        } else {
            KeyKind::Text
        }
    }

    /// Positions of complete rows: every key parses, race and outcome present.
    fn complete_rows(&self, table: &Table, spec: &KeySpec) -> Result<Vec<usize>> {
        let race = table.column_index(&self.race_column)?;
        let outcome = table.column_index(&self.outcome_column)?;
        let rows = table.rows();
        let mut keep: Vec<usize> = (0..rows.len()).collect();

        for (name, &col) in spec.names().iter().zip(spec.columns()) {
            let kind = self.kind_of(name);
            keep.retain(|&i| rows[i][col].as_deref().and_then(|v| kind.parse(v)).is_some());
            info!("Rows remaining after taking only non-null key {}: {}", name, keep.len());
        }

        keep.retain(|&i| rows[i][race].is_some());
        info!("Rows remaining after taking only non-null {}: {}", self.race_column, keep.len());
        keep.retain(|&i| rows[i][outcome].is_some());
        info!("Rows remaining after taking only non-null {}: {}", self.outcome_column, keep.len());

        Ok(keep)
    }

    /// Drop incomplete rows, assign identities, and index the groups.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a key, race, or outcome column is absent,
    /// a key is listed twice, or the identity column already exists.
    pub fn group(&self, table: &Table) -> Result<GroupedStops> {
        let input_spec = KeySpec::resolve(table, &self.keys, &self.integer_keys)?;
        let keep = self.complete_rows(table, &input_spec)?;

        let mut complete = table.select_rows(&keep);
        let by_key = group_by_key(&complete, &input_spec);

        let mut identities: Vec<Option<String>> = vec![None; complete.len()];
        let mut groups = Vec::with_capacity(by_key.len());
        for (identity, (key, rows)) in by_key.into_iter().enumerate() {
            for &i in &rows {
                identities[i] = Some(identity.to_string());
            }
            groups.push(DriverGroup {
                identity,
                key,
                rows,
            });
        }

        complete.insert_column(0, &self.identity_column, identities)?;
        let key_spec = KeySpec::resolve(&complete, &self.keys, &self.integer_keys)?;
        info!("Number of unique driver groups: {}", groups.len());

        Ok(GroupedStops {
            table: complete,
            groups,
            identity_column: self.identity_column.clone(),
            key_spec,
        })
    }
}
