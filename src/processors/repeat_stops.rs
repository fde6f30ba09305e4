//! Repeat-stop filtering of driver groups.
//!
//! A driver is kept when its group passes a [`GroupPredicate`]. The default
//! [`StopPredicate`] accepts groups whose stop count lies in an inclusive
//! range and whose key fields pass the state's validity rules.
//!
//! The filter writes accepted groups to the grouped sink. If that sink is
//! already populated the step is skipped entirely; invalidate the sink to
//! force recomputation.

use std::collections::HashSet;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::config::{KeyRules, StateConfig, StopCountRange};
use crate::core::sink::{SinkError, SinkStore};
use crate::core::table::{KeyTuple, Row, SchemaError, Table};

use super::grouping::{DriverGroup, GroupedStops};

/// Errors that can occur while filtering groups.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("invariant violated for driver {key}: {detail}")]
    Invariant { key: String, detail: String },

    #[error("failed to write filtered groups: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Decides whether a driver group is kept.
pub trait GroupPredicate {
    fn accept(&self, key: &KeyTuple, rows: &[&Row]) -> bool;
}

impl<F> GroupPredicate for F
where
    F: Fn(&KeyTuple, &[&Row]) -> bool,
{
    fn accept(&self, key: &KeyTuple, rows: &[&Row]) -> bool {
        self(key, rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRule {
    position: usize,
    min_len: usize,
    rejected: Vec<String>,
}

/// Stop-count range plus per-field key validity rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopPredicate {
    range: StopCountRange,
    rules: Vec<FieldRule>,
}

impl StopPredicate {
    /// Range-only predicate.
    pub fn new(range: StopCountRange) -> Self {
        Self {
            range,
            rules: Vec::new(),
        }
    }

    /// Attach key rules; every rule must name one of `keys`.
    pub fn with_rules(
        mut self,
        keys: &[String],
        rules: &KeyRules,
    ) -> std::result::Result<Self, SchemaError> {
        let mut fields: Vec<&String> = rules.min_len.keys().chain(rules.rejected.keys()).collect();
        fields.sort();
        fields.dedup();

        for field in fields {
            let position = keys
                .iter()
                .position(|k| k == field)
                .ok_or_else(|| SchemaError::MissingColumn(field.clone()))?;
            self.rules.push(FieldRule {
                position,
                min_len: rules.min_len.get(field).copied().unwrap_or(0),
                rejected: rules.rejected.get(field).cloned().unwrap_or_default(),
            });
        }
        Ok(self)
    }

    /// Predicate described by a state's configuration.
    pub fn from_config(config: &StateConfig) -> std::result::Result<Self, SchemaError> {
        Self::new(config.stop_count_range).with_rules(&config.grouping_keys, &config.key_rules)
    }

    fn key_is_valid(&self, key: &KeyTuple) -> bool {
        self.rules.iter().all(|rule| match key.get(rule.position) {
            Some(field) => {
                let text = field.to_string();
                text.trim().chars().count() >= rule.min_len && !rule.rejected.contains(&text)
            }
            None => false,
        })
    }
}

impl GroupPredicate for StopPredicate {
    fn accept(&self, key: &KeyTuple, rows: &[&Row]) -> bool {
        self.range.contains(rows.len()) && self.key_is_valid(key)
    }
}

/// Result of a filter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The grouped sink was already populated; nothing was computed.
    Skipped,
    /// Accepted groups were written.
    Written { groups: usize, rows: usize },
}

/// Keeps driver groups accepted by a predicate.
#[derive(Debug, Clone)]
pub struct RepeatStopFilter<P> {
    predicate: P,
}

impl<P: GroupPredicate> RepeatStopFilter<P> {
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }

    /// Accepted groups, each checked for identity homogeneity.
    pub fn select<'a>(&self, grouped: &'a GroupedStops) -> Result<Vec<&'a DriverGroup>> {
        let identity = grouped.table().column_index(grouped.identity_column())?;
        let mut accepted = Vec::new();

        for group in grouped.groups() {
            let rows: Vec<&Row> = grouped.member_rows(group).collect();
            if !self.predicate.accept(&group.key, &rows) {
                continue;
            }
            check_single_identity(&group.key, &rows, identity)?;
            accepted.push(group);
        }

        Ok(accepted)
    }

    /// Write accepted groups to `sink` unless it is already populated.
    pub fn run(
        &self,
        grouped: &GroupedStops,
        store: &mut dyn SinkStore,
        sink: &Path,
    ) -> Result<FilterOutcome> {
        if store.is_populated(sink)? {
            info!("{} already exists, NO CHANGE", sink.display());
            return Ok(FilterOutcome::Skipped);
        }

        let accepted = self.select(grouped)?;
        let indices: Vec<usize> = accepted.iter().flat_map(|g| g.rows.iter().copied()).collect();
        let table = grouped.table().select_rows(&indices);

        if !accepted.is_empty() {
            store.append(sink, &table)?;
        }

        info!("Number of groups written to csv: {}", accepted.len());
        Ok(FilterOutcome::Written {
            groups: accepted.len(),
            rows: table.len(),
        })
    }
}

/// Every row must carry the same non-missing identity.
fn check_single_identity(key: &KeyTuple, rows: &[&Row], identity: usize) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for row in rows {
        match row.get(identity).and_then(|c| c.as_deref()) {
            Some(id) => {
                seen.insert(id);
            }
            None => {
                return Err(FilterError::Invariant {
                    key: key.to_string(),
                    detail: "row without identity".to_string(),
                })
            }
        }
    }
    if seen.len() != 1 {
        return Err(FilterError::Invariant {
            key: key.to_string(),
            detail: format!("expected one identity, found {}", seen.len()),
        });
    }
    Ok(())
}

/// Check homogeneity for an arbitrary table of already-grouped rows.
pub fn verify_groups(table: &Table, groups: &[DriverGroup], identity_column: &str) -> Result<()> {
    let identity = table.column_index(identity_column)?;
    for group in groups {
        let rows: Vec<&Row> = group.rows.iter().filter_map(|&i| table.rows().get(i)).collect();
        check_single_identity(&group.key, &rows, identity)?;
    }
    Ok(())
}
