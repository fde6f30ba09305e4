//! Extraction of racially ambiguous drivers.
//!
//! Keeps labeled rows whose aggregated race string equals the target
//! combination and persists them to the ambiguous sink under the same
//! skip-if-populated rule as the repeat-stop filter.

use std::collections::HashSet;
use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::config::StateConfig;
use crate::core::sink::{SinkError, SinkStore};
use crate::core::table::{SchemaError, Table};

/// Errors that can occur during extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to write ambiguous drivers: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for extraction.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Result of an extraction run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// The ambiguous sink was already populated.
    Skipped,
    /// Rows were extracted and written.
    Written { table: Table, drivers: usize },
}

impl ExtractOutcome {
    /// Rows written by this run, zero when skipped.
    pub fn rows(&self) -> usize {
        match self {
            ExtractOutcome::Skipped => 0,
            ExtractOutcome::Written { table, .. } => table.len(),
        }
    }
}

/// Selects rows of drivers with a given aggregated race string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityExtractor {
    pub race_str_column: String,
    pub target: String,
    pub identity_column: String,
    /// Column that must be present when `require_outcome` is set.
    pub outcome_column: String,
    pub require_outcome: bool,
}

impl AmbiguityExtractor {
    pub fn from_config(config: &StateConfig) -> Self {
        Self {
            race_str_column: config.race_str_column.clone(),
            target: config.target_race_combo.clone(),
            identity_column: config.identity_column.clone(),
            outcome_column: config.outcome_column.clone(),
            require_outcome: config.require_outcome,
        }
    }

    /// Rows matching the target, without touching any sink.
    pub fn extract(&self, labeled: &Table) -> Result<Table> {
        let race_str = labeled.column_index(&self.race_str_column)?;
        let outcome = if self.require_outcome {
            Some(labeled.column_index(&self.outcome_column)?)
        } else {
            None
        };

        Ok(labeled.filter_rows(|row| {
            row[race_str].as_deref() == Some(self.target.as_str())
                && outcome.map_or(true, |i| row[i].is_some())
        }))
    }

    /// Number of distinct identities in an extracted table.
    fn count_drivers(&self, table: &Table) -> usize {
        match table.column_index(&self.identity_column) {
            Ok(idx) => table
                .rows()
                .iter()
                .filter_map(|r| r[idx].as_deref())
                .collect::<HashSet<_>>()
                .len(),
            Err(_) => {
                warn!("No {} column; driver count unavailable", self.identity_column);
                0
            }
        }
    }

    /// Extract and persist to `sink` unless it is already populated.
    ///
    /// An empty extraction still creates the sink with a header so a rerun
    /// is skipped.
    pub fn run(&self, labeled: &Table, store: &mut dyn SinkStore, sink: &Path) -> Result<ExtractOutcome> {
        if store.is_populated(sink)? {
            info!("{} already exists, NO CHANGE", sink.display());
            return Ok(ExtractOutcome::Skipped);
        }

        let table = self.extract(labeled)?;
        let drivers = self.count_drivers(&table);
        store.append(sink, &table)?;
        info!(
            "Extracted {} rows of {} {} drivers to {}",
            table.len(),
            drivers,
            self.target,
            sink.display()
        );

        Ok(ExtractOutcome::Written { table, drivers })
    }
}
