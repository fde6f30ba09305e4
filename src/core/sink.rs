//! Persisted output sinks.
//!
//! Each pipeline stage writes its output to a sink identified by a path.
//! The [`SinkStore`] trait makes the "already processed" check explicit:
//! a stage asks [`SinkStore::is_populated`] before recomputing, and an
//! operator calls [`SinkStore::invalidate`] to force a rerun.
//!
//! [`FsSinkStore`] backs sinks with CSV files; [`MemorySinkStore`] keeps
//! tables in a map and is used by tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use super::loaders::{self, LoaderError};
use super::table::{SchemaError, Table};
use super::writers::{self, WriteError};

/// Errors raised by sink stores.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to read sink: {0}")]
    Load(#[from] LoaderError),

    #[error("failed to write sink: {0}")]
    Write(#[from] WriteError),

    #[error("schema error in sink: {0}")]
    Schema(#[from] SchemaError),

    #[error("IO error on sink '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("header mismatch appending to '{path}': sink has {existing:?}, table has {incoming:?}")]
    HeaderMismatch {
        path: PathBuf,
        existing: Vec<String>,
        incoming: Vec<String>,
    },
}

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Storage for pipeline outputs keyed by sink path.
pub trait SinkStore {
    /// `true` if the sink exists and holds data (at least a header).
    fn is_populated(&self, sink: &Path) -> Result<bool>;

    /// Reads a sink back; `None` if it does not exist or is empty.
    fn read(&self, sink: &Path) -> Result<Option<Table>>;

    /// Replaces the sink's contents with `table`.
    fn replace(&mut self, sink: &Path, table: &Table) -> Result<()>;

    /// Appends rows without a header if the sink is populated, otherwise
    /// creates it with a header.
    fn append(&mut self, sink: &Path, table: &Table) -> Result<()>;

    /// Removes the sink. Returns `true` if something was removed.
    fn invalidate(&mut self, sink: &Path) -> Result<bool>;
}

/// CSV-file sink store. Relative sink paths are resolved against `root`.
#[derive(Debug, Clone, Default)]
pub struct FsSinkStore {
    root: Option<PathBuf>,
}

impl FsSinkStore {
    /// Store resolving relative paths against the working directory.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Store resolving relative paths against `root`.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Filesystem location of a sink.
    pub fn resolve(&self, sink: &Path) -> PathBuf {
        match &self.root {
            Some(root) if sink.is_relative() => root.join(sink),
            _ => sink.to_path_buf(),
        }
    }
}

impl SinkStore for FsSinkStore {
    fn is_populated(&self, sink: &Path) -> Result<bool> {
        let path = self.resolve(sink);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SinkError::Io { path, source: e }),
        }
    }

    fn read(&self, sink: &Path) -> Result<Option<Table>> {
        if !self.is_populated(sink)? {
            return Ok(None);
        }
        let table = loaders::load_sink_csv(self.resolve(sink))?;
        Ok(Some(table))
    }

    fn replace(&mut self, sink: &Path, table: &Table) -> Result<()> {
        let path = self.resolve(sink);
        debug!("Writing {} rows to {}", table.len(), path.display());
        writers::write_table_csv(&path, table)?;
        Ok(())
    }

    fn append(&mut self, sink: &Path, table: &Table) -> Result<()> {
        let path = self.resolve(sink);
        if self.is_populated(sink)? {
            let existing = loaders::read_header(&path)?;
            if existing != table.headers() {
                return Err(SinkError::HeaderMismatch {
                    path,
                    existing,
                    incoming: table.headers().to_vec(),
                });
            }
            debug!("Appending {} rows to {}", table.len(), path.display());
            writers::append_table_csv(&path, table)?;
        } else {
            debug!("Creating {} with {} rows", path.display(), table.len());
            writers::write_table_csv(&path, table)?;
        }
        Ok(())
    }

    fn invalidate(&mut self, sink: &Path) -> Result<bool> {
        let path = self.resolve(sink);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SinkError::Io { path, source: e }),
        }
    }
}

/// In-memory sink store.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkStore {
    tables: HashMap<PathBuf, Table>,
}

impl MemorySinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a stored table directly.
    pub fn get(&self, sink: &Path) -> Option<&Table> {
        self.tables.get(sink)
    }

    /// Number of sinks currently held.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl SinkStore for MemorySinkStore {
    fn is_populated(&self, sink: &Path) -> Result<bool> {
        Ok(self.tables.contains_key(sink))
    }

    fn read(&self, sink: &Path) -> Result<Option<Table>> {
        Ok(self.tables.get(sink).cloned())
    }

    fn replace(&mut self, sink: &Path, table: &Table) -> Result<()> {
        self.tables.insert(sink.to_path_buf(), table.clone());
        Ok(())
    }

    fn append(&mut self, sink: &Path, table: &Table) -> Result<()> {
        match self.tables.get_mut(sink) {
            Some(existing) => {
                if existing.headers() != table.headers() {
                    return Err(SinkError::HeaderMismatch {
                        path: sink.to_path_buf(),
                        existing: existing.headers().to_vec(),
                        incoming: table.headers().to_vec(),
                    });
                }
                for row in table.rows() {
                    existing.push_row(row.clone())?;
                }
            }
            None => {
                self.tables.insert(sink.to_path_buf(), table.clone());
            }
        }
        Ok(())
    }

    fn invalidate(&mut self, sink: &Path) -> Result<bool> {
        Ok(self.tables.remove(sink).is_some())
    }
}
