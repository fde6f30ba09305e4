//! Core data types and I/O operations.

pub mod loaders;
pub mod sink;
pub mod table;
pub mod transforms;
pub mod writers;

pub use loaders::{load_table_csv, LoaderError};
pub use sink::{FsSinkStore, MemorySinkStore, SinkError, SinkStore};
pub use table::{KeyField, KeySpec, KeyTuple, Row, SchemaError, Table};
pub use writers::{write_table_csv, WriteError};
