//! Driver identity grouping and perceived-race ambiguity extraction for
//! traffic-stop records.
//!
//! This crate provides tools for:
//! - Loading stop exports from CSV with pandas-style missing values
//! - Per-state column standardization (AZ, CO, TX)
//! - Grouping stops into driver identities by a configurable key tuple
//! - Keeping drivers with a bounded number of repeat stops
//! - Labeling drivers with every race recorded for them and extracting the
//!   drivers recorded as both White and Hispanic
//! - Rate tables, t-tests and stop-frequency plots over the results
//!
//! # Example
//!
//! ```no_run
//! use stop_ambiguity::config::{State, StateConfig};
//! use stop_ambiguity::core::sink::FsSinkStore;
//! use stop_ambiguity::pipeline::run_state_file;
//!
//! let config = StateConfig::preset(State::Co);
//! let mut store = FsSinkStore::new();
//! let report = run_state_file(&config, "csv/co_statewide.csv", &mut store).unwrap();
//! println!("{} drivers", report.drivers);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod stats;
pub mod visualization;

pub use config::{PipelineConfig, State, StateConfig};
pub use core::table::{KeyField, KeyTuple, Table};
pub use pipeline::{run_state_pipeline, PipelineError, PipelineReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
