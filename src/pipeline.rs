//! End-to-end run for one state.
//!
//! Stages run strictly in order, each fully materializing its output:
//! standardize, year filter, identity grouping (written to the raw sink),
//! repeat-stop filtering (grouped sink), race labeling of the grouped sink's
//! contents, and ambiguity extraction (ambiguous sink).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::config::{ConfigError, State, StateConfig};
use crate::core::loaders::{self, LoaderError};
use crate::core::sink::{SinkError, SinkStore};
use crate::core::table::{SchemaError, Table};
use crate::core::transforms;
use crate::core::writers::{self, WriteError};
use crate::processors::{
    standardizer_for, AmbiguityExtractor, ExtractError, ExtractOutcome, FilterError,
    FilterOutcome, GroupingError, IdentityGrouper, LabelError, RaceLabeler, RepeatStopFilter,
    StandardizeError, StopPredicate,
};

/// Any failure that halts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load input: {0}")]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Standardize(#[from] StandardizeError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("grouping failed: {0}")]
    Grouping(#[from] GroupingError),

    #[error("filtering failed: {0}")]
    Filter(#[from] FilterError),

    #[error("labeling failed: {0}")]
    Label(#[from] LabelError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to write output: {0}")]
    Write(#[from] WriteError),
}

/// Result type for pipeline runs.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Counts and outcomes of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub state: State,
    pub input_rows: usize,
    pub standardized_rows: usize,
    /// Rows with a complete key, race and outcome.
    pub complete_rows: usize,
    pub drivers: usize,
    pub filter: FilterOutcome,
    /// Drivers present in the grouped sink when labeling ran.
    pub labeled_drivers: usize,
    /// Drivers per aggregated race string in the grouped sink.
    pub label_counts: BTreeMap<String, usize>,
    pub extract: ExtractOutcome,
}

/// Run every stage for one state against `store`.
///
/// The raw sink is rewritten on every run. The grouped and ambiguous sinks
/// are left untouched when already populated; labeling always reads the
/// grouped sink's current contents.
///
/// # Arguments
///
/// * `config` - State settings; validated before anything runs
/// * `raw` - Unmodified input table
/// * `store` - Sink store that owns the three outputs
///
/// # Errors
///
/// Returns the first error raised by any stage. Nothing is retried.
pub fn run_state_pipeline(
    config: &StateConfig,
    raw: Table,
    store: &mut dyn SinkStore,
) -> Result<PipelineReport> {
    config.validate()?;
    let input_rows = raw.len();
    info!("{}: {} input rows", config.state, input_rows);

    let mut table = standardizer_for(config.state).normalize(raw)?;
    if !config.keep_years.is_empty() {
        table = transforms::filter_years(&table, &config.date_column, &config.keep_years)?;
        info!(
            "Rows remaining after keeping years {:?}: {}",
            config.keep_years,
            table.len()
        );
    }
    let standardized_rows = table.len();

    let grouped = IdentityGrouper::from_config(config).group(&table)?;
    grouped.persist(store, &config.sinks.raw)?;

    let predicate = StopPredicate::from_config(config)?;
    let filter = RepeatStopFilter::new(predicate).run(&grouped, store, &config.sinks.grouped)?;

    let retained = match store.read(&config.sinks.grouped)? {
        Some(table) => table,
        None => Table::new(grouped.table().headers().to_vec())?,
    };
    let (labeled, labels) = RaceLabeler::from_config(config).label(&retained)?;
    let label_counts = labels
        .label_counts()
        .into_iter()
        .map(|(label, n)| (label.to_string(), n))
        .collect();

    let extract =
        AmbiguityExtractor::from_config(config).run(&labeled, store, &config.sinks.ambiguous)?;

    Ok(PipelineReport {
        state: config.state,
        input_rows,
        standardized_rows,
        complete_rows: grouped.table().len(),
        drivers: grouped.num_drivers(),
        filter,
        labeled_drivers: labels.len(),
        label_counts,
        extract,
    })
}

/// Load `input` as CSV and run the pipeline on it.
pub fn run_state_file<P: AsRef<Path>>(
    config: &StateConfig,
    input: P,
    store: &mut dyn SinkStore,
) -> Result<PipelineReport> {
    let raw = loaders::load_table_csv(input)?;
    run_state_pipeline(config, raw, store)
}

/// Which sinks to remove before a rerun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSelection {
    pub raw: bool,
    pub grouped: bool,
    pub ambiguous: bool,
}

impl SinkSelection {
    pub const ALL: SinkSelection = SinkSelection {
        raw: true,
        grouped: true,
        ambiguous: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.raw || self.grouped || self.ambiguous)
    }
}

/// Invalidate the selected sinks; returns the paths that existed.
pub fn invalidate_sinks(
    config: &StateConfig,
    store: &mut dyn SinkStore,
    selection: SinkSelection,
) -> Result<Vec<String>> {
    let targets = [
        (selection.raw, &config.sinks.raw),
        (selection.grouped, &config.sinks.grouped),
        (selection.ambiguous, &config.sinks.ambiguous),
    ];

    let mut removed = Vec::new();
    for (selected, sink) in targets {
        if selected && store.invalidate(sink)? {
            info!("Invalidated {}", sink.display());
            removed.push(sink.display().to_string());
        }
    }
    Ok(removed)
}

/// Columns kept by [`export_processed`] when no keep-list is given.
pub const DEFAULT_EXPORT_COLUMNS: [&str; 15] = [
    "violation",
    "search_conducted",
    "county_name",
    "stop_duration",
    "officer_id",
    "state",
    "driver_race",
    "stop_time",
    "is_arrested",
    "driver_id",
    "county_fips",
    "stop_date",
    "contraband_found",
    "date",
    "time",
];

/// Identifier columns replaced by their digest on export.
pub const ANONYMIZED_COLUMNS: [&str; 2] = ["officer_id", "driver_id"];

/// Summary of one exported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub output: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
    pub anonymized: Vec<String>,
}

/// Project a processed CSV onto `keep`, anonymize its identifier columns,
/// and write it to `output_dir/filtered_<name>`.
///
/// With `integer_ids`, identifier cells are first rewritten as canonical
/// integers so `"12.0"` and `"12"` hash alike; non-numeric ids become
/// missing.
pub fn export_processed(
    input: &Path,
    output_dir: &Path,
    keep: &[String],
    integer_ids: bool,
) -> Result<ExportReport> {
    let table = loaders::load_table_csv(input)?;
    let mut table = transforms::select_existing_columns(&table, keep)?;

    if integer_ids {
        for column in ANONYMIZED_COLUMNS {
            if table.has_column(column) {
                transforms::canonicalize_int_column(&mut table, column)?;
            }
        }
    }
    let anonymized = transforms::anonymize_columns(&mut table, &ANONYMIZED_COLUMNS)?;

    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output.csv".to_string());
    let output = output_dir.join(format!("filtered_{}", name));
    writers::write_table_csv(&output, &table)?;
    info!("Exported {} rows to {}", table.len(), output.display());

    Ok(ExportReport {
        output,
        rows: table.len(),
        columns: table.headers().to_vec(),
        anonymized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::{FsSinkStore, MemorySinkStore};
    use crate::core::table::{headers, row};
    use tempfile::TempDir;

    const AZ_HEADERS: [&str; 7] = [
        "SubjectFirstName",
        "SubjectLastName",
        "VehicleStyle",
        "VehicleYear",
        "driver_race",
        "search_conducted",
        "officer_id",
    ];

    fn az_stop(first: &str, last: &str, race: &str) -> Vec<Option<String>> {
        row(&[first, last, "sedan", "2004", race, "False", "77"])
    }

    fn az_config() -> StateConfig {
        StateConfig::preset(State::Az)
    }

    fn scenario() -> Table {
        Table::from_rows(
            headers(&AZ_HEADERS),
            vec![
                az_stop("j", "s", "White"),
                az_stop("J", "S", "Hispanic"),
                az_stop("K", "L", "White"),
                az_stop("J", "S", "White"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_ambiguous_driver() {
        let config = az_config();
        let mut store = MemorySinkStore::new();
        let report = run_state_pipeline(&config, scenario(), &mut store).unwrap();

        assert_eq!(report.input_rows, 4);
        assert_eq!(report.complete_rows, 4);
        assert_eq!(report.drivers, 2);
        assert_eq!(report.filter, FilterOutcome::Written { groups: 1, rows: 3 });
        assert_eq!(report.label_counts.get("Hispanic_White"), Some(&1));

        let ambiguous = store.get(&config.sinks.ambiguous).unwrap();
        assert_eq!(ambiguous.len(), 3);
        assert_eq!(ambiguous.headers()[2], "race_str");
        for i in 0..ambiguous.len() {
            assert_eq!(ambiguous.cell(i, 0), Some("0"));
            assert_eq!(ambiguous.cell(i, 2), Some("Hispanic_White"));
        }
    }

    #[test]
    fn test_single_stop_driver_never_retained() {
        let config = az_config();
        let mut store = MemorySinkStore::new();
        run_state_pipeline(&config, scenario(), &mut store).unwrap();

        let raw = store.get(&config.sinks.raw).unwrap();
        assert!(raw.rows().iter().any(|r| r[1].as_deref() == Some("K")));

        for sink in [&config.sinks.grouped, &config.sinks.ambiguous] {
            let table = store.get(sink).unwrap();
            let first = table.column_index("SubjectFirstName").unwrap();
            assert!(table.rows().iter().all(|r| r[first].as_deref() != Some("K")));
        }
    }

    #[test]
    fn test_only_single_stop_drivers() {
        let config = az_config();
        let mut store = MemorySinkStore::new();
        let table = Table::from_rows(headers(&AZ_HEADERS), vec![az_stop("K", "L", "White")]).unwrap();

        let report = run_state_pipeline(&config, table, &mut store).unwrap();
        assert_eq!(report.filter, FilterOutcome::Written { groups: 0, rows: 0 });
        assert!(store.get(&config.sinks.grouped).is_none());
        assert_eq!(store.get(&config.sinks.ambiguous).unwrap().len(), 0);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let config = az_config();
        let mut store = MemorySinkStore::new();
        run_state_pipeline(&config, scenario(), &mut store).unwrap();
        let grouped = store.get(&config.sinks.grouped).unwrap().clone();
        let ambiguous = store.get(&config.sinks.ambiguous).unwrap().clone();

        let report = run_state_pipeline(&config, scenario(), &mut store).unwrap();
        assert_eq!(report.filter, FilterOutcome::Skipped);
        assert_eq!(report.extract, ExtractOutcome::Skipped);
        assert_eq!(store.get(&config.sinks.grouped).unwrap(), &grouped);
        assert_eq!(store.get(&config.sinks.ambiguous).unwrap(), &ambiguous);

        let removed = invalidate_sinks(&config, &mut store, SinkSelection::ALL).unwrap();
        assert_eq!(removed.len(), 3);
        let report = run_state_pipeline(&config, scenario(), &mut store).unwrap();
        assert!(matches!(report.filter, FilterOutcome::Written { .. }));
    }

    #[test]
    fn test_missing_key_column_is_fatal() {
        let mut config = az_config();
        config.grouping_keys.push("DOB".to_string());
        let mut store = MemorySinkStore::new();
        let err = run_state_pipeline(&config, scenario(), &mut store).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Grouping(GroupingError::Schema(SchemaError::MissingColumn(_)))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_run_against_filesystem() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("az.csv");
        std::fs::write(
            &input,
            "SubjectFirstName,SubjectLastName,VehicleStyle,VehicleYear,driver_race,search_conducted,officer_id\n\
             J,S,sedan,2004,White,False,1\n\
             J,S,sedan,2004.0,Hispanic,True,1\n\
             J,S,sedan,2004,Hispanic,NA,1\n\
             J,S,SEDAN,2004,Hispanic,False,2\n",
        )
        .unwrap();

        let config = az_config();
        let mut store = FsSinkStore::with_root(dir.path());
        let report = run_state_file(&config, &input, &mut store).unwrap();

        // "2004.0" is not an integer year and "NA" is a missing outcome
        assert_eq!(report.complete_rows, 2);
        assert_eq!(report.filter, FilterOutcome::Written { groups: 1, rows: 2 });
        assert_eq!(report.extract.rows(), 2);
        assert!(dir.path().join(&config.sinks.ambiguous).is_file());
    }

    #[test]
    fn test_na_spelled_surname_survives_sink_readback() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("co.csv");
        std::fs::write(
            &input,
            "driver_first_name,driver_last_name,DOB,driver_race,search_conducted\n\
             Ana,Na,1990-03-04,White,False\n\
             ana,na,1990-03-04,Hispanic,True\n\
             Ed,Null,1982-07-19,Black,False\n\
             ED,NULL,1982-07-19,Black,False\n",
        )
        .unwrap();

        let config = StateConfig::preset(State::Co);
        let mut store = FsSinkStore::with_root(dir.path());
        let report = run_state_file(&config, &input, &mut store).unwrap();

        assert_eq!(report.filter, FilterOutcome::Written { groups: 2, rows: 4 });
        assert_eq!(report.labeled_drivers, 2);
        assert_eq!(report.label_counts.get("Hispanic_White"), Some(&1));
        assert_eq!(report.extract.rows(), 2);

        let grouped = store.read(&config.sinks.grouped).unwrap().unwrap();
        let last = grouped.column_index("driver_last_name").unwrap();
        assert!(grouped.rows().iter().any(|r| r[last].as_deref() == Some("NA")));
        assert!(grouped.rows().iter().any(|r| r[last].as_deref() == Some("NULL")));
    }

    #[test]
    fn test_keep_years_filter() {
        let mut config = az_config();
        config.keep_years = vec![2016];
        let mut table = scenario();
        let dates = vec![
            Some("2016-02-01".to_string()),
            Some("2016-03-01".to_string()),
            Some("2016-04-01".to_string()),
            Some("2015-12-31".to_string()),
        ];
        table.insert_column(0, "date", dates).unwrap();

        let mut store = MemorySinkStore::new();
        let report = run_state_pipeline(&config, table, &mut store).unwrap();
        assert_eq!(report.standardized_rows, 3);
        assert_eq!(report.filter, FilterOutcome::Written { groups: 1, rows: 2 });
    }

    #[test]
    fn test_export_processed() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tx_grouped.csv");
        std::fs::write(
            &input,
            "driver_id,HA_N_FIRST_DRVR,driver_race,officer_id,search_conducted\n\
             3,ANA,White,12.0,False\n\
             3,ANA,Hispanic,12,True\n\
             4,BO,White,,False\n",
        )
        .unwrap();
        let out_dir = dir.path().join("processed");
        let keep: Vec<String> = DEFAULT_EXPORT_COLUMNS.iter().map(|c| c.to_string()).collect();

        let report = export_processed(&input, &out_dir, &keep, true).unwrap();
        assert_eq!(report.output, out_dir.join("filtered_tx_grouped.csv"));
        assert_eq!(report.rows, 3);
        assert_eq!(report.columns, vec!["driver_id", "driver_race", "officer_id", "search_conducted"]);
        assert_eq!(report.anonymized, vec!["officer_id", "driver_id"]);

        let written = loaders::load_table_csv(&report.output).unwrap();
        assert_eq!(written.cell(0, 0), Some(transforms::hash_identifier("3").as_str()));
        assert_eq!(written.cell(0, 2), written.cell(1, 2));
        assert_eq!(written.cell(2, 2), None);
    }
}
