//! Command-line interface for the stop-ambiguity pipeline.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{State, StateConfig};
use crate::core::sink::{FsSinkStore, SinkStore};
use crate::core::table::{KeySpec, Table};
use crate::pipeline::{self, SinkSelection, DEFAULT_EXPORT_COLUMNS};
use crate::processors::{ExtractOutcome, FilterOutcome, RaceLabeler};
use crate::stats::{self, StateStats, TTest};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "stop-ambiguity")]
#[command(about = "Driver identity grouping and race-ambiguity extraction for traffic stops", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one state
    Run {
        /// State whose export is being processed
        #[arg(value_enum)]
        state: State,
        /// Raw traffic-stop CSV
        input_csv: PathBuf,
    },

    /// Delete output sinks so the next run recomputes them
    Invalidate {
        #[arg(value_enum)]
        state: State,
        /// Identity-tagged output
        #[arg(long)]
        raw: bool,
        /// Repeat-stop filtered output
        #[arg(long)]
        grouped: bool,
        /// Ambiguous-driver output
        #[arg(long)]
        ambiguous: bool,
        /// All three sinks
        #[arg(long, conflicts_with_all = ["raw", "grouped", "ambiguous"])]
        all: bool,
    },

    /// Summary statistics, rate tables and t-tests
    Stats {
        #[arg(value_enum)]
        state: State,
        /// Grouped CSV to analyse instead of the state's grouped sink
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Project processed CSVs onto shareable columns and anonymize ids
    Export {
        /// Processed CSV files
        #[arg(required = true)]
        csv_files: Vec<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "csv/processed")]
        output_dir: PathBuf,
        /// Columns to keep (defaults to the standard export set)
        #[arg(short, long)]
        keep: Vec<String>,
        /// Canonicalize driver_id/officer_id to integers before hashing
        #[arg(long)]
        integer_ids: bool,
    },

    /// Plot the stops-per-driver histogram of the grouped sink (PNG)
    Plot {
        #[arg(value_enum)]
        state: State,
        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,
        /// Smallest stop count shown
        #[arg(long)]
        min: Option<usize>,
        /// Largest stop count shown
        #[arg(long)]
        max: Option<usize>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::Run { state, input_csv } => cmd_run(config.for_state(state), &input_csv),
        Commands::Invalidate {
            state,
            raw,
            grouped,
            ambiguous,
            all,
        } => {
            let selection = if all {
                SinkSelection::ALL
            } else {
                SinkSelection {
                    raw,
                    grouped,
                    ambiguous,
                }
            };
            cmd_invalidate(config.for_state(state), selection)
        }
        Commands::Stats { state, input } => cmd_stats(config.for_state(state), input.as_deref()),
        Commands::Export {
            csv_files,
            output_dir,
            keep,
            integer_ids,
        } => cmd_export(&csv_files, &output_dir, keep, integer_ids),
        Commands::Plot {
            state,
            output,
            min,
            max,
        } => cmd_plot(config.for_state(state), &output, min, max),
        Commands::InitConfig { path } => cmd_init_config(&config, &path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn describe_filter(outcome: &FilterOutcome) -> String {
    match outcome {
        FilterOutcome::Skipped => "skipped (sink populated)".to_string(),
        FilterOutcome::Written { groups, rows } => format!("{} drivers, {} rows", groups, rows),
    }
}

fn describe_extract(outcome: &ExtractOutcome) -> String {
    match outcome {
        ExtractOutcome::Skipped => "skipped (sink populated)".to_string(),
        ExtractOutcome::Written { table, drivers } => {
            format!("{} drivers, {} rows", drivers, table.len())
        }
    }
}

fn cmd_run(config: &StateConfig, input_csv: &Path) -> Result<()> {
    let start = Instant::now();

    println!("Running {} pipeline...", config.state);
    println!("Input: {}", input_csv.display());

    let spinner = create_spinner("Grouping drivers and extracting ambiguous stops...");
    let mut store = FsSinkStore::new();
    let report = pipeline::run_state_file(config, input_csv, &mut store);
    spinner.finish_and_clear();
    let report = report.with_context(|| format!("{} pipeline failed", config.state))?;

    let target_drivers = report
        .label_counts
        .get(&config.target_race_combo)
        .copied()
        .unwrap_or(0);

    print_summary(
        &format!("{} Pipeline Complete", config.state),
        &[
            ("Input rows", report.input_rows.to_string()),
            ("Standardized rows", report.standardized_rows.to_string()),
            ("Complete rows", report.complete_rows.to_string()),
            ("Driver groups", report.drivers.to_string()),
            ("Raw sink", config.sinks.raw.display().to_string()),
            ("Repeat-stop filter", describe_filter(&report.filter)),
            ("Labeled drivers", report.labeled_drivers.to_string()),
            (config.target_race_combo.as_str(), target_drivers.to_string()),
            ("Extraction", describe_extract(&report.extract)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_invalidate(config: &StateConfig, selection: SinkSelection) -> Result<()> {
    if selection.is_empty() {
        bail!("nothing to invalidate: pass --raw, --grouped, --ambiguous or --all");
    }

    let mut store = FsSinkStore::new();
    let removed = pipeline::invalidate_sinks(config, &mut store, selection)
        .with_context(|| format!("failed to invalidate {} sinks", config.state))?;

    print_summary(
        &format!("{} Sinks Invalidated", config.state),
        &[
            ("Removed", removed.len().to_string()),
            ("Files", removed.join(", ")),
        ],
    );
    Ok(())
}

/// Grouped table to analyse, labeled with the aggregated race string.
fn load_labeled(config: &StateConfig, input: Option<&Path>) -> Result<Table> {
    let table = match input {
        Some(path) => crate::core::loaders::load_table_csv(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => FsSinkStore::new()
            .read(&config.sinks.grouped)?
            .with_context(|| {
                format!(
                    "{} is missing or empty; run the pipeline first",
                    config.sinks.grouped.display()
                )
            })?,
    };

    if table.has_column(&config.race_str_column) {
        return Ok(table);
    }
    let (labeled, _) = RaceLabeler::from_config(config).label(&table)?;
    Ok(labeled)
}

fn format_ttest(test: &Option<TTest>) -> String {
    match test {
        Some(t) => format!("t={:.3}, p={:.4}, df={}", t.statistic, t.p_value, t.df),
        None => "insufficient data".to_string(),
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

fn print_stats(state: State, stats: &StateStats) {
    let mut overview = vec![
        ("Complete rows", stats.completeness.complete_rows.to_string()),
        ("Complete groups", stats.completeness.groups.to_string()),
    ];
    if let Some(stops) = &stats.stops {
        overview.push(("Drivers", stops.drivers.to_string()));
        overview.push(("Min stops", stops.min.to_string()));
        overview.push(("Max stops", stops.max.to_string()));
        overview.push(("Mean stops", format!("{:.3}", stops.mean)));
        overview.push(("Median stops", format!("{:.1}", stops.median)));
    }
    overview.push(("Ambiguous rows", stats.ambiguity.ambiguous_rows.to_string()));
    overview.push(("Ambiguous drivers", stats.ambiguity.ambiguous_drivers.to_string()));
    overview.push(("Hispanic/White rows", stats.ambiguity.hispanic_white_rows.to_string()));
    print_summary(&format!("{} Statistics", state), &overview);

    if !stats.combinations.is_empty() {
        let combos: Vec<(&str, String)> = stats
            .combinations
            .iter()
            .map(|(label, n)| (label.as_str(), n.to_string()))
            .collect();
        print_summary("Race Combinations (drivers)", &combos);
    }

    for outcome in &stats.outcomes {
        let mut rows: Vec<(&str, String)> = outcome
            .rates
            .iter()
            .map(|r| {
                (
                    r.name.as_str(),
                    format!(
                        "{} ±{} ({}/{})",
                        format_optional(r.rate),
                        format_optional(r.sem),
                        r.entries,
                        r.groups
                    ),
                )
            })
            .collect();
        rows.push(("Unpaired t-test", format_ttest(&outcome.unpaired)));
        rows.push(("Paired t-test", format_ttest(&outcome.paired)));
        print_summary(&format!("Rates: {}", outcome.column), &rows);
    }
}

fn cmd_stats(config: &StateConfig, input: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let spinner = create_spinner("Computing statistics...");

    let result = load_labeled(config, input).and_then(|table| {
        stats::summarize(&table, config).context("failed to compute statistics")
    });
    spinner.finish_and_clear();

    let summary = result?;
    print_stats(config.state, &summary);
    info!("Statistics computed in {:.2?}", start.elapsed());
    Ok(())
}

fn cmd_export(csv_files: &[PathBuf], output_dir: &Path, keep: Vec<String>, integer_ids: bool) -> Result<()> {
    let start = Instant::now();
    let keep = if keep.is_empty() {
        DEFAULT_EXPORT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        keep
    };

    let mut outputs = Vec::with_capacity(csv_files.len());
    let mut rows = 0;
    for csv in csv_files {
        let spinner = create_spinner(&format!("Exporting {}...", csv.display()));
        let report = pipeline::export_processed(csv, output_dir, &keep, integer_ids);
        spinner.finish_and_clear();

        let report = report.with_context(|| format!("failed to export {}", csv.display()))?;
        rows += report.rows;
        outputs.push(report.output.display().to_string());
    }

    print_summary(
        "Export Complete",
        &[
            ("Files", outputs.len().to_string()),
            ("Rows", rows.to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Integer ids", integer_ids.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_plot(config: &StateConfig, output: &Path, min: Option<usize>, max: Option<usize>) -> Result<()> {
    use crate::visualization;

    let start = Instant::now();
    let grouped = FsSinkStore::new()
        .read(&config.sinks.grouped)?
        .with_context(|| format!("{} is missing or empty", config.sinks.grouped.display()))?;

    let spec = KeySpec::resolve(&grouped, &config.grouping_keys, &config.integer_keys)?;
    let counts = stats::stops_per_driver(&grouped, &spec);
    let range = match (min, max) {
        (None, None) => None,
        (lo, hi) => Some((
            lo.unwrap_or(config.stop_count_range.min),
            hi.unwrap_or(config.stop_count_range.max),
        )),
    };

    let spinner = create_spinner("Generating plot...");
    let result = visualization::plot_stop_histogram(output, &counts, range);
    spinner.finish_and_clear();
    result.context("visualization failed")?;

    print_summary(
        "Visualization Complete",
        &[
            ("Input file", config.sinks.grouped.display().to_string()),
            ("Output PNG", output.display().to_string()),
            ("Drivers", counts.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_init_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    config
        .to_yaml(path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
