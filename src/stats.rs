//! Descriptive statistics and significance tests over grouped stops.
//!
//! Everything here reads a table that has already been through the
//! pipeline: identity-tagged, and for the rate tables and t-tests, labeled
//! with the aggregated race string.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::f64::consts::PI;

use thiserror::Error;

use crate::config::StateConfig;
use crate::core::table::{KeySpec, KeyTuple, Row, SchemaError, Table};
use crate::processors::grouping::group_by_key;
use crate::processors::race_labels::aggregate_race;

/// Outcome columns examined, in report order, when present.
pub const OUTCOME_COLUMNS: [&str; 2] = ["is_arrested", "search_conducted"];

const WHITE: &str = "White";
const HISPANIC: &str = "Hispanic";

/// Errors that can occur while computing statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("column '{column}' row {row}: '{value}' is not a boolean or number")]
    InvalidOutcome {
        column: String,
        row: usize,
        value: String,
    },
}

/// Result type for statistics.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Interpret an outcome cell as 0/1 or a number.
pub fn outcome_value(raw: &str) -> Option<f64> {
    match raw.trim() {
        "True" | "true" | "TRUE" => Some(1.0),
        "False" | "false" | "FALSE" => Some(0.0),
        other => other.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Parsed outcome column; missing cells stay `None`.
fn outcomes(table: &Table, column: &str) -> Result<Vec<Option<f64>>> {
    let idx = table.column_index(column)?;
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| match row[idx].as_deref() {
            None => Ok(None),
            Some(raw) => outcome_value(raw).map(Some).ok_or_else(|| StatsError::InvalidOutcome {
                column: column.to_string(),
                row: i,
                value: raw.to_string(),
            }),
        })
        .collect()
}

/// Outcome columns of [`OUTCOME_COLUMNS`] present in `table`.
pub fn outcome_columns(table: &Table) -> Vec<&'static str> {
    OUTCOME_COLUMNS
        .iter()
        .copied()
        .filter(|c| table.has_column(c))
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample variance (n - 1 denominator).
fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Standard error of the mean.
fn sem(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(|v| (v / values.len() as f64).sqrt())
}

/// Rows with every key, the race, and the outcome present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletenessReport {
    pub columns: Vec<String>,
    pub complete_rows: usize,
    pub groups: usize,
}

/// Count complete rows and the distinct drivers among them.
pub fn completeness(table: &Table, config: &StateConfig) -> Result<CompletenessReport> {
    let spec = KeySpec::resolve(table, &config.grouping_keys, &config.integer_keys)?;
    let race = table.column_index(&config.race_column)?;
    let outcome = table.column_index(&config.outcome_column)?;

    let mut drivers: HashSet<KeyTuple> = HashSet::new();
    let mut complete_rows = 0;
    for row in table.rows() {
        if row[race].is_none() || row[outcome].is_none() {
            continue;
        }
        if let Some(key) = spec.extract(row) {
            complete_rows += 1;
            drivers.insert(key);
        }
    }

    let mut columns = config.grouping_keys.clone();
    columns.push(config.race_column.clone());
    columns.push(config.outcome_column.clone());
    Ok(CompletenessReport {
        columns,
        complete_rows,
        groups: drivers.len(),
    })
}

/// Distribution of stops per driver.
#[derive(Debug, Clone, PartialEq)]
pub struct StopSummary {
    pub drivers: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
}

/// Stop counts of every driver in `table`, in key order.
pub fn stops_per_driver(table: &Table, spec: &KeySpec) -> Vec<usize> {
    group_by_key(table, spec).values().map(Vec::len).collect()
}

impl StopSummary {
    /// `None` when there are no drivers.
    pub fn from_counts(counts: &[usize]) -> Option<Self> {
        let min = *counts.iter().min()?;
        let max = *counts.iter().max()?;
        let as_f64: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        let mean = mean(&as_f64)?;

        let mut sorted = counts.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
        } else {
            sorted[mid] as f64
        };

        Some(Self {
            drivers: counts.len(),
            min,
            max,
            mean,
            median,
        })
    }
}

/// Race label set of every driver, keyed by driver.
fn race_sets<'a>(
    table: &'a Table,
    spec: &KeySpec,
    race: usize,
) -> BTreeMap<KeyTuple, (BTreeSet<&'a str>, Vec<&'a Row>)> {
    let mut sets: BTreeMap<KeyTuple, (BTreeSet<&str>, Vec<&Row>)> = BTreeMap::new();
    for row in table.rows() {
        if let Some(key) = spec.extract(row) {
            let entry = sets.entry(key).or_default();
            if let Some(r) = row[race].as_deref() {
                entry.0.insert(r);
            }
            entry.1.push(row);
        }
    }
    sets
}

fn is_hispanic_white(races: &BTreeSet<&str>) -> bool {
    races.len() == 2 && races.contains(WHITE) && races.contains(HISPANIC)
}

/// How many stops and drivers carry more than one recorded race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmbiguitySummary {
    pub ambiguous_rows: usize,
    pub ambiguous_drivers: usize,
    pub hispanic_white_rows: usize,
}

pub fn ambiguity_summary(table: &Table, spec: &KeySpec, race_column: &str) -> Result<AmbiguitySummary> {
    let race = table.column_index(race_column)?;
    let mut summary = AmbiguitySummary::default();
    for (races, rows) in race_sets(table, spec, race).values() {
        if races.len() > 1 {
            summary.ambiguous_rows += rows.len();
            summary.ambiguous_drivers += 1;
        }
        if is_hispanic_white(races) {
            summary.hispanic_white_rows += rows.len();
        }
    }
    Ok(summary)
}

/// Number of drivers for each multi-race aggregated string.
pub fn enumerate_ambiguity(
    table: &Table,
    spec: &KeySpec,
    race_column: &str,
) -> Result<BTreeMap<String, usize>> {
    let race = table.column_index(race_column)?;
    let mut counts = BTreeMap::new();
    for (races, _) in race_sets(table, spec, race).values() {
        if races.len() > 1 {
            let owned: BTreeSet<String> = races.iter().map(|r| r.to_string()).collect();
            *counts.entry(aggregate_race(&owned)).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Outcome rate for one segment of stops.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRate {
    pub name: String,
    /// Mean outcome over non-missing cells.
    pub rate: Option<f64>,
    pub sem: Option<f64>,
    /// Matching rows, including those with a missing outcome.
    pub entries: usize,
    pub groups: usize,
}

struct Segment {
    name: String,
    race_str: HashSet<String>,
    recorded: HashSet<String>,
}

fn set_of(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Column names used by the rate table and t-tests.
#[derive(Debug, Clone, Copy)]
pub struct LabeledColumns<'a> {
    pub race: &'a str,
    pub race_str: &'a str,
    pub target: &'a str,
}

impl<'a> LabeledColumns<'a> {
    pub fn from_config(config: &'a StateConfig) -> Self {
        Self {
            race: &config.race_column,
            race_str: &config.race_str_column,
            target: &config.target_race_combo,
        }
    }
}

/// Rate table of one outcome column.
///
/// Segments: single-race White and Hispanic drivers; drivers labeled with
/// the target combination split by the race recorded at the stop (White,
/// Hispanic, either); every multi-race driver; and the whole table.
pub fn segment_rates(
    table: &Table,
    spec: &KeySpec,
    columns: LabeledColumns<'_>,
    outcome: &str,
) -> Result<Vec<SegmentRate>> {
    let race = table.column_index(columns.race)?;
    let race_str = table.column_index(columns.race_str)?;
    let values = outcomes(table, outcome)?;

    // aggregated strings that never appear as a recorded race are multi-race
    let recorded: HashSet<&str> = table.rows().iter().filter_map(|r| r[race].as_deref()).collect();
    let observed: HashSet<String> = recorded.iter().map(|r| r.to_string()).collect();
    let multi: HashSet<String> = table
        .rows()
        .iter()
        .filter_map(|r| r[race_str].as_deref())
        .filter(|s| !recorded.contains(s))
        .map(str::to_string)
        .collect();

    let target = set_of(&[columns.target]);
    let mut segments = vec![
        Segment {
            name: format!("{WHITE}_{outcome}_{WHITE}"),
            race_str: set_of(&[WHITE]),
            recorded: set_of(&[WHITE]),
        },
        Segment {
            name: format!("{HISPANIC}_{outcome}_{HISPANIC}"),
            race_str: set_of(&[HISPANIC]),
            recorded: set_of(&[HISPANIC]),
        },
    ];
    for split in [vec![WHITE], vec![HISPANIC], vec![HISPANIC, WHITE]] {
        segments.push(Segment {
            name: format!("{}_{}_{}", columns.target, outcome, split.concat()),
            race_str: target.clone(),
            recorded: set_of(&split),
        });
    }
    segments.push(Segment {
        name: format!("Ambiguous_{outcome}"),
        race_str: multi,
        recorded: observed,
    });

    let mut rates = Vec::with_capacity(segments.len() + 1);
    for segment in &segments {
        let matches: Vec<usize> = (0..table.len())
            .filter(|&i| {
                let row = &table.rows()[i];
                let in_str = row[race_str]
                    .as_deref()
                    .map_or(false, |s| segment.race_str.contains(s));
                let in_race = row[race]
                    .as_deref()
                    .map_or(false, |r| segment.recorded.contains(r));
                in_str && in_race
            })
            .collect();
        rates.push(rate_of(&segment.name, table, spec, &values, &matches));
    }

    let all: Vec<usize> = (0..table.len()).collect();
    rates.push(rate_of(&format!("whole_{outcome}"), table, spec, &values, &all));
    Ok(rates)
}

fn rate_of(name: &str, table: &Table, spec: &KeySpec, values: &[Option<f64>], rows: &[usize]) -> SegmentRate {
    let present: Vec<f64> = rows.iter().filter_map(|&i| values[i]).collect();
    let groups: HashSet<KeyTuple> = rows
        .iter()
        .filter_map(|&i| spec.extract(&table.rows()[i]))
        .collect();
    SegmentRate {
        name: name.to_string(),
        rate: mean(&present),
        sem: sem(&present),
        entries: rows.len(),
        groups: groups.len(),
    }
}

/// Result of a Student t-test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub statistic: f64,
    pub p_value: f64,
    pub df: f64,
    pub n_a: usize,
    pub n_b: usize,
}

/// Two-sample t-test assuming equal variances.
///
/// `None` when either sample has fewer than two values or both samples are
/// constant.
pub fn ttest_ind(a: &[f64], b: &[f64]) -> Option<TTest> {
    let (na, nb) = (a.len(), b.len());
    if na < 2 || nb < 2 {
        return None;
    }
    let df = (na + nb - 2) as f64;
    let pooled = ((na - 1) as f64 * sample_variance(a)? + (nb - 1) as f64 * sample_variance(b)?) / df;
    let se = (pooled * (1.0 / na as f64 + 1.0 / nb as f64)).sqrt();
    if se == 0.0 {
        return None;
    }
    let statistic = (mean(a)? - mean(b)?) / se;
    Some(TTest {
        statistic,
        p_value: student_t_two_sided(statistic, df),
        df,
        n_a: na,
        n_b: nb,
    })
}

/// Paired t-test; pairs with a missing side are omitted.
pub fn ttest_rel(pairs: &[(Option<f64>, Option<f64>)]) -> Option<TTest> {
    let diffs: Vec<f64> = pairs
        .iter()
        .filter_map(|&(a, b)| Some(a? - b?))
        .collect();
    let n = diffs.len();
    if n < 2 {
        return None;
    }
    let se = (sample_variance(&diffs)? / n as f64).sqrt();
    if se == 0.0 {
        return None;
    }
    let statistic = mean(&diffs)? / se;
    let df = (n - 1) as f64;
    Some(TTest {
        statistic,
        p_value: student_t_two_sided(statistic, df),
        df,
        n_a: n,
        n_b: n,
    })
}

/// Unpaired test of `outcome` at White-recorded versus Hispanic-recorded
/// stops of drivers labeled with the target combination.
pub fn unpaired_outcome_test(
    table: &Table,
    columns: LabeledColumns<'_>,
    outcome: &str,
) -> Result<Option<TTest>> {
    let race = table.column_index(columns.race)?;
    let race_str = table.column_index(columns.race_str)?;
    let values = outcomes(table, outcome)?;

    let mut white = Vec::new();
    let mut hispanic = Vec::new();
    for (row, value) in table.rows().iter().zip(&values) {
        let Some(value) = *value else { continue };
        if row[race_str].as_deref() != Some(columns.target) {
            continue;
        }
        match row[race].as_deref() {
            Some(WHITE) => white.push(value),
            Some(HISPANIC) => hispanic.push(value),
            _ => {}
        }
    }
    Ok(ttest_ind(&white, &hispanic))
}

/// Paired test over Hispanic/White drivers of their per-driver outcome rate
/// when recorded White versus when recorded Hispanic.
pub fn paired_outcome_test(
    table: &Table,
    spec: &KeySpec,
    race_column: &str,
    outcome: &str,
) -> Result<Option<TTest>> {
    let race = table.column_index(race_column)?;
    let idx = table.column_index(outcome)?;
    // validate the whole column up front
    outcomes(table, outcome)?;

    let rate_when = |rows: &[&Row], recorded: &str| -> Option<f64> {
        let values: Vec<f64> = rows
            .iter()
            .filter(|r| r[race].as_deref() == Some(recorded))
            .filter_map(|r| r[idx].as_deref().and_then(outcome_value))
            .collect();
        mean(&values)
    };

    let pairs: Vec<(Option<f64>, Option<f64>)> = race_sets(table, spec, race)
        .values()
        .filter(|(races, _)| is_hispanic_white(races))
        .map(|(_, rows)| (rate_when(rows, WHITE), rate_when(rows, HISPANIC)))
        .collect();
    Ok(ttest_rel(&pairs))
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t * t))
}

fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + G + 0.5;
    let mut a = COEF[0];
    for (i, c) in COEF.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Everything `stats` reports for one outcome column.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeStats {
    pub column: String,
    pub rates: Vec<SegmentRate>,
    pub unpaired: Option<TTest>,
    pub paired: Option<TTest>,
}

/// Full statistics report for a labeled table.
#[derive(Debug, Clone, PartialEq)]
pub struct StateStats {
    pub completeness: CompletenessReport,
    pub stops: Option<StopSummary>,
    pub ambiguity: AmbiguitySummary,
    pub combinations: BTreeMap<String, usize>,
    pub outcomes: Vec<OutcomeStats>,
}

/// Compute every statistic for a labeled table.
///
/// # Errors
///
/// Fails if a configured column is absent or an outcome cell is neither
/// boolean nor numeric.
pub fn summarize(table: &Table, config: &StateConfig) -> Result<StateStats> {
    let spec = KeySpec::resolve(table, &config.grouping_keys, &config.integer_keys)?;
    let columns = LabeledColumns::from_config(config);

    let mut outcome_stats = Vec::new();
    for column in outcome_columns(table) {
        outcome_stats.push(OutcomeStats {
            column: column.to_string(),
            rates: segment_rates(table, &spec, columns, column)?,
            unpaired: unpaired_outcome_test(table, columns, column)?,
            paired: paired_outcome_test(table, &spec, &config.race_column, column)?,
        });
    }

    Ok(StateStats {
        completeness: completeness(table, config)?,
        stops: StopSummary::from_counts(&stops_per_driver(table, &spec)),
        ambiguity: ambiguity_summary(table, &spec, &config.race_column)?,
        combinations: enumerate_ambiguity(table, &spec, &config.race_column)?,
        outcomes: outcome_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::State;
    use crate::core::table::{headers, row};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    fn config() -> StateConfig {
        let mut config = StateConfig::preset(State::Co);
        config.grouping_keys = headers(&["first", "last"]);
        config.key_rules = Default::default();
        config
    }

    fn labeled() -> Table {
        Table::from_rows(
            headers(&["driver_id", "first", "race_str", "last", "driver_race", "search_conducted"]),
            vec![
                row(&["0", "A", "Black", "B", "Black", "False"]),
                row(&["0", "A", "Black", "B", "Black", "False"]),
                row(&["1", "J", "Hispanic_White", "S", "White", "False"]),
                row(&["1", "J", "Hispanic_White", "S", "Hispanic", "True"]),
                row(&["1", "J", "Hispanic_White", "S", "White", "False"]),
                row(&["2", "K", "Hispanic_White", "L", "White", "False"]),
                row(&["2", "K", "Hispanic_White", "L", "Hispanic", "True"]),
                row(&["3", "M", "White", "N", "White", "True"]),
                row(&["3", "M", "White", "N", "White", ""]),
                row(&["4", "P", "Black_White", "Q", "White", "False"]),
                row(&["4", "P", "Black_White", "Q", "Black", "False"]),
            ],
        )
        .unwrap()
    }

    fn spec(table: &Table) -> KeySpec {
        KeySpec::resolve(table, &headers(&["first", "last"]), &[]).unwrap()
    }

    #[test]
    fn test_outcome_value() {
        assert_eq!(outcome_value("True"), Some(1.0));
        assert_eq!(outcome_value("False"), Some(0.0));
        assert_eq!(outcome_value("1.0"), Some(1.0));
        assert_eq!(outcome_value("maybe"), None);
    }

    #[test]
    fn test_stop_summary() {
        let summary = StopSummary::from_counts(&[2, 3, 2, 9]).unwrap();
        assert_eq!(summary.min, 2);
        assert_eq!(summary.max, 9);
        assert_close(summary.mean, 4.0, 1e-12);
        assert_close(summary.median, 2.5, 1e-12);
        assert!(StopSummary::from_counts(&[]).is_none());
    }

    #[test]
    fn test_completeness() {
        let report = completeness(&labeled(), &config()).unwrap();
        assert_eq!(report.complete_rows, 10);
        assert_eq!(report.groups, 5);
    }

    #[test]
    fn test_ambiguity_summary_and_enumeration() {
        let table = labeled();
        let spec = spec(&table);
        let summary = ambiguity_summary(&table, &spec, "driver_race").unwrap();
        assert_eq!(
            summary,
            AmbiguitySummary {
                ambiguous_rows: 7,
                ambiguous_drivers: 3,
                hispanic_white_rows: 5,
            }
        );

        let combos = enumerate_ambiguity(&table, &spec, "driver_race").unwrap();
        assert_eq!(combos.get("Hispanic_White"), Some(&2));
        assert_eq!(combos.get("Black_White"), Some(&1));
        assert_eq!(combos.len(), 2);
    }

    #[test]
    fn test_segment_rates() {
        let table = labeled();
        let cfg = config();
        let rates = segment_rates(&table, &spec(&table), LabeledColumns::from_config(&cfg), "search_conducted").unwrap();
        let by_name: BTreeMap<_, _> = rates.iter().map(|r| (r.name.as_str(), r)).collect();

        let white = by_name["White_search_conducted_White"];
        assert_eq!(white.entries, 2);
        assert_eq!(white.groups, 1);
        assert_eq!(white.rate, Some(1.0));
        assert_eq!(white.sem, None);

        let hw_white = by_name["Hispanic_White_search_conducted_White"];
        assert_eq!(hw_white.entries, 3);
        assert_eq!(hw_white.groups, 2);
        assert_eq!(hw_white.rate, Some(0.0));

        let hw_hispanic = by_name["Hispanic_White_search_conducted_Hispanic"];
        assert_eq!(hw_hispanic.rate, Some(1.0));

        let ambiguous = by_name["Ambiguous_search_conducted"];
        assert_eq!(ambiguous.entries, 7);
        assert_eq!(ambiguous.groups, 3);

        let whole = by_name["whole_search_conducted"];
        assert_eq!(whole.entries, 11);
        assert_close(whole.rate.unwrap(), 3.0 / 10.0, 1e-12);
    }

    #[test]
    fn test_ambiguous_segment_needs_recorded_race() {
        let mut rows = labeled().into_parts().1;
        rows.push(row(&["4", "P", "Black_White", "Q", "", "True"]));
        let table = Table::from_rows(labeled().headers().to_vec(), rows).unwrap();
        let cfg = config();
        let rates = segment_rates(&table, &spec(&table), LabeledColumns::from_config(&cfg), "search_conducted").unwrap();
        let by_name: BTreeMap<_, _> = rates.iter().map(|r| (r.name.as_str(), r)).collect();

        let ambiguous = by_name["Ambiguous_search_conducted"];
        assert_eq!(ambiguous.entries, 7);
        assert_eq!(by_name["whole_search_conducted"].entries, 12);
    }

    #[test]
    fn test_invalid_outcome_is_error() {
        let table = Table::from_rows(
            headers(&["first", "last", "race_str", "driver_race", "search_conducted"]),
            vec![row(&["A", "B", "White", "White", "sometimes"])],
        )
        .unwrap();
        let cfg = config();
        let err = unpaired_outcome_test(&table, LabeledColumns::from_config(&cfg), "search_conducted").unwrap_err();
        assert!(matches!(err, StatsError::InvalidOutcome { row: 0, .. }));
    }

    #[test]
    fn test_ttest_ind() {
        let t = ttest_ind(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_close(t.statistic, -1.0, 1e-12);
        assert_close(t.df, 8.0, 1e-12);
        assert_close(t.p_value, 0.3466, 1e-3);

        assert!(ttest_ind(&[1.0], &[2.0, 3.0]).is_none());
        assert!(ttest_ind(&[1.0, 1.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_ttest_rel_omits_missing() {
        let pairs = [
            (Some(1.0), Some(2.0)),
            (Some(2.0), Some(2.0)),
            (None, Some(9.0)),
            (Some(3.0), Some(4.0)),
            (Some(4.0), None),
            (Some(4.0), Some(6.0)),
        ];
        let t = ttest_rel(&pairs).unwrap();
        assert_eq!(t.n_a, 4);
        assert_close(t.statistic, -6.0_f64.sqrt(), 1e-9);
        assert_close(t.p_value, 0.091_718, 1e-4);
    }

    #[test]
    fn test_student_t_p_values() {
        assert_close(student_t_two_sided(0.0, 5.0), 1.0, 1e-12);
        assert_close(student_t_two_sided(2.228, 10.0), 0.05, 1e-3);
        assert_close(ln_gamma(5.0), 24.0_f64.ln(), 1e-10);
    }

    #[test]
    fn test_paired_outcome_test() {
        let table = labeled();
        let t = paired_outcome_test(&table, &spec(&table), "driver_race", "search_conducted").unwrap();
        // both drivers: White rate 0, Hispanic rate 1; differences are constant
        assert!(t.is_none());
    }

    #[test]
    fn test_summarize() {
        let stats = summarize(&labeled(), &config()).unwrap();
        assert_eq!(stats.stops.as_ref().map(|s| s.drivers), Some(5));
        assert_eq!(stats.outcomes.len(), 1);
        assert_eq!(stats.outcomes[0].column, "search_conducted");
        assert_eq!(stats.outcomes[0].rates.len(), 7);
    }
}
