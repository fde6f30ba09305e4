//! Configuration types for the stop-ambiguity pipeline.
//!
//! Every state run is driven by an immutable [`StateConfig`]. The defaults
//! reproduce the study's per-state settings; a YAML file can override any
//! field.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State whose traffic-stop export is being processed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Az,
    Co,
    Tx,
}

impl State {
    pub const ALL: [State; 3] = [State::Az, State::Co, State::Tx];

    /// Two-letter postal code.
    pub fn code(self) -> &'static str {
        match self {
            State::Az => "AZ",
            State::Co => "CO",
            State::Tx => "TX",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{state}: grouping_keys must not be empty")]
    NoGroupingKeys { state: State },

    #[error("{state}: grouping key '{key}' listed more than once")]
    DuplicateKey { state: State, key: String },

    #[error("{state}: invalid stop_count_range [{min}, {max}]")]
    InvalidRange { state: State, min: usize, max: usize },
}

/// Inclusive bounds on the number of stops per driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCountRange {
    pub min: usize,
    pub max: usize,
}

impl StopCountRange {
    #[inline]
    pub fn contains(&self, stops: usize) -> bool {
        stops >= self.min && stops <= self.max
    }
}

impl Default for StopCountRange {
    fn default() -> Self {
        Self { min: 2, max: 10 }
    }
}

/// Per-field validity rules applied to a driver's key tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRules {
    /// Minimum trimmed length (in characters) of a key field.
    #[serde(default)]
    pub min_len: BTreeMap<String, usize>,

    /// Sentinel values that invalidate a key field.
    #[serde(default)]
    pub rejected: BTreeMap<String, Vec<String>>,
}

impl KeyRules {
    pub fn is_empty(&self) -> bool {
        self.min_len.is_empty() && self.rejected.is_empty()
    }
}

/// Output locations for the three pipeline sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkPaths {
    /// Every complete row tagged with its driver identity.
    pub raw: PathBuf,
    /// Rows of drivers accepted by the repeat-stop filter.
    pub grouped: PathBuf,
    /// Rows of drivers whose aggregated race equals the target combination.
    pub ambiguous: PathBuf,
}

impl SinkPaths {
    pub fn all(&self) -> [&Path; 3] {
        [&self.raw, &self.grouped, &self.ambiguous]
    }
}

fn default_identity_column() -> String {
    "driver_id".to_string()
}

fn default_race_column() -> String {
    "driver_race".to_string()
}

fn default_outcome_column() -> String {
    "search_conducted".to_string()
}

fn default_race_str_column() -> String {
    "race_str".to_string()
}

fn default_target_race_combo() -> String {
    "Hispanic_White".to_string()
}

fn default_date_column() -> String {
    "date".to_string()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Configuration for one state's pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Which standardizer to apply to the raw export.
    pub state: State,

    /// Ordered columns identifying a driver.
    pub grouping_keys: Vec<String>,

    /// Grouping keys compared as integers rather than text.
    #[serde(default)]
    pub integer_keys: Vec<String>,

    #[serde(default = "default_identity_column")]
    pub identity_column: String,

    #[serde(default = "default_race_column")]
    pub race_column: String,

    /// Search/arrest outcome flag; rows missing it are never grouped.
    #[serde(default = "default_outcome_column")]
    pub outcome_column: String,

    #[serde(default = "default_race_str_column")]
    pub race_str_column: String,

    #[serde(default)]
    pub stop_count_range: StopCountRange,

    #[serde(default)]
    pub key_rules: KeyRules,

    #[serde(default = "default_target_race_combo")]
    pub target_race_combo: String,

    /// Require a non-missing outcome on extracted rows.
    #[serde(default)]
    pub require_outcome: bool,

    #[serde(default = "default_date_column")]
    pub date_column: String,

    /// Keep only stops from these years; empty keeps everything.
    #[serde(default)]
    pub keep_years: Vec<i32>,

    pub sinks: SinkPaths,
}

impl StateConfig {
    /// Study settings for a state.
    pub fn preset(state: State) -> Self {
        match state {
            State::Az => Self {
                state,
                grouping_keys: strings(&[
                    "SubjectFirstName",
                    "SubjectLastName",
                    "VehicleStyle",
                    "VehicleYear",
                ]),
                integer_keys: strings(&["VehicleYear"]),
                identity_column: default_identity_column(),
                race_column: default_race_column(),
                outcome_column: default_outcome_column(),
                race_str_column: default_race_str_column(),
                stop_count_range: StopCountRange::default(),
                key_rules: KeyRules::default(),
                target_race_combo: default_target_race_combo(),
                require_outcome: false,
                date_column: default_date_column(),
                keep_years: Vec::new(),
                sinks: SinkPaths {
                    raw: PathBuf::from("csv/az_raw_with_driver_id_Style_Year.csv"),
                    grouped: PathBuf::from("csv/az_grouped_Style_Year.csv"),
                    ambiguous: PathBuf::from("csv/az_hispanic_white_drivers_Style_Year.csv"),
                },
            },
            State::Co => {
                let mut min_len = BTreeMap::new();
                min_len.insert("driver_first_name".to_string(), 2);
                min_len.insert("driver_last_name".to_string(), 2);
                let mut rejected = BTreeMap::new();
                rejected.insert(
                    "driver_last_name".to_string(),
                    strings(&["NOT OBTAINED", "--"]),
                );

                Self {
                    state,
                    grouping_keys: strings(&["driver_first_name", "driver_last_name", "DOB"]),
                    integer_keys: Vec::new(),
                    identity_column: default_identity_column(),
                    race_column: default_race_column(),
                    outcome_column: default_outcome_column(),
                    race_str_column: default_race_str_column(),
                    stop_count_range: StopCountRange::default(),
                    key_rules: KeyRules { min_len, rejected },
                    target_race_combo: default_target_race_combo(),
                    require_outcome: false,
                    date_column: default_date_column(),
                    keep_years: Vec::new(),
                    sinks: SinkPaths {
                        raw: PathBuf::from("csv/co_raw_with_driver_id_mod_officer_id.csv"),
                        grouped: PathBuf::from("csv/co_grouped_mod_officer_id.csv"),
                        ambiguous: PathBuf::from("csv/co_hispanic_white_drivers_only_mod.csv"),
                    },
                }
            }
            State::Tx => Self {
                state,
                grouping_keys: strings(&[
                    "HA_N_FIRST_DRVR",
                    "HA_N_LAST_DRVR",
                    "HA_A_ADDRESS_DRVR",
                    "HA_A_CITY_DRVR",
                    "HA_A_STATE_DRVR",
                    "HA_A_ZIP_DRVR",
                ]),
                integer_keys: Vec::new(),
                identity_column: default_identity_column(),
                race_column: default_race_column(),
                outcome_column: default_outcome_column(),
                race_str_column: default_race_str_column(),
                stop_count_range: StopCountRange::default(),
                key_rules: KeyRules::default(),
                target_race_combo: default_target_race_combo(),
                require_outcome: true,
                date_column: default_date_column(),
                keep_years: vec![2016, 2017],
                sinks: SinkPaths {
                    raw: PathBuf::from("csv/tx_raw_with_driver_id_driver_race.csv"),
                    grouped: PathBuf::from("csv/tx_processed_grouped_driver_race_raw.csv"),
                    ambiguous: PathBuf::from(
                        "csv/tx_processed_hispanic_white_drivers_driver_race.csv",
                    ),
                },
            },
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grouping_keys.is_empty() {
            return Err(ConfigError::NoGroupingKeys { state: self.state });
        }
        for (i, key) in self.grouping_keys.iter().enumerate() {
            if self.grouping_keys[..i].contains(key) {
                return Err(ConfigError::DuplicateKey {
                    state: self.state,
                    key: key.clone(),
                });
            }
        }
        let range = self.stop_count_range;
        if range.min == 0 || range.min > range.max {
            return Err(ConfigError::InvalidRange {
                state: self.state,
                min: range.min,
                max: range.max,
            });
        }
        Ok(())
    }
}

fn default_az() -> StateConfig {
    StateConfig::preset(State::Az)
}

fn default_co() -> StateConfig {
    StateConfig::preset(State::Co)
}

fn default_tx() -> StateConfig {
    StateConfig::preset(State::Tx)
}

/// Main pipeline configuration: one [`StateConfig`] per state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_az")]
    pub az: StateConfig,

    #[serde(default = "default_co")]
    pub co: StateConfig,

    #[serde(default = "default_tx")]
    pub tx: StateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            az: default_az(),
            co: default_co(),
            tx: default_tx(),
        }
    }
}

impl PipelineConfig {
    /// Configuration for one state.
    pub fn for_state(&self, state: State) -> &StateConfig {
        match state {
            State::Az => &self.az,
            State::Co => &self.co,
            State::Tx => &self.tx,
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        for state in State::ALL {
            config.for_state(state).validate()?;
        }
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_presets() {
        let config = PipelineConfig::default();
        assert_eq!(config.co.grouping_keys, vec!["driver_first_name", "driver_last_name", "DOB"]);
        assert_eq!(config.tx.keep_years, vec![2016, 2017]);
        assert!(config.tx.require_outcome);
        assert_eq!(config.az.integer_keys, vec!["VehicleYear"]);
        for state in State::ALL {
            let cfg = config.for_state(state);
            assert_eq!(cfg.state, state);
            assert_eq!(cfg.stop_count_range, StopCountRange { min: 2, max: 10 });
            assert_eq!(cfg.target_race_combo, "Hispanic_White");
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn test_stop_count_range_bounds() {
        let range = StopCountRange::default();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(10));
        assert!(!range.contains(11));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut cfg = StateConfig::preset(State::Az);
        cfg.stop_count_range = StopCountRange { min: 5, max: 2 };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRange { .. })));

        let mut cfg = StateConfig::preset(State::Az);
        cfg.grouping_keys.push("VehicleYear".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateKey { .. })));
    }

    #[test]
    fn test_yaml_roundtrip_and_partial_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        PipelineConfig::default().to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded, PipelineConfig::default());

        let partial = dir.path().join("partial.yaml");
        std::fs::write(
            &partial,
            "co:\n  state: CO\n  grouping_keys: [driver_first_name, driver_last_name]\n  stop_count_range: {min: 3, max: 5}\n  sinks:\n    raw: a.csv\n    grouped: b.csv\n    ambiguous: c.csv\n",
        )
        .unwrap();
        let loaded = PipelineConfig::from_yaml(&partial).unwrap();
        assert_eq!(loaded.co.grouping_keys.len(), 2);
        assert_eq!(loaded.co.stop_count_range, StopCountRange { min: 3, max: 5 });
        assert!(loaded.co.key_rules.is_empty());
        assert_eq!(loaded.az, StateConfig::preset(State::Az));
    }
}
