//! Per-state column standardization.
//!
//! Each state's raw export spells names, dates and addresses differently.
//! A [`Standardizer`] turns one raw table into a normalized table whose
//! identity-key columns are upper-cased text or canonical integers, with
//! sentinel values replaced by missing cells. Standardizers may drop rows
//! but never add them.

use chrono::{Datelike, NaiveDate};
use log::info;
use thiserror::Error;

use crate::config::State;
use crate::core::table::{SchemaError, Table};
use crate::core::transforms::{int_or_none, year_of};

/// Errors that can occur during standardization.
#[derive(Debug, Error)]
pub enum StandardizeError {
    #[error("{state} standardization failed: {source}")]
    Schema {
        state: State,
        #[source]
        source: SchemaError,
    },
}

/// Result type for standardization.
pub type Result<T> = std::result::Result<T, StandardizeError>;

/// Normalizes a state's raw stop table.
pub trait Standardizer {
    fn state(&self) -> State;

    /// Consume a raw table and return its normalized form.
    fn normalize(&self, table: Table) -> Result<Table>;
}

/// Select the standardizer for a state.
pub fn standardizer_for(state: State) -> Box<dyn Standardizer> {
    match state {
        State::Az => Box::new(AzStandardizer),
        State::Co => Box::new(CoStandardizer),
        State::Tx => Box::new(TxStandardizer),
    }
}

fn upper(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.to_uppercase())
}

/// First character upper-cased, the rest lower-cased (`"WHITE"` → `"White"`).
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Trimmed character length; missing cells count as the three-character `nan`.
fn trimmed_len(cell: &Option<String>) -> usize {
    cell.as_deref().map_or(3, |s| s.trim().chars().count())
}

fn require(state: State, table: &Table, columns: &[&str]) -> Result<()> {
    for column in columns {
        table
            .column_index(column)
            .map_err(|source| StandardizeError::Schema { state, source })?;
    }
    Ok(())
}

fn schema(state: State) -> impl Fn(SchemaError) -> StandardizeError {
    move |source| StandardizeError::Schema { state, source }
}

/// Arizona: integer vehicle years, upper-cased names and vehicle style.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzStandardizer;

impl AzStandardizer {
    const FIRST: &'static str = "SubjectFirstName";
    const LAST: &'static str = "SubjectLastName";
    const STYLE: &'static str = "VehicleStyle";
    const YEAR: &'static str = "VehicleYear";
}

impl Standardizer for AzStandardizer {
    fn state(&self) -> State {
        State::Az
    }

    fn normalize(&self, mut table: Table) -> Result<Table> {
        let err = schema(State::Az);
        require(State::Az, &table, &[Self::FIRST, Self::LAST, Self::STYLE, Self::YEAR])?;

        table
            .map_column(Self::YEAR, |c| {
                c.as_deref().and_then(int_or_none).map(|y| y.to_string())
            })
            .map_err(&err)?;
        for column in [Self::FIRST, Self::LAST, Self::STYLE] {
            table.map_column(column, upper).map_err(&err)?;
        }

        let first = table.column_index(Self::FIRST).map_err(&err)?;
        let last = table.column_index(Self::LAST).map_err(&err)?;
        let before = table.len();
        let table = table.retain_rows(|row| trimmed_len(&row[first]) > 0 && trimmed_len(&row[last]) > 0);
        info!("AZ: dropped {} rows with blank names", before - table.len());

        Ok(table)
    }
}

/// Colorado: validated dates of birth, upper-cased names, placeholder names removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoStandardizer;

impl CoStandardizer {
    const FIRST: &'static str = "driver_first_name";
    const LAST: &'static str = "driver_last_name";
    const DOB: &'static str = "DOB";
    const PLACEHOLDER_LAST_NAMES: &'static [&'static str] = &["NOT OBTAINED", "--"];

    /// Keep a date of birth only if it parses as `%Y-%m-%d` and is not January 1.
    ///
    /// January 1 (including the `1900-01-01` placeholder) is used as a
    /// fill-in for unknown birthdays in this export.
    pub fn clean_dob(raw: &str) -> Option<String> {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
        if date.month() == 1 && date.day() == 1 {
            return None;
        }
        Some(raw.to_string())
    }
}

impl Standardizer for CoStandardizer {
    fn state(&self) -> State {
        State::Co
    }

    fn normalize(&self, mut table: Table) -> Result<Table> {
        let err = schema(State::Co);
        require(State::Co, &table, &[Self::FIRST, Self::LAST, Self::DOB])?;

        table
            .map_column(Self::DOB, |c| c.as_deref().and_then(Self::clean_dob))
            .map_err(&err)?;
        table.map_column(Self::FIRST, upper).map_err(&err)?;
        table.map_column(Self::LAST, upper).map_err(&err)?;

        let first = table.column_index(Self::FIRST).map_err(&err)?;
        let last = table.column_index(Self::LAST).map_err(&err)?;
        let before = table.len();
        let table = table.retain_rows(|row| {
            let placeholder = row[last]
                .as_deref()
                .map_or(false, |l| Self::PLACEHOLDER_LAST_NAMES.contains(&l));
            !placeholder && trimmed_len(&row[first]) > 1 && trimmed_len(&row[last]) > 1
        });
        info!("CO: dropped {} rows with placeholder or short names", before - table.len());

        Ok(table)
    }
}

/// Texas: 2016+ stops, upper-cased address keys, five-digit zips, capitalized race.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxStandardizer;

impl TxStandardizer {
    const DATE: &'static str = "date";
    const ADDRESS: &'static str = "HA_A_ADDRESS_DRVR";
    const ZIP: &'static str = "HA_A_ZIP_DRVR";
    const RACE_RAW: &'static str = "driver_race_raw";
    const RACE: &'static str = "driver_race";
    const UPPER_COLUMNS: [&'static str; 6] = [
        "HA_N_FIRST_DRVR",
        "HA_N_LAST_DRVR",
        "HA_A_ADDRESS_DRVR",
        "HA_A_CITY_DRVR",
        "HA_A_STATE_DRVR",
        "HA_A_ZIP_DRVR",
    ];
    const FIRST_YEAR: i32 = 2016;

    /// First five characters of a zip; anything shorter is missing.
    pub fn clean_zip(raw: &str) -> Option<String> {
        let zip: String = raw.chars().take(5).collect();
        if zip.chars().count() == 5 {
            Some(zip)
        } else {
            None
        }
    }
}

impl Standardizer for TxStandardizer {
    fn state(&self) -> State {
        State::Tx
    }

    fn normalize(&self, table: Table) -> Result<Table> {
        let err = schema(State::Tx);
        require(State::Tx, &table, &[Self::DATE, Self::RACE_RAW])?;
        require(State::Tx, &table, &Self::UPPER_COLUMNS)?;

        let date = table.column_index(Self::DATE).map_err(&err)?;
        let before = table.len();
        let mut table = table.retain_rows(|row| {
            row[date]
                .as_deref()
                .and_then(year_of)
                .map_or(false, |y| y >= Self::FIRST_YEAR)
        });
        info!("TX: dropped {} rows dated before {}", before - table.len(), Self::FIRST_YEAR);

        for column in Self::UPPER_COLUMNS {
            table.map_column(column, upper).map_err(&err)?;
        }
        table
            .map_column(Self::ADDRESS, |c| c.filter(|a| a != "UNKNOWN"))
            .map_err(&err)?;
        table
            .map_column(Self::ZIP, |c| c.as_deref().and_then(Self::clean_zip))
            .map_err(&err)?;

        let race: Vec<Option<String>> = table
            .remove_column(Self::RACE_RAW)
            .map_err(&err)?
            .into_iter()
            .map(|c| c.map(|r| capitalize(&r)))
            .collect();
        if table.has_column(Self::RACE) {
            table.set_column(Self::RACE, race).map_err(&err)?;
        } else {
            let end = table.num_columns();
            table.insert_column(end, Self::RACE, race).map_err(&err)?;
        }

        Ok(table)
    }
}
