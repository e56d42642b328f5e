//! Loading Dune execution exports into typed transaction records

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::Error;
use crate::model::ClusteredTable;

/// Keys leading from the document root to the list of records
pub const RECORDS_PATH: [&str; 4] = ["data", "get_execution", "execution_succeeded", "data"];

/// Source chains bitmask, compared as an opaque value
///
/// Dune returns it either as a number or as a string depending on the
/// query, so both are kept verbatim. Integer masks order before text masks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(untagged)]
pub enum ChainMask {
    Int(i64),
    Text(String),
}

impl fmt::Display for ChainMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainMask::Int(mask) => write!(f, "{}", mask),
            ChainMask::Text(mask) => f.write_str(mask),
        }
    }
}

/// One row of the export: a wallet and its activity summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub user_address: String,
    pub tc: i64,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub days: i64,
    pub source_chains_mask: ChainMask,
    pub input_tx_hash: String,
}

impl TransactionRecord {
    pub fn last_year(&self) -> i32 {
        self.last_day.year()
    }

    pub fn last_month(&self) -> u32 {
        self.last_day.month()
    }
}

/// Record as it appears in the JSON, before date parsing
#[derive(Debug, Deserialize)]
struct RawRecord {
    user_address: String,
    #[serde(deserialize_with = "deserialize_int")]
    tc: i64,
    first_day: String,
    last_day: String,
    #[serde(deserialize_with = "deserialize_int")]
    days: i64,
    source_chains_mask: ChainMask,
    input_tx_hash: String,
}

impl RawRecord {
    fn into_record(self, index: usize) -> crate::Result<TransactionRecord> {
        let first_day = parse_field(index, "first_day", &self.first_day)?;
        let last_day = parse_field(index, "last_day", &self.last_day)?;

        Ok(TransactionRecord {
            user_address: self.user_address,
            tc: self.tc,
            first_day,
            last_day,
            days: self.days,
            source_chains_mask: self.source_chains_mask,
            input_tx_hash: self.input_tx_hash,
        })
    }
}

/// Accepts either a JSON integer or a string holding one
fn deserialize_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        Int(i64),
        String(String),
    }

    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(value) => Ok(value),
        StringOrInt::String(s) => s.trim().parse::<i64>().map_err(D::Error::custom),
    }
}

fn parse_field(index: usize, field: &'static str, value: &str) -> crate::Result<NaiveDate> {
    parse_day(value).ok_or_else(|| Error::InvalidDate {
        index,
        field,
        value: value.to_string(),
    })
}

/// Parse a day from the date and timestamp forms Dune emits
///
/// Accepts `2023-01-01`, `2023-01-01 00:00:00.000 UTC`, `2023-01-01T00:00:00`
/// and RFC 3339 timestamps. Timestamps are truncated to the date
/// they carry; offsets are not applied.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(timestamp.date());
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

/// Extract and type the record list of a Dune execution document
pub fn parse_records(json: &str) -> crate::Result<Vec<TransactionRecord>> {
    let document: Value = serde_json::from_str(json)?;

    let mut node = &document;
    let mut location = String::from("$");
    for key in RECORDS_PATH {
        location.push('.');
        location.push_str(key);
        node = node
            .get(key)
            .ok_or_else(|| Error::schema(location.as_str(), "missing key"))?;
    }

    let items = node
        .as_array()
        .ok_or_else(|| Error::schema(location.as_str(), "expected an array of records"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            RawRecord::deserialize(item)
                .map_err(|err| Error::schema(format!("{}[{}]", location, index), err.to_string()))?
                .into_record(index)
        })
        .collect()
}

/// Load a JSON export from disk and assign every row to its cluster
///
/// # Arguments
/// * `file_path` - Path to the Dune execution JSON
///
/// # Returns
/// * `ClusteredTable` with one row per input record
pub fn load_and_process_data(file_path: impl AsRef<Path>) -> crate::Result<ClusteredTable> {
    let path = file_path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| Error::MissingInput {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "read input export");

    load_from_str(&contents)
}

/// Same as [`load_and_process_data`] for an in-memory document
pub fn load_from_str(json: &str) -> crate::Result<ClusteredTable> {
    let records = parse_records(json)?;
    debug!(records = records.len(), "parsed transaction records");

    ClusteredTable::from_records(records)
}
