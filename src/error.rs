//! Error types for the clustering pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, clustering or exporting
#[derive(Error, Debug)]
pub enum Error {
    /// Input file is missing or unreadable
    #[error("cannot read input file {path}: {source}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input is not valid JSON
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// JSON is valid but does not have the expected shape
    #[error("schema mismatch at {location}: {message}")]
    SchemaMismatch { location: String, message: String },

    /// A date field could not be parsed
    #[error("record {index}: cannot parse {field} value {value:?} as a date")]
    InvalidDate {
        index: usize,
        field: &'static str,
        value: String,
    },

    /// No cluster exceeded the size threshold
    #[error("no cluster has more than {threshold} unique wallets")]
    EmptyResult { threshold: usize },

    /// The workbook could not be written
    #[error("cannot write workbook {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// Building a summary frame failed
    #[error("frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl Error {
    pub(crate) fn schema(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            location: location.into(),
            message: message.into(),
        }
    }
}
