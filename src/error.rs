//! Error types for ride-pulse.

use thiserror::Error;

/// Main error type for loading and preparing event data.
///
/// The clustering, indexing and normalization passes are infallible once
/// their inputs exist; everything here is raised at the data boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required columns: {missing:?}")]
    Schema { missing: Vec<String> },

    #[error("Invalid value in row {row}, column `{column}`: {value}")]
    Parse {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("No coordinate group for ({lat}, {lng})")]
    UnknownCoordinate { lat: f64, lng: f64 },

    #[error("Invalid configuration: {name} = {value} ({reason})")]
    InvalidConfig {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Result type alias for ride-pulse operations
pub type Result<T> = std::result::Result<T, Error>;
