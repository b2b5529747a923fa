use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::PolarsError;

/// Errors raised by the loading and forecasting pipeline.
///
/// "No history" for a store/item pair is deliberately absent: it is reported
/// as an empty result, not an error.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("{what} not found: {path} (no remote store configured or fetch failed)")]
    NotFound { what: &'static str, path: PathBuf },

    #[error("model expects columns missing from the feature frame: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("label '{label}' in column '{column}' has no code in the encoding table")]
    UnknownCategory { column: String, label: String },

    #[error("no encoding table entry for categorical column '{0}'")]
    UnencodedColumn(String),

    #[error("horizon must be between 1 and {max} days, got {got}")]
    InvalidHorizon { got: usize, max: usize },

    #[error("store {0} is not in the loaded catalog")]
    UnknownStore(i64),

    #[error("date {0} is out of the representable range")]
    DateOutOfRange(NaiveDate),

    #[error("model error: {0}")]
    Model(String),

    #[error("model returned {got} predictions for {expected} rows")]
    PredictionCount { expected: usize, got: usize },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;
