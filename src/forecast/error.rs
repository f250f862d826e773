use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;

/// Problems with the caller's input, detected before any backend runs.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid horizon: {0} (must be at least 1)")]
    InvalidHorizon(usize),

    #[error("Invalid frequency code: {0}")]
    InvalidFrequency(String),

    #[error("Failed to parse CSV: {0}")]
    Csv(String),

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Empty time series in input data")]
    EmptySeries,

    #[error("Checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("Failed to load predictor from {}: {reason}", path.display())]
    PredictorLoad { path: PathBuf, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend exceeded its time budget of {0:?}")]
    Timeout(Duration),

    #[error("No forecasts returned by predictor")]
    NoForecasts,

    #[error("Prediction has no {0} column")]
    MissingQuantile(String),

    #[error("Malformed sample matrix: {0}")]
    MalformedSamples(String),

    #[error("Forecast timestamps overflow after {0}")]
    TimestampOverflow(NaiveDateTime),
}

/// Renders an error and every source beneath it, one per line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = format!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\nCaused by: {}", cause));
        source = cause.source();
    }
    out
}
