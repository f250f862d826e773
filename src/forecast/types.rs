use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::forecast::error::InputError;
use crate::forecast::frequency::Frequency;
use crate::monitoring::capture::DiagnosticLog;

/// One forecast step. Serializes as `{timestamp, mean, p10, p90}`; the series
/// id only appears while a backend's raw output has not been narrowed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub timestamp: NaiveDateTime,
    pub mean: f64,
    pub p10: f64,
    pub p90: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
}

impl ForecastRow {
    pub fn new(timestamp: NaiveDateTime, mean: f64, p10: f64, p90: f64) -> Self {
        Self {
            timestamp,
            mean,
            p10,
            p90,
            series_id: None,
        }
    }

    /// Whether `value` falls outside the `[p10, p90]` band.
    pub fn is_outside_band(&self, value: f64) -> bool {
        value < self.p10 || value > self.p90
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(rows: Vec<ForecastRow>) -> Self {
        Self { rows }
    }

    /// The result of a failed forecast.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ForecastRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row falling on the given calendar date.
    pub fn row_for_date(&self, date: NaiveDate) -> Option<&ForecastRow> {
        self.rows.iter().find(|row| row.timestamp.date() == date)
    }
}

/// Backend-specific knobs forwarded verbatim by the router.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackendOptions {
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
    #[serde(default)]
    pub context_length: Option<usize>,
    #[serde(default)]
    pub num_samples: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub use_rope_scaling: Option<bool>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub model_identifier: String,
    pub series_id_column: String,
    pub timestamp_column: String,
    pub target_column: String,
    pub frequency: Frequency,
    pub horizon: usize,
    pub options: BackendOptions,
}

impl ForecastRequest {
    pub fn new(
        model_identifier: impl Into<String>,
        series_id_column: impl Into<String>,
        timestamp_column: impl Into<String>,
        target_column: impl Into<String>,
        horizon: usize,
    ) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            series_id_column: series_id_column.into(),
            timestamp_column: timestamp_column.into(),
            target_column: target_column.into(),
            frequency: Frequency::DAILY,
            horizon,
            options: BackendOptions::default(),
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_options(mut self, options: BackendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.horizon == 0 {
            return Err(InputError::InvalidHorizon(self.horizon));
        }
        Ok(())
    }

    pub fn required_columns(&self) -> [&str; 3] {
        [
            self.series_id_column.as_str(),
            self.timestamp_column.as_str(),
            self.target_column.as_str(),
        ]
    }
}

/// What an adapter hands back: a bare table, or a table with its diagnostic log.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutput {
    Bare(ForecastTable),
    Logged(ForecastTable, DiagnosticLog),
}

impl AdapterOutput {
    pub fn into_parts(self) -> (ForecastTable, DiagnosticLog) {
        match self {
            AdapterOutput::Bare(table) => (table, DiagnosticLog::default()),
            AdapterOutput::Logged(table, log) => (table, log),
        }
    }
}
