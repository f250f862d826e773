//! Caller-side pipeline: sanitize, dispatch, normalize.

use serde::Serialize;
use tracing::{info, warn};

use crate::data::sanitize::sanitize;
use crate::data::types::RawRecord;
use crate::forecast::dispatch::{BackendKind, Dispatcher};
use crate::forecast::error::ForecastError;
use crate::forecast::normalize::normalize;
use crate::forecast::types::{ForecastRequest, ForecastTable};
use crate::monitoring::capture::DiagnosticLog;

/// How much of the log is shown to a human.
pub const LOG_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastStatus {
    Success,
    Failed,
}

/// What a forecast call hands back: the table plus everything the backend logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResponse {
    pub forecast: ForecastTable,
    pub log: DiagnosticLog,
}

impl ForecastResponse {
    pub fn status(&self) -> ForecastStatus {
        if self.forecast.is_empty() {
            ForecastStatus::Failed
        } else {
            ForecastStatus::Success
        }
    }

    pub fn log_preview(&self) -> String {
        self.log.truncated(LOG_PREVIEW_CHARS)
    }
}

pub struct ForecastService {
    dispatcher: Dispatcher,
}

impl ForecastService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn models(&self) -> Vec<(String, BackendKind)> {
        self.dispatcher
            .registry()
            .identifiers()
            .map(|(id, kind)| (id.to_string(), kind))
            .collect()
    }

    pub fn forecast(
        &self,
        rows: &[RawRecord],
        request: &ForecastRequest,
    ) -> Result<ForecastResponse, ForecastError> {
        let dataset = sanitize(rows, &request.timestamp_column, &request.target_column);
        let (table, log) = self.dispatcher.predict(request, &dataset)?;

        if table.is_empty() {
            warn!("{} produced no forecast", request.model_identifier);
            return Ok(ForecastResponse {
                forecast: table,
                log,
            });
        }

        let forecast = normalize(table);
        info!(
            "{} forecast ready: {} rows",
            request.model_identifier,
            forecast.len()
        );
        Ok(ForecastResponse { forecast, log })
    }
}
