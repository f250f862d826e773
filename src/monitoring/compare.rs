//! Forecast-versus-reality comparison and bound alerts.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::forecast::types::ForecastTable;

/// A value observed after the forecast was made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealObservation {
    pub date: NaiveDate,
    pub value: f64,
}

/// Observations in entry order, at most one per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationLog {
    observations: Vec<RealObservation>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation; returns false when the date is already taken.
    pub fn add(&mut self, date: NaiveDate, value: f64) -> bool {
        if self.observations.iter().any(|o| o.date == date) {
            return false;
        }
        self.observations.push(RealObservation { date, value });
        true
    }

    pub fn observations(&self) -> &[RealObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl FromIterator<RealObservation> for ObservationLog {
    fn from_iter<I: IntoIterator<Item = RealObservation>>(iter: I) -> Self {
        let mut log = ObservationLog::new();
        for obs in iter {
            log.add(obs.date, obs.value);
        }
        log
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    pub value: f64,
    /// Forecast mean for that date, rounded to cents. None when the forecast
    /// does not cover the date.
    pub forecast: Option<f64>,
    pub error: Option<f64>,
    pub anomaly: bool,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Join observations with the forecast by calendar date.
pub fn compare(table: &ForecastTable, observations: &ObservationLog) -> Vec<ComparisonRow> {
    observations
        .observations()
        .iter()
        .map(|obs| match table.row_for_date(obs.date) {
            Some(row) => ComparisonRow {
                date: obs.date,
                value: obs.value,
                forecast: Some(round2(row.mean)),
                error: Some(round2(obs.value - row.mean)),
                anomaly: row.is_outside_band(obs.value),
            },
            None => ComparisonRow {
                date: obs.date,
                value: obs.value,
                forecast: None,
                error: None,
                anomaly: false,
            },
        })
        .collect()
}

pub fn anomaly_count(rows: &[ComparisonRow]) -> usize {
    rows.iter().filter(|r| r.anomaly).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundStatus {
    Below,
    Within,
    Above,
}

impl BoundStatus {
    pub fn is_alert(&self) -> bool {
        !matches!(self, BoundStatus::Within)
    }
}

impl fmt::Display for BoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundStatus::Below => write!(f, "below"),
            BoundStatus::Within => write!(f, "within"),
            BoundStatus::Above => write!(f, "above"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundCheck {
    pub real: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub status: BoundStatus,
    /// `real - p50`
    pub deviation: f64,
    /// Deviation as a percentage of the median; zero when the median is zero.
    pub deviation_pct: f64,
}

pub fn evaluate_bounds(real: f64, p10: f64, p50: f64, p90: f64) -> BoundCheck {
    let deviation = real - p50;
    let deviation_pct = if p50 != 0.0 {
        deviation / p50 * 100.0
    } else {
        0.0
    };

    let status = if real < p10 {
        BoundStatus::Below
    } else if real > p90 {
        BoundStatus::Above
    } else {
        BoundStatus::Within
    };

    BoundCheck {
        real,
        p10,
        p50,
        p90,
        status,
        deviation,
        deviation_pct,
    }
}

impl BoundCheck {
    /// HTML-formatted message for chat delivery.
    pub fn alert_message(&self, dataset: &str, now: NaiveDateTime) -> String {
        let (title, position) = match self.status {
            BoundStatus::Below => (
                "🚨 Forecast Alert",
                "⚠️ Real value is BELOW the lower bound (P10).",
            ),
            BoundStatus::Above => (
                "🚨 Forecast Alert",
                "⚠️ Real value is ABOVE the upper bound (P90).",
            ),
            BoundStatus::Within => (
                "📊 Probabilistic Forecasting Result",
                "✅ Real value is within the forecast confidence range.",
            ),
        };
        let dataset = if dataset.trim().is_empty() {
            "Unknown Dataset"
        } else {
            dataset
        };

        format!(
            "{title}\n\n\
             Dataset: <b>{dataset}</b>\n\
             Real Value: <b>{real:.2}</b>\n\n\
             <b>Forecast Range:</b>\n\
             \x20 Lower Bound (P10): <b>{p10:.2}</b>\n\
             \x20 Median (P50): <b>{p50:.2}</b>\n\
             \x20 Upper Bound (P90): <b>{p90:.2}</b>\n\n\
             {position}\n\
             Deviation from median: <b>{dev:+.2}</b> ({pct:+.2}%)\n\n\
             🕒 Updated at: {now}",
            title = title,
            dataset = escape_html(dataset),
            real = self.real,
            p10 = self.p10,
            p50 = self.p50,
            p90 = self.p90,
            position = position,
            dev = self.deviation,
            pct = self.deviation_pct,
            now = now.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
