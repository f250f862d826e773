//! Adapter for zero-shot backends that answer with a per-step quantile table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

use crate::data::sanitize::{parse_target, parse_timestamp, parse_timestamp_str};
use crate::data::types::Dataset;
use crate::forecast::dispatch::Forecaster;
use crate::forecast::error::ForecastError;
use crate::forecast::frequency::Frequency;
use crate::forecast::types::{AdapterOutput, ForecastRequest, ForecastRow, ForecastTable};
use crate::monitoring::capture::LogCapture;

/// Column name the backend expects the target under.
pub const TARGET_COLUMN: &str = "target";
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(180);
pub const ZERO_SHOT_SUFFIX: &str = "-ZeroShot";

const QUANTILE_TOLERANCE: f64 = 1e-9;

/// Where the `mean` series comes from when reading a quantile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanSource {
    /// Explicit mean column, falling back to the median.
    #[default]
    MeanOrMedian,
    /// Always the median, even when a mean column exists.
    Median,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelPoint {
    pub timestamp: NaiveDateTime,
    pub target: Option<f64>,
}

/// Observations grouped by series id, each series in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesPanel {
    series: Vec<(String, Vec<PanelPoint>)>,
}

impl TimeSeriesPanel {
    /// Build a panel from sanitized rows. Rows without a series id or a
    /// timestamp cannot be placed; their count is returned alongside.
    pub fn from_dataset(
        data: &Dataset,
        id_column: &str,
        timestamp_column: &str,
        target_column: &str,
    ) -> (Self, usize) {
        let mut dropped = 0usize;
        let mut points: Vec<(String, PanelPoint)> = Vec::with_capacity(data.len());

        for row in &data.rows {
            let id = row.get(id_column).and_then(|c| c.series_key());
            let timestamp = row.get(timestamp_column).and_then(parse_timestamp);
            match (id, timestamp) {
                (Some(id), Some(timestamp)) => {
                    let target = row.get(target_column).and_then(parse_target);
                    points.push((id, PanelPoint { timestamp, target }));
                }
                _ => dropped += 1,
            }
        }

        points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.timestamp.cmp(&b.1.timestamp)));

        let mut series: Vec<(String, Vec<PanelPoint>)> = Vec::new();
        for (id, point) in points {
            match series.last_mut() {
                Some((last_id, bucket)) if *last_id == id => bucket.push(point),
                _ => series.push((id, vec![point])),
            }
        }

        (Self { series }, dropped)
    }

    pub fn series(&self) -> impl Iterator<Item = (&str, &[PanelPoint])> {
        self.series.iter().map(|(id, pts)| (id.as_str(), pts.as_slice()))
    }

    /// Number of distinct series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn total_points(&self) -> usize {
        self.series.iter().map(|(_, pts)| pts.len()).sum()
    }
}

/// How the backend should run: a named pretrained model, no training.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroShotSettings {
    pub model_path: String,
    pub name_suffix: String,
    pub prediction_length: usize,
    pub frequency: Frequency,
    pub time_limit: Duration,
    pub enable_ensemble: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileRow {
    pub item_id: String,
    pub timestamp: NaiveDateTime,
    pub mean: Option<f64>,
    /// (level, value) pairs, e.g. (0.1, 12.3).
    pub quantiles: Vec<(f64, f64)>,
}

impl QuantileRow {
    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|(l, _)| (l - level).abs() < QUANTILE_TOLERANCE)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantileFrame {
    pub rows: Vec<QuantileRow>,
}

/// A zero-shot forecaster that returns a quantile table per horizon step.
pub trait QuantileBackend: Send + Sync {
    fn fit_predict(
        &self,
        panel: &TimeSeriesPanel,
        settings: &ZeroShotSettings,
    ) -> Result<QuantileFrame, ForecastError>;
}

pub struct QuantileTableAdapter {
    backend: Box<dyn QuantileBackend>,
    time_limit: Duration,
    mean_source: MeanSource,
    capture_level: Level,
}

impl QuantileTableAdapter {
    pub fn new(backend: impl QuantileBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            time_limit: DEFAULT_TIME_LIMIT,
            mean_source: MeanSource::default(),
            capture_level: Level::INFO,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_mean_source(mut self, mean_source: MeanSource) -> Self {
        self.mean_source = mean_source;
        self
    }

    pub fn with_capture_level(mut self, level: Level) -> Self {
        self.capture_level = level;
        self
    }

    fn run(&self, request: &ForecastRequest, data: &Dataset) -> Result<ForecastTable, ForecastError> {
        let mut frame = data.clone();
        if request.target_column != TARGET_COLUMN {
            frame.rename_column(&request.target_column, TARGET_COLUMN);
        }

        let (panel, dropped) = TimeSeriesPanel::from_dataset(
            &frame,
            &request.series_id_column,
            &request.timestamp_column,
            TARGET_COLUMN,
        );
        if dropped > 0 {
            warn!("Dropped {} rows without a series id or timestamp", dropped);
        }
        if panel.is_empty() {
            return Err(ForecastError::EmptySeries);
        }

        let settings = ZeroShotSettings {
            model_path: request
                .options
                .model_path
                .clone()
                .unwrap_or_else(|| request.model_identifier.clone()),
            name_suffix: ZERO_SHOT_SUFFIX.to_string(),
            prediction_length: request.horizon,
            frequency: request.frequency,
            time_limit: request
                .options
                .time_limit_secs
                .map(Duration::from_secs)
                .unwrap_or(self.time_limit),
            enable_ensemble: false,
        };

        info!(
            "Zero-shot forecast with {} ({} series, {} points, horizon {}, budget {:?})",
            settings.model_path,
            panel.len(),
            panel.total_points(),
            settings.prediction_length,
            settings.time_limit
        );

        let started = Instant::now();
        let prediction = self.backend.fit_predict(&panel, &settings)?;
        info!(
            "Backend returned {} rows in {:.1}s",
            prediction.rows.len(),
            started.elapsed().as_secs_f64()
        );

        if prediction.rows.is_empty() {
            return Err(ForecastError::NoForecasts);
        }

        let rows = prediction
            .rows
            .into_iter()
            .map(|row| self.to_forecast_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ForecastTable::new(rows))
    }

    fn to_forecast_row(&self, row: QuantileRow) -> Result<ForecastRow, ForecastError> {
        let median = row.quantile(0.5);
        let mean = match self.mean_source {
            MeanSource::MeanOrMedian => row.mean.or(median),
            MeanSource::Median => median,
        }
        .ok_or_else(|| ForecastError::MissingQuantile("mean".into()))?;

        let p10 = row
            .quantile(0.1)
            .ok_or_else(|| ForecastError::MissingQuantile("0.1".into()))?;
        let p90 = row
            .quantile(0.9)
            .ok_or_else(|| ForecastError::MissingQuantile("0.9".into()))?;

        Ok(ForecastRow {
            timestamp: row.timestamp,
            mean,
            p10,
            p90,
            series_id: Some(row.item_id),
        })
    }
}

impl Forecaster for QuantileTableAdapter {
    fn predict(&self, request: &ForecastRequest, data: &Dataset) -> AdapterOutput {
        let capture = LogCapture::new(self.capture_level);
        let result = capture.run(|| self.run(request, data));

        match result {
            Ok(table) => AdapterOutput::Logged(table, capture.finish()),
            Err(err) => {
                capture.append(&format!("Exception: {}", err));
                AdapterOutput::Logged(ForecastTable::empty(), capture.finish())
            }
        }
    }
}

/// Forwards the panel to a zero-shot inference service over HTTP.
///
/// The wall-clock budget is the request timeout. Lines of the service's own
/// log are replayed as tracing events so they end up in the captured log.
pub struct HttpQuantileBackend {
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct PredictPayload<'a> {
    model_path: &'a str,
    name_suffix: &'a str,
    prediction_length: usize,
    freq: String,
    time_limit: u64,
    enable_ensemble: bool,
    data: Vec<PayloadPoint<'a>>,
}

#[derive(Debug, Serialize)]
struct PayloadPoint<'a> {
    item_id: &'a str,
    timestamp: NaiveDateTime,
    target: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<WireRow>,
    #[serde(default)]
    log: String,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    item_id: serde_json::Value,
    timestamp: String,
    #[serde(default)]
    mean: Option<f64>,
    #[serde(flatten)]
    columns: HashMap<String, serde_json::Value>,
}

impl HttpQuantileBackend {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }
}

impl QuantileBackend for HttpQuantileBackend {
    fn fit_predict(
        &self,
        panel: &TimeSeriesPanel,
        settings: &ZeroShotSettings,
    ) -> Result<QuantileFrame, ForecastError> {
        let data: Vec<PayloadPoint> = panel
            .series()
            .flat_map(|(id, points)| {
                points.iter().map(move |p| PayloadPoint {
                    item_id: id,
                    timestamp: p.timestamp,
                    target: p.target,
                })
            })
            .collect();

        let payload = PredictPayload {
            model_path: &settings.model_path,
            name_suffix: &settings.name_suffix,
            prediction_length: settings.prediction_length,
            freq: settings.frequency.to_string(),
            time_limit: settings.time_limit.as_secs(),
            enable_ensemble: settings.enable_ensemble,
            data,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(settings.time_limit)
            .build()
            .map_err(|e| ForecastError::Backend(format!("failed to build HTTP client: {}", e)))?;

        let url = format!("{}/predict", self.endpoint.trim_end_matches('/'));
        let response = client.post(&url).json(&payload).send().map_err(|e| {
            if e.is_timeout() {
                ForecastError::Timeout(settings.time_limit)
            } else {
                ForecastError::Backend(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ForecastError::Backend(format!(
                "inference service returned {}: {}",
                status, body
            )));
        }

        let body: PredictResponse = response
            .json()
            .map_err(|e| ForecastError::Backend(format!("unreadable prediction: {}", e)))?;

        for line in body.log.lines().filter(|l| !l.trim().is_empty()) {
            info!("{}", line);
        }

        let rows = body
            .predictions
            .into_iter()
            .map(wire_row_to_quantile_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QuantileFrame { rows })
    }
}

fn wire_row_to_quantile_row(row: WireRow) -> Result<QuantileRow, ForecastError> {
    let timestamp = parse_timestamp_str(&row.timestamp).ok_or_else(|| {
        ForecastError::Backend(format!("unparseable forecast timestamp '{}'", row.timestamp))
    })?;

    let item_id = match row.item_id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };

    let mut quantiles: Vec<(f64, f64)> = row
        .columns
        .iter()
        .filter_map(|(key, value)| Some((quantile_level(key)?, value.as_f64()?)))
        .collect();
    quantiles.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    Ok(QuantileRow {
        item_id,
        timestamp,
        mean: row.mean,
        quantiles,
    })
}

/// Reads a quantile column name: `"0.1"` style levels or `"p10"` style percentiles.
fn quantile_level(key: &str) -> Option<f64> {
    let key = key.trim();
    let level = match key.strip_prefix('p').or_else(|| key.strip_prefix('P')) {
        Some(pct) => pct.parse::<f64>().ok()? / 100.0,
        None => key.parse::<f64>().ok()?,
    };
    (level > 0.0 && level < 1.0).then_some(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{CellValue, Record};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn day(n: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, n)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn dataset(rows: &[(&str, u32, Option<f64>)]) -> Dataset {
        let rows: Vec<Record> = rows
            .iter()
            .map(|(id, d, v)| {
                let mut r = Record::new();
                r.insert("store".into(), CellValue::Text(id.to_string()));
                r.insert("day".into(), CellValue::Timestamp(day(*d)));
                r.insert(
                    "sales".into(),
                    v.map(CellValue::Float).unwrap_or(CellValue::Null),
                );
                r
            })
            .collect();
        Dataset::new(vec!["store".into(), "day".into(), "sales".into()], rows)
    }

    /// Records what it was asked and answers with a fixed frame.
    struct RecordingBackend {
        calls: AtomicUsize,
        seen: Mutex<Option<(TimeSeriesPanel, ZeroShotSettings)>>,
        answer: Result<QuantileFrame, String>,
    }

    impl RecordingBackend {
        fn answering(frame: QuantileFrame) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(None),
                answer: Ok(frame),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(None),
                answer: Err(message.to_string()),
            }
        }
    }

    impl QuantileBackend for Arc<RecordingBackend> {
        fn fit_predict(
            &self,
            panel: &TimeSeriesPanel,
            settings: &ZeroShotSettings,
        ) -> Result<QuantileFrame, ForecastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some((panel.clone(), settings.clone()));
            self.answer.clone().map_err(ForecastError::Backend)
        }
    }

    fn quantile_row(d: u32, mean: Option<f64>, levels: &[(f64, f64)]) -> QuantileRow {
        QuantileRow {
            item_id: "A".into(),
            timestamp: day(d),
            mean,
            quantiles: levels.to_vec(),
        }
    }

    fn request() -> ForecastRequest {
        ForecastRequest::new("amazon/chronos-t5-tiny", "store", "day", "sales", 2)
    }

    #[test]
    fn test_panel_sorts_by_series_then_time() {
        let data = dataset(&[("B", 2, Some(1.0)), ("A", 3, Some(2.0)), ("A", 1, None), ("B", 1, Some(4.0))]);
        let (panel, dropped) = TimeSeriesPanel::from_dataset(&data, "store", "day", "sales");

        assert_eq!(dropped, 0);
        let series: Vec<(&str, Vec<NaiveDateTime>)> = panel
            .series()
            .map(|(id, pts)| (id, pts.iter().map(|p| p.timestamp).collect()))
            .collect();
        assert_eq!(
            series,
            vec![("A", vec![day(1), day(3)]), ("B", vec![day(1), day(2)])]
        );
        assert_eq!(panel.total_points(), 4);
    }

    #[test]
    fn test_backend_sees_zero_shot_settings() {
        let backend = Arc::new(RecordingBackend::answering(QuantileFrame {
            rows: vec![quantile_row(4, Some(3.0), &[(0.1, 1.0), (0.5, 2.5), (0.9, 5.0)])],
        }));
        let adapter = QuantileTableAdapter::new(Arc::clone(&backend));

        let (table, log) = adapter
            .predict(&request(), &dataset(&[("A", 1, Some(1.0)), ("A", 2, Some(2.0))]))
            .into_parts();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].mean, 3.0);
        assert!(log.contains("Zero-shot forecast with amazon/chronos-t5-tiny"));

        let seen = backend.seen.lock().unwrap();
        let (panel, settings) = seen.as_ref().unwrap();
        assert_eq!(panel.len(), 1);
        assert_eq!(settings.model_path, "amazon/chronos-t5-tiny");
        assert_eq!(settings.name_suffix, "-ZeroShot");
        assert_eq!(settings.time_limit, Duration::from_secs(180));
        assert!(!settings.enable_ensemble);
    }

    #[test]
    fn test_median_stands_in_for_missing_mean() {
        let backend = Arc::new(RecordingBackend::answering(QuantileFrame {
            rows: vec![quantile_row(4, None, &[(0.1, 1.0), (0.5, 2.5), (0.9, 5.0)])],
        }));
        let adapter = QuantileTableAdapter::new(backend);

        let (table, _) = adapter
            .predict(&request(), &dataset(&[("A", 1, Some(1.0))]))
            .into_parts();
        assert_eq!(table.rows()[0].mean, 2.5);
        assert_eq!(table.rows()[0].p10, 1.0);
        assert_eq!(table.rows()[0].p90, 5.0);
    }

    #[test]
    fn test_median_policy_overrides_explicit_mean() {
        let backend = Arc::new(RecordingBackend::answering(QuantileFrame {
            rows: vec![quantile_row(4, Some(9.0), &[(0.1, 1.0), (0.5, 2.5), (0.9, 5.0)])],
        }));
        let adapter = QuantileTableAdapter::new(backend).with_mean_source(MeanSource::Median);

        let (table, _) = adapter
            .predict(&request(), &dataset(&[("A", 1, Some(1.0))]))
            .into_parts();
        assert_eq!(table.rows()[0].mean, 2.5);
    }

    #[test]
    fn test_missing_quantile_degrades_to_empty_table() {
        let backend = Arc::new(RecordingBackend::answering(QuantileFrame {
            rows: vec![quantile_row(4, Some(3.0), &[(0.5, 2.5)])],
        }));
        let adapter = QuantileTableAdapter::new(backend);

        let (table, log) = adapter
            .predict(&request(), &dataset(&[("A", 1, Some(1.0))]))
            .into_parts();
        assert!(table.is_empty());
        assert!(log.contains("Exception: Prediction has no 0.1 column"));
    }

    #[test]
    fn test_backend_failure_is_logged_not_raised() {
        let backend = Arc::new(RecordingBackend::failing("CUDA out of memory"));
        let adapter = QuantileTableAdapter::new(Arc::clone(&backend));

        let (table, log) = adapter
            .predict(&request(), &dataset(&[("A", 1, Some(1.0))]))
            .into_parts();
        assert!(table.is_empty());
        assert!(log.contains("CUDA out of memory"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rows_without_timestamps_leave_nothing_to_forecast() {
        let mut data = dataset(&[("A", 1, Some(1.0))]);
        data.rows[0].insert("day".into(), CellValue::Null);
        let backend = Arc::new(RecordingBackend::failing("unreachable"));
        let adapter = QuantileTableAdapter::new(Arc::clone(&backend));

        let (table, log) = adapter.predict(&request(), &data).into_parts();
        assert!(table.is_empty());
        assert!(log.contains("Empty time series"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_quantile_level_conventions() {
        assert_eq!(quantile_level("0.1"), Some(0.1));
        assert_eq!(quantile_level("p90"), Some(0.9));
        assert_eq!(quantile_level("mean"), None);
        assert_eq!(quantile_level("item_id"), None);
        assert_eq!(quantile_level("1.5"), None);
    }

    #[test]
    fn test_wire_row_reads_mixed_quantile_columns() {
        let wire: WireRow = serde_json::from_value(serde_json::json!({
            "item_id": 7,
            "timestamp": "2024-01-08 00:00:00",
            "0.1": 4.0,
            "p50": 5.0,
            "0.9": 6.5,
        }))
        .unwrap();

        let row = wire_row_to_quantile_row(wire).unwrap();
        assert_eq!(row.item_id, "7");
        assert_eq!(row.mean, None);
        assert_eq!(row.quantile(0.1), Some(4.0));
        assert_eq!(row.quantile(0.5), Some(5.0));
        assert_eq!(row.quantile(0.9), Some(6.5));
    }

    /// Answers a single request with a canned response; the handle yields the request body.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request_body(&mut stream);
            thread::sleep(delay);
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(reply.as_bytes());
            request
        });
        (url, handle)
    }

    fn read_request_body(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                return String::new();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let start = end + 4;
                if buf.len() >= start + length {
                    return String::from_utf8_lossy(&buf[start..start + length]).into_owned();
                }
            }
        }
    }

    fn http_settings(time_limit: Duration) -> ZeroShotSettings {
        ZeroShotSettings {
            model_path: "amazon/chronos-t5-tiny".into(),
            name_suffix: ZERO_SHOT_SUFFIX.into(),
            prediction_length: 2,
            frequency: Frequency::DAILY,
            time_limit,
            enable_ensemble: false,
        }
    }

    fn http_panel() -> TimeSeriesPanel {
        let data = dataset(&[("A", 1, Some(1.0)), ("A", 2, None)]);
        TimeSeriesPanel::from_dataset(&data, "store", "day", "sales").0
    }

    #[test]
    fn test_http_backend_posts_panel_and_reads_predictions() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"predictions":[{"item_id":"A","timestamp":"2024-01-03 00:00:00","mean":2.0,"0.1":1.0,"0.5":2.0,"0.9":3.0}],"log":"Fitting ChronosZeroShot\n"}"#,
            Duration::ZERO,
        );
        let backend = HttpQuantileBackend::new(format!("{}/", url));

        let frame = backend
            .fit_predict(&http_panel(), &http_settings(Duration::from_secs(10)))
            .unwrap();

        assert_eq!(frame.rows.len(), 1);
        let row = &frame.rows[0];
        assert_eq!(row.item_id, "A");
        assert_eq!(row.timestamp, day(3));
        assert_eq!(row.mean, Some(2.0));
        assert_eq!(row.quantile(0.9), Some(3.0));

        let payload: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(payload["model_path"], "amazon/chronos-t5-tiny");
        assert_eq!(payload["name_suffix"], "-ZeroShot");
        assert_eq!(payload["prediction_length"], 2);
        assert_eq!(payload["freq"], "D");
        assert_eq!(payload["time_limit"], 10);
        assert_eq!(payload["enable_ensemble"], false);
        let data = payload["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["item_id"], "A");
        assert_eq!(data[0]["target"], 1.0);
        assert!(data[1]["target"].is_null());
    }

    #[test]
    fn test_http_backend_error_status_is_a_backend_error() {
        let (url, _server) = serve_once(
            "500 Internal Server Error",
            "model weights missing",
            Duration::ZERO,
        );
        let backend = HttpQuantileBackend::new(url);

        let err = backend
            .fit_predict(&http_panel(), &http_settings(Duration::from_secs(10)))
            .unwrap_err();

        match err {
            ForecastError::Backend(message) => {
                assert!(message.contains("500"));
                assert!(message.contains("model weights missing"));
            }
            other => panic!("expected a backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_http_backend_slow_reply_is_a_timeout() {
        let (url, _server) = serve_once("200 OK", "{}", Duration::from_secs(3));
        let backend = HttpQuantileBackend::new(url);
        let limit = Duration::from_millis(300);

        let err = backend
            .fit_predict(&http_panel(), &http_settings(limit))
            .unwrap_err();

        assert!(matches!(err, ForecastError::Timeout(d) if d == limit));
    }

    #[test]
    fn test_http_backend_unreachable_endpoint() {
        let backend = HttpQuantileBackend::new("http://127.0.0.1:9".into());

        let err = backend
            .fit_predict(&http_panel(), &http_settings(Duration::from_secs(2)))
            .unwrap_err();

        assert!(matches!(err, ForecastError::Backend(ref m) if m.contains("127.0.0.1:9/predict")));
    }
}
