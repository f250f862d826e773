//! Adapter for backends that answer with a matrix of sampled future paths.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, Level};

use crate::data::cache::PredictorCache;
use crate::data::sanitize::{parse_target, parse_timestamp};
use crate::data::types::Dataset;
use crate::forecast::dispatch::Forecaster;
use crate::forecast::error::{error_chain, ForecastError};
use crate::forecast::frequency::Frequency;
use crate::forecast::types::{AdapterOutput, ForecastRequest, ForecastRow, ForecastTable};
use crate::monitoring::capture::LogCapture;

pub const DEFAULT_CHECKPOINT: &str = "lag-llama.ckpt";
pub const DEFAULT_NUM_SAMPLES: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Settings a predictor is built with. The cache is keyed by checkpoint
/// path only, so these apply to whichever request loads the checkpoint first.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorSettings {
    pub context_length: usize,
    pub use_rope_scaling: bool,
    pub num_parallel_samples: usize,
    pub device: Option<String>,
    pub batch_size: usize,
}

/// A single univariate series handed to the predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesEntry {
    pub start: NaiveDateTime,
    /// Last observed timestamp. Gaps mean this is not `start + len` steps.
    pub end: NaiveDateTime,
    pub frequency: Frequency,
    /// Missing observations are NaN.
    pub target: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleForecast {
    /// `num_samples` rows, one column per horizon step.
    pub samples: Vec<Vec<f64>>,
    /// First forecast timestamp, when the predictor reports one.
    pub start_date: Option<NaiveDateTime>,
}

pub trait SamplePredictor: Send {
    fn predict(
        &mut self,
        entry: &SeriesEntry,
        prediction_length: usize,
        num_samples: usize,
    ) -> Result<Vec<SampleForecast>, ForecastError>;
}

pub trait PredictorFactory: Send + Sync {
    fn create(
        &self,
        checkpoint: &Path,
        settings: &PredictorSettings,
    ) -> Result<Box<dyn SamplePredictor>, ForecastError>;
}

/// A loaded predictor; the mutex serializes concurrent use of one checkpoint.
pub type SharedPredictor = Arc<Mutex<Box<dyn SamplePredictor>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleDefaults {
    pub checkpoint_path: PathBuf,
    pub num_samples: usize,
    pub batch_size: usize,
    pub use_rope_scaling: bool,
    pub device: Option<String>,
}

impl Default for SampleDefaults {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            num_samples: DEFAULT_NUM_SAMPLES,
            batch_size: DEFAULT_BATCH_SIZE,
            use_rope_scaling: false,
            device: None,
        }
    }
}

pub struct SampleMatrixAdapter {
    factory: Arc<dyn PredictorFactory>,
    cache: Arc<PredictorCache<SharedPredictor>>,
    defaults: SampleDefaults,
    capture_level: Level,
}

impl SampleMatrixAdapter {
    pub fn new(factory: impl PredictorFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            cache: Arc::new(PredictorCache::new()),
            defaults: SampleDefaults::default(),
            capture_level: Level::INFO,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PredictorCache<SharedPredictor>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_defaults(mut self, defaults: SampleDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_capture_level(mut self, level: Level) -> Self {
        self.capture_level = level;
        self
    }

    pub fn cache(&self) -> &Arc<PredictorCache<SharedPredictor>> {
        &self.cache
    }

    fn run(&self, request: &ForecastRequest, data: &Dataset) -> Result<ForecastTable, ForecastError> {
        let horizon = request.horizon;
        let options = &request.options;

        let mut points: Vec<(NaiveDateTime, f64)> = data
            .rows
            .iter()
            .filter_map(|row| {
                let ts = row.get(&request.timestamp_column).and_then(parse_timestamp)?;
                let value = row
                    .get(&request.target_column)
                    .and_then(parse_target)
                    .unwrap_or(f64::NAN);
                Some((ts, value))
            })
            .collect();
        points.sort_by_key(|(ts, _)| *ts);

        let (first_ts, last_ts) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => return Err(ForecastError::EmptySeries),
        };

        let context_length = options
            .context_length
            .unwrap_or_else(|| default_context_length(points.len(), horizon));

        let checkpoint = options
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| self.defaults.checkpoint_path.clone());
        if !checkpoint.exists() {
            return Err(ForecastError::CheckpointNotFound(checkpoint));
        }

        let num_samples = options.num_samples.unwrap_or(self.defaults.num_samples);
        let settings = PredictorSettings {
            context_length,
            use_rope_scaling: options.use_rope_scaling.unwrap_or(self.defaults.use_rope_scaling),
            num_parallel_samples: num_samples,
            device: options.device.clone().or_else(|| self.defaults.device.clone()),
            batch_size: options.batch_size.unwrap_or(self.defaults.batch_size),
        };

        let predictor = self.cache.get_or_create(&checkpoint, || {
            self.factory
                .create(&checkpoint, &settings)
                .map(|p| Arc::new(Mutex::new(p)))
        })?;

        let entry = SeriesEntry {
            start: first_ts,
            end: last_ts,
            frequency: request.frequency,
            target: points.iter().map(|(_, v)| *v).collect(),
        };

        info!(
            "Sampling {} paths over {} steps (context {}, {} observations)",
            num_samples,
            horizon,
            context_length,
            entry.target.len()
        );

        let forecasts = {
            let mut guard = predictor
                .lock()
                .map_err(|_| ForecastError::Backend("predictor lock poisoned".into()))?;
            guard.predict(&entry, horizon, num_samples)?
        };
        let forecast = forecasts
            .into_iter()
            .next()
            .ok_or(ForecastError::NoForecasts)?;

        let stats = summarize_samples(&forecast.samples, horizon)?;

        let horizon_start = match forecast.start_date {
            Some(start) => start,
            None => {
                debug!("Predictor reported no start date; stepping from last observation");
                request
                    .frequency
                    .step_after(last_ts)
                    .ok_or(ForecastError::TimestampOverflow(last_ts))?
            }
        };
        let axis = request
            .frequency
            .date_range(horizon_start, horizon)
            .ok_or(ForecastError::TimestampOverflow(horizon_start))?;

        let rows = axis
            .into_iter()
            .zip(stats)
            .map(|(timestamp, s)| ForecastRow::new(timestamp, s.mean, s.p10, s.p90))
            .collect();

        Ok(ForecastTable::new(rows))
    }
}

impl Forecaster for SampleMatrixAdapter {
    fn predict(&self, request: &ForecastRequest, data: &Dataset) -> AdapterOutput {
        let capture = LogCapture::new(self.capture_level);
        match capture.run(|| self.run(request, data)) {
            Ok(table) => AdapterOutput::Bare(table),
            Err(err) => {
                capture.append(&error_chain(&err));
                AdapterOutput::Logged(ForecastTable::empty(), capture.finish())
            }
        }
    }
}

/// `min(available, max(3 * horizon, horizon))`
pub fn default_context_length(available: usize, horizon: usize) -> usize {
    available.min(horizon.saturating_mul(3).max(horizon))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSummary {
    pub mean: f64,
    pub p10: f64,
    pub p90: f64,
}

/// Column-wise mean, 10th and 90th percentile over sample paths.
pub fn summarize_samples(samples: &[Vec<f64>], horizon: usize) -> Result<Vec<StepSummary>, ForecastError> {
    if samples.is_empty() {
        return Err(ForecastError::MalformedSamples("no sample paths".into()));
    }
    if let Some((i, path)) = samples.iter().enumerate().find(|(_, p)| p.len() < horizon) {
        return Err(ForecastError::MalformedSamples(format!(
            "sample path {} has {} steps, expected {}",
            i,
            path.len(),
            horizon
        )));
    }

    (0..horizon)
        .map(|step| {
            let mut column: Vec<f64> = samples
                .iter()
                .map(|path| path[step])
                .filter(|v| v.is_finite())
                .collect();
            if column.is_empty() {
                return Err(ForecastError::MalformedSamples(format!(
                    "step {} has no finite samples",
                    step
                )));
            }
            column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            Ok(StepSummary {
                mean: column.iter().sum::<f64>() / column.len() as f64,
                p10: percentile(&column, 10.0),
                p90: percentile(&column, 90.0),
            })
        })
        .collect()
}

/// Linear-interpolation percentile over sorted values.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}
