//! Built-in non-parametric sampler that speaks the sample-matrix contract.
//!
//! Each future step is drawn from the recent history, with an
//! exponentially decaying preference for the latest observations. Drawn
//! values are fed back into the history so paths evolve step by step.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::forecast::error::ForecastError;
use crate::forecast::sample::{
    PredictorFactory, PredictorSettings, SampleForecast, SamplePredictor, SeriesEntry,
};

pub const CHECKPOINT_KIND: &str = "npts";
pub const DEFAULT_KERNEL_SCALE: f64 = 0.1;

/// On-disk checkpoint, a small TOML document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NptsCheckpoint {
    pub kind: String,
    #[serde(default = "default_kernel_scale")]
    pub kernel_scale: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_kernel_scale() -> f64 {
    DEFAULT_KERNEL_SCALE
}

impl NptsCheckpoint {
    pub fn load(path: &Path) -> Result<Self, ForecastError> {
        let load_err = |reason: String| ForecastError::PredictorLoad {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let checkpoint: NptsCheckpoint =
            toml::from_str(&content).map_err(|e| load_err(e.to_string()))?;

        if checkpoint.kind != CHECKPOINT_KIND {
            return Err(load_err(format!(
                "unsupported checkpoint kind '{}'",
                checkpoint.kind
            )));
        }
        if !checkpoint.kernel_scale.is_finite() || checkpoint.kernel_scale < 0.0 {
            return Err(load_err(format!(
                "kernel_scale must be a non-negative number, got {}",
                checkpoint.kernel_scale
            )));
        }
        Ok(checkpoint)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NptsPredictorFactory;

impl PredictorFactory for NptsPredictorFactory {
    fn create(
        &self,
        checkpoint: &Path,
        settings: &PredictorSettings,
    ) -> Result<Box<dyn SamplePredictor>, ForecastError> {
        let checkpoint = NptsCheckpoint::load(checkpoint)?;
        if let Some(device) = &settings.device {
            debug!("NPTS sampler runs on the host; ignoring device '{}'", device);
        }
        info!(
            "NPTS sampler ready (context {}, kernel scale {})",
            settings.context_length, checkpoint.kernel_scale
        );
        Ok(Box::new(NptsPredictor::new(
            settings.context_length,
            checkpoint.kernel_scale,
            checkpoint.seed,
        )))
    }
}

pub struct NptsPredictor {
    context_length: usize,
    kernel_scale: f64,
    rng: StdRng,
}

impl NptsPredictor {
    pub fn new(context_length: usize, kernel_scale: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            context_length: context_length.max(1),
            kernel_scale,
            rng,
        }
    }

    fn sample_path(&mut self, history: &[f64], prediction_length: usize) -> Result<Vec<f64>, ForecastError> {
        let mut window: Vec<f64> = history.to_vec();
        let mut path = Vec::with_capacity(prediction_length);

        for _ in 0..prediction_length {
            let len = window.len();
            let weights = (0..len).map(|i| (-self.kernel_scale * (len - i) as f64).exp());
            let index = WeightedIndex::new(weights)
                .map_err(|e| ForecastError::Backend(format!("NPTS weights: {}", e)))?;
            let value = window[index.sample(&mut self.rng)];

            path.push(value);
            window.push(value);
            if window.len() > self.context_length {
                window.remove(0);
            }
        }
        Ok(path)
    }
}

impl SamplePredictor for NptsPredictor {
    fn predict(
        &mut self,
        entry: &SeriesEntry,
        prediction_length: usize,
        num_samples: usize,
    ) -> Result<Vec<SampleForecast>, ForecastError> {
        let finite: Vec<f64> = entry.target.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        let history = &finite[finite.len().saturating_sub(self.context_length)..];

        let samples = (0..num_samples)
            .map(|_| self.sample_path(history, prediction_length))
            .collect::<Result<Vec<_>, _>>()?;

        let start_date = entry.frequency.step_after(entry.end);

        Ok(vec![SampleForecast { samples, start_date }])
    }
}
