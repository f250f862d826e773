//! Forecast dispatch: backend adapters, the model registry, and output
//! normalization into the `(timestamp, mean, p10, p90)` contract.

pub mod dispatch;
pub mod error;
pub mod frequency;
pub mod normalize;
pub mod npts;
pub mod quantile;
pub mod sample;
pub mod service;
pub mod types;

pub use dispatch::{Backend, BackendKind, Dispatcher, Forecaster, ModelRegistry};
pub use error::{ForecastError, InputError};
pub use frequency::Frequency;
pub use normalize::normalize;
pub use service::{ForecastResponse, ForecastService, ForecastStatus};
pub use types::{AdapterOutput, BackendOptions, ForecastRequest, ForecastRow, ForecastTable};
