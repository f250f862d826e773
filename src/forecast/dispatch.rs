use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::sanitize::require_columns;
use crate::data::types::Dataset;
use crate::forecast::error::ForecastError;
use crate::forecast::quantile::QuantileTableAdapter;
use crate::forecast::sample::SampleMatrixAdapter;
use crate::forecast::types::{AdapterOutput, ForecastRequest, ForecastTable};
use crate::monitoring::capture::DiagnosticLog;

/// Identifiers served by the sample-matrix family.
pub const SAMPLE_MATRIX_MODELS: &[&str] = &["lag-llama"];

/// Identifiers served by the quantile-table family.
pub const QUANTILE_TABLE_MODELS: &[&str] = &[
    "amazon/chronos-t5-tiny",
    "amazon/chronos-t5-small",
    "amazon/chronos-t5-base",
    "amazon/chronos-bolt-tiny",
    "amazon/chronos-bolt-mini",
    "amazon/chronos-bolt-small",
    "amazon/chronos-bolt-base",
];

/// Uniform contract every backend family implements.
///
/// Implementations never fail: problems inside the backend come back as an
/// empty table with the reason written into the log.
pub trait Forecaster: Send + Sync {
    fn predict(&self, request: &ForecastRequest, data: &Dataset) -> AdapterOutput;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    QuantileTable,
    SampleMatrix,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::QuantileTable => write!(f, "quantile-table"),
            BackendKind::SampleMatrix => write!(f, "sample-matrix"),
        }
    }
}

/// A registered backend. Several identifiers may share one adapter.
#[derive(Clone)]
pub enum Backend {
    QuantileTable(Arc<QuantileTableAdapter>),
    SampleMatrix(Arc<SampleMatrixAdapter>),
    Custom(BackendKind, Arc<dyn Forecaster>),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::QuantileTable(_) => BackendKind::QuantileTable,
            Backend::SampleMatrix(_) => BackendKind::SampleMatrix,
            Backend::Custom(kind, _) => *kind,
        }
    }
}

impl Forecaster for Backend {
    fn predict(&self, request: &ForecastRequest, data: &Dataset) -> AdapterOutput {
        match self {
            Backend::QuantileTable(adapter) => adapter.predict(request, data),
            Backend::SampleMatrix(adapter) => adapter.predict(request, data),
            Backend::Custom(_, forecaster) => forecaster.predict(request, data),
        }
    }
}

/// Static mapping from model identifier to backend.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    backends: BTreeMap<String, Backend>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every known identifier bound to the given adapters.
    pub fn with_defaults(quantile: QuantileTableAdapter, sample: SampleMatrixAdapter) -> Self {
        let quantile = Arc::new(quantile);
        let sample = Arc::new(sample);
        let mut registry = Self::new();

        for id in QUANTILE_TABLE_MODELS {
            registry.register(*id, Backend::QuantileTable(Arc::clone(&quantile)));
        }
        for id in SAMPLE_MATRIX_MODELS {
            registry.register(*id, Backend::SampleMatrix(Arc::clone(&sample)));
        }
        registry
    }

    pub fn register(&mut self, identifier: impl Into<String>, backend: Backend) {
        let identifier = identifier.into();
        if self.backends.insert(identifier.clone(), backend).is_some() {
            warn!("Model '{}' registered twice; keeping the latest backend", identifier);
        }
    }

    pub fn resolve(&self, identifier: &str) -> Result<&Backend, ForecastError> {
        self.backends
            .get(identifier)
            .ok_or_else(|| ForecastError::UnknownModel(identifier.to_string()))
    }

    pub fn identifiers(&self) -> impl Iterator<Item = (&str, BackendKind)> {
        self.backends.iter().map(|(id, b)| (id.as_str(), b.kind()))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

pub struct Dispatcher {
    registry: ModelRegistry,
}

impl Dispatcher {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Route a request to its backend.
    ///
    /// Only request-level problems (unknown model, bad horizon, missing
    /// columns) are returned as errors; they are detected before any backend
    /// is touched. Backend failures arrive as an empty table plus log.
    pub fn predict(
        &self,
        request: &ForecastRequest,
        data: &Dataset,
    ) -> Result<(ForecastTable, DiagnosticLog), ForecastError> {
        let backend = self.registry.resolve(&request.model_identifier)?;
        request.validate()?;
        require_columns(data, &request.required_columns())?;

        info!(
            "Dispatching {} ({}) over {} rows, horizon {}",
            request.model_identifier,
            backend.kind(),
            data.len(),
            request.horizon
        );

        Ok(backend.predict(request, data).into_parts())
    }
}
