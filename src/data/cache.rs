use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Process-wide home for loaded predictors, keyed by checkpoint path.
///
/// Holds one resident predictor: asking for a different checkpoint evicts
/// the previous one. Construction runs while the entry for that key is
/// locked, so concurrent first requests for one checkpoint build it once.
pub struct PredictorCache<H> {
    slots: DashMap<PathBuf, H>,
    constructions: AtomicUsize,
}

impl<H: Clone> PredictorCache<H> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Return the cached handle for `key`, building it with `factory` on first use.
    /// A failed build leaves nothing cached.
    pub fn get_or_create<F, E>(&self, key: &Path, factory: F) -> Result<H, E>
    where
        F: FnOnce() -> Result<H, E>,
    {
        self.slots.retain(|cached, _| cached.as_path() == key);

        let entry = self
            .slots
            .entry(key.to_path_buf())
            .or_try_insert_with(|| {
                let handle = factory()?;
                self.constructions.fetch_add(1, Ordering::SeqCst);
                info!("Loaded predictor for checkpoint {}", key.display());
                Ok(handle)
            })?;

        Ok(entry.value().clone())
    }

    /// Number of times a factory actually ran.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.slots.contains_key(key)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<H: Clone> Default for PredictorCache<H> {
    fn default() -> Self {
        Self::new()
    }
}
