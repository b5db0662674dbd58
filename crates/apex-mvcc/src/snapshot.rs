//! Read-only pre-batch state

use crate::view::StateSource;
use apex_types::{AccessKey, StateValue};
use dashmap::DashMap;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Pre-batch state shared by every worker
///
/// Values are loaded from the [`StateSource`] once and cached; the cache
/// can be warmed ahead of execution with [`prefetch`](Self::prefetch).
pub struct SnapshotState {
    source: Arc<dyn StateSource>,
    cache: DashMap<AccessKey, StateValue>,
}

impl SnapshotState {
    /// Snapshot over `source`
    pub fn new(source: Arc<dyn StateSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Value of `key` before the batch
    pub fn get(&self, key: &AccessKey) -> StateValue {
        if let Some(value) = self.cache.get(key) {
            return value.clone();
        }
        let value = self.source.load(key);
        self.cache.entry(*key).or_insert(value).value().clone()
    }

    /// Load `keys` into the cache in parallel; returns how many were new
    pub fn prefetch(&self, keys: &[AccessKey]) -> usize {
        let loaded = keys
            .par_iter()
            .filter(|key| !self.cache.contains_key(*key))
            .map(|key| {
                let value = self.source.load(key);
                self.cache.insert(*key, value).is_none()
            })
            .filter(|fresh| *fresh)
            .count();
        tracing::debug!(requested = keys.len(), loaded, "snapshot prefetched");
        loaded
    }

    /// Number of cached values
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotState")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
