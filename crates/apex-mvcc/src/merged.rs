//! Fallback state: one shared overlay on top of the speculative result

use crate::snapshot::SnapshotState;
use crate::store::VersionStore;
use crate::view::StateView;
use apex_types::{AccessKey, RWSet, StateValue};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Overlay shared by every re-executed transaction
///
/// Reads fall through the overlay, then the latest committed version in
/// the store, then the snapshot. Writes replace whole values in the
/// overlay and are visible to later readers at once.
#[derive(Debug)]
pub struct MergedState<'s> {
    overlay: DashMap<AccessKey, StateValue>,
    versions: Option<&'s VersionStore>,
    snapshot: &'s SnapshotState,
}

impl<'s> MergedState<'s> {
    /// Overlay directly on the snapshot
    pub fn new(snapshot: &'s SnapshotState) -> Self {
        Self {
            overlay: DashMap::new(),
            versions: None,
            snapshot,
        }
    }

    /// Overlay on the committed speculative result
    pub fn over_versions(versions: &'s VersionStore, snapshot: &'s SnapshotState) -> Self {
        Self {
            overlay: DashMap::new(),
            versions: Some(versions),
            snapshot,
        }
    }

    /// Resolve `key` through all layers
    pub fn get(&self, key: &AccessKey) -> StateValue {
        if let Some(value) = self.overlay.get(key) {
            return value.clone();
        }
        self.versions
            .and_then(|v| v.latest_committed(key))
            .unwrap_or_else(|| self.snapshot.get(key))
    }

    /// Overwrite `key` in the overlay
    pub fn put(&self, key: AccessKey, value: StateValue) {
        self.overlay.insert(key, value);
    }

    /// View for one transaction
    pub fn view(&self) -> MergedView<'_, 's> {
        MergedView {
            state: self,
            footprint: RWSet::new(),
        }
    }

    /// Overlay contents, sorted
    pub fn writes(&self) -> BTreeMap<AccessKey, StateValue> {
        self.overlay
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of overlay entries
    pub fn len(&self) -> usize {
        self.overlay.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.overlay.is_empty()
    }
}

/// One transaction's access to a [`MergedState`], recording its footprint
pub struct MergedView<'m, 's> {
    state: &'m MergedState<'s>,
    footprint: RWSet,
}

impl MergedView<'_, '_> {
    /// Keys touched so far
    pub fn footprint(&self) -> &RWSet {
        &self.footprint
    }

    /// Finish and take the footprint
    pub fn into_footprint(self) -> RWSet {
        self.footprint
    }
}

impl StateView for MergedView<'_, '_> {
    fn read(&mut self, key: &AccessKey) -> StateValue {
        if !self.footprint.writes_key(key) {
            self.footprint.record_read(*key);
        }
        self.state.get(key)
    }

    fn write(&mut self, key: AccessKey, value: StateValue) {
        self.footprint.record_write(key);
        self.state.put(key, value);
    }
}
