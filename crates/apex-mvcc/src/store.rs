//! Sharded map from key to version chain

use crate::chain::{VersionChain, VersionRef};
use crate::error::MvccResult;
use crate::version::{Status, VersionInfo};
use apex_types::{AccessKey, StateValue, TxId};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Batch-scoped multi-version store
///
/// Chains are created on first touch. The store is dropped with the batch;
/// nothing survives into the next one.
#[derive(Debug, Default)]
pub struct VersionStore {
    chains: DashMap<AccessKey, Arc<VersionChain>>,
}

impl VersionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain of `key`, created with just the anchor if missing
    pub fn chain(&self, key: &AccessKey) -> Arc<VersionChain> {
        if let Some(chain) = self.chains.get(key) {
            return Arc::clone(chain.value());
        }
        let entry = self
            .chains
            .entry(*key)
            .or_insert_with(|| Arc::new(VersionChain::new(*key)));
        Arc::clone(entry.value())
    }

    /// Chain of `key` if anything touched it
    pub fn get(&self, key: &AccessKey) -> Option<Arc<VersionChain>> {
        self.chains.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Snapshot anchor of `key`
    pub fn head(&self, key: &AccessKey) -> VersionRef {
        VersionRef::anchor(self.chain(key))
    }

    /// Publish a pending version of `key` produced by `tid`
    pub fn install(&self, key: &AccessKey, tid: TxId, value: StateValue) -> MvccResult<VersionRef> {
        VersionRef::install(self.chain(key), tid, value)
    }

    /// Latest committed transaction value of `key`
    pub fn latest_committed(&self, key: &AccessKey) -> Option<StateValue> {
        self.get(key).and_then(|c| c.latest_committed())
    }

    /// Every key with a committed transaction version, with its latest value
    pub fn committed_writes(&self) -> BTreeMap<AccessKey, StateValue> {
        self.chains
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .latest_committed()
                    .map(|value| (*entry.key(), value))
            })
            .collect()
    }

    /// Copy of `key`'s chain, empty if the key was never touched
    pub fn chain_snapshot(&self, key: &AccessKey) -> Vec<VersionInfo> {
        self.get(key).map(|c| c.versions()).unwrap_or_default()
    }

    /// Number of versions in `key`'s chain with `status`, anchor excluded
    pub fn count_status(&self, key: &AccessKey, status: Status) -> usize {
        self.get(key)
            .map(|c| {
                c.versions()
                    .iter()
                    .skip(1)
                    .filter(|v| v.status == status)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of chains
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no key was touched
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
