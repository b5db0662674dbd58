//! Reverse index from access key to the transactions touching it

use crate::rw_set::RWSet;
use crate::state_key::{AccessKey, TxId};
use std::collections::{BTreeSet, HashMap};

/// Readers and writers of every key accessed in a batch
///
/// Built once per scheduling decision and read-only afterwards. Tid sets
/// iterate in ascending order.
#[derive(Clone, Debug, Default)]
pub struct AccessedBy {
    reads: HashMap<AccessKey, BTreeSet<TxId>>,
    writes: HashMap<AccessKey, BTreeSet<TxId>>,
}

impl AccessedBy {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a whole batch
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (TxId, &'a RWSet)>,
    {
        let mut index = Self::new();
        for (tid, rw_set) in entries {
            index.add(tid, rw_set);
        }
        index
    }

    /// Index one transaction's footprint
    pub fn add(&mut self, tid: TxId, rw_set: &RWSet) {
        for key in rw_set.reads.keys() {
            self.reads.entry(key).or_default().insert(tid);
        }
        for key in rw_set.writes.keys() {
            self.writes.entry(key).or_default().insert(tid);
        }
    }

    /// Transactions that read `key`, ascending
    pub fn readers(&self, key: &AccessKey) -> impl Iterator<Item = TxId> + '_ {
        self.reads.get(key).into_iter().flatten().copied()
    }

    /// Transactions that write `key`, ascending
    pub fn writers(&self, key: &AccessKey) -> impl Iterator<Item = TxId> + '_ {
        self.writes.get(key).into_iter().flatten().copied()
    }

    /// Keys with at least one writer
    pub fn written_keys(&self) -> impl Iterator<Item = &AccessKey> {
        self.writes.keys()
    }

    /// Keys read by at least one transaction
    pub fn read_keys(&self) -> impl Iterator<Item = &AccessKey> {
        self.reads.keys()
    }

    /// Every transaction that appears in the index, ascending
    pub fn tx_ids(&self) -> Vec<TxId> {
        let all: BTreeSet<TxId> = self
            .reads
            .values()
            .chain(self.writes.values())
            .flatten()
            .copied()
            .collect();
        all.into_iter().collect()
    }

    /// Number of distinct keys indexed
    pub fn key_count(&self) -> usize {
        self.reads
            .keys()
            .chain(self.writes.keys().filter(|k| !self.reads.contains_key(*k)))
            .count()
    }
}
