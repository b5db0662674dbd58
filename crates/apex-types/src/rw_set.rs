//! Read/Write footprints of transactions

use crate::error::TypesResult;
use crate::state_key::{AccessKey, Field};
use apex_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Set of accessed keys, grouped by account
///
/// Iteration is ordered by account then field, so every consumer sees
/// keys in the same order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessSet(BTreeMap<Address, BTreeSet<Field>>);

impl AccessSet {
    /// Create an empty access set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, returning true if it was not present
    pub fn insert(&mut self, key: AccessKey) -> bool {
        self.0.entry(key.address).or_default().insert(key.field)
    }

    /// Check membership
    pub fn contains(&self, key: &AccessKey) -> bool {
        self.0
            .get(&key.address)
            .map(|fields| fields.contains(&key.field))
            .unwrap_or(false)
    }

    /// All keys in account/field order
    pub fn keys(&self) -> impl Iterator<Item = AccessKey> + '_ {
        self.0.iter().flat_map(|(address, fields)| {
            fields.iter().map(move |field| AccessKey::new(*address, *field))
        })
    }

    /// Accounts touched by this set
    pub fn accounts(&self) -> impl Iterator<Item = &Address> {
        self.0.keys()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.0.values().map(|fields| fields.len()).sum()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|fields| fields.is_empty())
    }

    /// Add every key of `other`
    pub fn extend(&mut self, other: &AccessSet) {
        for (address, fields) in &other.0 {
            self.0.entry(*address).or_default().extend(fields.iter().copied());
        }
    }

    /// Whether every key of `self` is in `other`
    pub fn is_subset(&self, other: &AccessSet) -> bool {
        self.keys().all(|key| other.contains(&key))
    }

    /// Whether the two sets share a key
    pub fn intersects(&self, other: &AccessSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.keys().any(|key| large.contains(&key))
    }
}

impl FromIterator<AccessKey> for AccessSet {
    fn from_iter<I: IntoIterator<Item = AccessKey>>(iter: I) -> Self {
        let mut set = AccessSet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// Read/Write set for a transaction
///
/// Tracks which keys a transaction reads and writes. Produced either by a
/// dry-run prediction or by observing an actual execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RWSet {
    /// Keys that were read
    pub reads: AccessSet,
    /// Keys that were written
    pub writes: AccessSet,
}

impl RWSet {
    /// Create a new empty RW set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read access
    pub fn record_read(&mut self, key: AccessKey) {
        self.reads.insert(key);
    }

    /// Record a write access
    pub fn record_write(&mut self, key: AccessKey) {
        self.writes.insert(key);
    }

    /// Check if this transaction reads a key
    pub fn reads_key(&self, key: &AccessKey) -> bool {
        self.reads.contains(key)
    }

    /// Check if this transaction writes a key
    pub fn writes_key(&self, key: &AccessKey) -> bool {
        self.writes.contains(key)
    }

    /// Check for a conflict with another transaction
    ///
    /// Two footprints conflict when they share a key and at least one of
    /// the two accesses is a write.
    pub fn has_conflict(&self, other: &RWSet) -> bool {
        self.writes.intersects(&other.writes)
            || self.writes.intersects(&other.reads)
            || self.reads.intersects(&other.writes)
    }

    /// Set equality of both halves
    pub fn equal(&self, other: &RWSet) -> bool {
        self == other
    }

    /// Whether every access of `self` is covered by `other`
    pub fn is_covered_by(&self, other: &RWSet) -> bool {
        self.reads.is_subset(&other.reads) && self.writes.is_subset(&other.writes)
    }

    /// Every key touched, read or written
    pub fn keys(&self) -> AccessSet {
        let mut all = self.reads.clone();
        all.extend(&self.writes);
        all
    }

    /// Check if the RW set is empty
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Merge another RW set into this one
    pub fn merge(&mut self, other: &RWSet) {
        self.reads.extend(&other.reads);
        self.writes.extend(&other.writes);
    }

    /// Encode as JSON
    pub fn to_json(&self) -> TypesResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn from_json(json: &str) -> TypesResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
