//! Version metadata

use apex_types::{StateValue, TxId};
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle of a version
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Published but not yet validated, or awaiting recheck
    Pending,
    /// Validated; visible to the final state
    Committed,
    /// Rejected; the producing transaction goes to fallback or recheck
    Aborted,
}

/// Who produced a version
///
/// `Snapshot` orders before every transaction, playing the role of tid -1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Producer {
    /// The pre-batch snapshot (dummy chain anchor)
    Snapshot,
    /// A transaction of the batch
    Tx(TxId),
}

impl Producer {
    /// Producing transaction, if any
    pub fn tx(self) -> Option<TxId> {
        match self {
            Producer::Snapshot => None,
            Producer::Tx(tid) => Some(tid),
        }
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Snapshot => f.write_str("snapshot"),
            Producer::Tx(tid) => write!(f, "{}", tid),
        }
    }
}

/// Arena node of a version chain
#[derive(Debug)]
pub(crate) struct VersionNode {
    pub(crate) producer: Producer,
    /// `None` only for the anchor; readers fall through to the snapshot
    pub(crate) payload: Option<StateValue>,
    pub(crate) status: Status,
    pub(crate) readers: BTreeSet<TxId>,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

impl VersionNode {
    pub(crate) fn anchor() -> Self {
        Self {
            producer: Producer::Snapshot,
            payload: None,
            status: Status::Committed,
            readers: BTreeSet::new(),
            prev: None,
            next: None,
        }
    }

    pub(crate) fn max_reader(&self) -> Option<TxId> {
        self.readers.last().copied()
    }

    pub(crate) fn info(&self, index: u32) -> VersionInfo {
        VersionInfo {
            index,
            producer: self.producer,
            status: self.status,
            payload: self.payload.clone(),
            readers: self.readers.iter().copied().collect(),
        }
    }
}

/// Copy of one version, for inspection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    /// Stable arena index
    pub index: u32,
    /// Producing transaction
    pub producer: Producer,
    /// Status at the time of the copy
    pub status: Status,
    /// Value, `None` for the anchor
    pub payload: Option<StateValue>,
    /// Recorded readers, ascending
    pub readers: Vec<TxId>,
}
