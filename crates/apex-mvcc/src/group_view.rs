//! Per-worker MVCC views
//!
//! A [`GroupView`] tracks, for every key, the newest version the worker
//! can see: its own last write or else the chain anchor. Versions written
//! by other workers are never visible during speculation.
//!
//! Transactions run one at a time through an [`MvccView`]: reads check the
//! local write buffer, then the group view; writes stay local until
//! [`MvccView::commit`] publishes them.

use crate::chain::VersionRef;
use crate::error::{MvccError, MvccResult};
use crate::footprint::{LocalWriteBuffer, ReadView, TxFootprint, WriteView};
use crate::snapshot::SnapshotState;
use crate::store::VersionStore;
use crate::view::StateView;
use apex_types::{AccessKey, StateValue, TxId};
use std::collections::HashMap;

/// One worker's window onto the version store
#[derive(Debug)]
pub struct GroupView<'s> {
    store: &'s VersionStore,
    snapshot: &'s SnapshotState,
    current: HashMap<AccessKey, VersionRef>,
}

impl<'s> GroupView<'s> {
    /// Fresh view: every key resolves to its anchor
    pub fn new(store: &'s VersionStore, snapshot: &'s SnapshotState) -> Self {
        Self {
            store,
            snapshot,
            current: HashMap::new(),
        }
    }

    /// Start executing `tid`
    pub fn begin(&mut self, tid: TxId) -> MvccView<'_, 's> {
        MvccView {
            group: self,
            tid,
            reads: ReadView::new(),
            writes: LocalWriteBuffer::new(),
            fault: None,
        }
    }

    /// Version of `key` the worker sees
    pub fn current(&mut self, key: &AccessKey) -> VersionRef {
        if let Some(version) = self.current.get(key) {
            return version.clone();
        }
        let head = self.store.head(key);
        self.current.insert(*key, head.clone());
        head
    }

    /// Number of keys the worker has seen
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether the worker has seen nothing yet
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

/// Speculative execution context of one transaction
pub struct MvccView<'g, 's> {
    group: &'g mut GroupView<'s>,
    tid: TxId,
    reads: ReadView,
    writes: LocalWriteBuffer,
    fault: Option<MvccError>,
}

impl MvccView<'_, '_> {
    /// Transaction being executed
    pub fn tid(&self) -> TxId {
        self.tid
    }

    /// Publish every buffered write as a pending version
    ///
    /// Each new version also becomes the worker's current version of its
    /// key, so later transactions of the group read it. A version lookup
    /// that failed during execution is returned here and nothing is
    /// published.
    pub fn commit(self) -> MvccResult<TxFootprint> {
        let MvccView {
            group,
            tid,
            reads,
            writes,
            fault,
        } = self;
        if let Some(e) = fault {
            return Err(e);
        }

        let mut published = WriteView::with_capacity(writes.len());
        for (key, value) in writes {
            let version = group.store.install(&key, tid, value)?;
            group.current.insert(key, version.clone());
            published.insert(key, version);
        }

        Ok(TxFootprint {
            tid,
            reads,
            writes: published,
        })
    }

    /// Drop the transaction without publishing anything
    ///
    /// Reader registrations already made stay in place; they only make
    /// validation more conservative.
    pub fn discard(self) -> ReadView {
        self.reads
    }
}

impl StateView for MvccView<'_, '_> {
    fn read(&mut self, key: &AccessKey) -> StateValue {
        if let Some(value) = self.writes.get(key) {
            return value.clone();
        }
        let version = self.group.current(key);
        match version.observe(self.tid) {
            Ok(payload) => {
                self.reads.insert(*key, version);
                payload.unwrap_or_else(|| self.group.snapshot.get(key))
            }
            Err(e) => {
                tracing::error!(tid = %self.tid, %key, error = %e, "version lookup failed");
                // The transaction keeps running on the snapshot value but
                // can no longer commit.
                self.fault.get_or_insert(e);
                self.group.snapshot.get(key)
            }
        }
    }

    fn write(&mut self, key: AccessKey, value: StateValue) {
        debug_assert!(value.matches(&key.field), "{} written with {:?}", key, value);
        self.writes.insert(key, value);
    }
}
