//! Speculative worker
//!
//! One worker owns one balanced group and drives it through three
//! batch-wide phases. The engine joins every worker between phases, so a
//! phase always sees the complete result of the previous one:
//!
//! 1. [`execute`](SpeculativeWorker::execute): run the group in tid order
//!    and publish every write as a pending version
//! 2. [`validate`](SpeculativeWorker::validate) and
//!    [`prepare_recheck`](SpeculativeWorker::prepare_recheck): accept or
//!    abort each transaction, cascade aborts to same-group readers, then
//!    return the aborted versions to pending
//! 3. [`recheck`](SpeculativeWorker::recheck): give each aborted
//!    transaction a second chance once everything before it has resolved
//!
//! A transaction only ever waits for versions of smaller tids, so phase 3
//! cannot deadlock.

use crate::batch::Batch;
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecStatus, Executor};
use apex_mvcc::{GroupView, MvccResult, Producer, SnapshotState, Status, TxFootprint, VersionStore};
use apex_scheduler::WorkerGroup;
use apex_types::TxId;
use std::collections::{BTreeMap, BTreeSet};

/// Speculative result of one transaction
#[derive(Clone, Debug)]
pub struct SpeculativeRecord {
    /// Executor verdict
    pub exec: ExecStatus,
    /// Versions read and written
    pub footprint: TxFootprint,
}

/// Driver of one balanced group
#[derive(Debug)]
pub struct SpeculativeWorker {
    id: usize,
    txs: Vec<TxId>,
    records: BTreeMap<TxId, SpeculativeRecord>,
    aborted: BTreeSet<TxId>,
}

impl SpeculativeWorker {
    /// Worker `id` for `group`
    pub fn new(id: usize, group: WorkerGroup) -> Self {
        let mut txs = group.txs;
        txs.sort_unstable();
        Self {
            id,
            txs,
            records: BTreeMap::new(),
            aborted: BTreeSet::new(),
        }
    }

    /// Worker index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Group members, ascending
    pub fn txs(&self) -> &[TxId] {
        &self.txs
    }

    /// Speculative results, by tid
    pub fn records(&self) -> &BTreeMap<TxId, SpeculativeRecord> {
        &self.records
    }

    /// Transactions currently aborted
    pub fn aborted(&self) -> &BTreeSet<TxId> {
        &self.aborted
    }

    /// Phase 1: execute and locally commit every member
    pub fn execute<E: Executor>(
        &mut self,
        executor: &E,
        batch: &Batch<E::Tx>,
        store: &VersionStore,
        snapshot: &SnapshotState,
    ) -> EngineResult<()> {
        let mut group = GroupView::new(store, snapshot);
        for &tid in &self.txs {
            let tx = batch.get(tid).ok_or(EngineError::UnknownTx(tid))?;
            let mut view = group.begin(tid);
            let exec = executor.execute(&tx.tx, &mut view);
            let footprint = view.commit()?;
            tracing::trace!(
                worker = self.id,
                %tid,
                reads = footprint.reads.len(),
                writes = footprint.writes.len(),
                ?exec,
                "speculatively executed"
            );
            self.records.insert(tid, SpeculativeRecord { exec, footprint });
        }
        Ok(())
    }

    /// Phase 2: validate members in tid order; returns the abort count
    ///
    /// A rejected transaction aborts every recorded reader of its writes.
    /// Those readers are always later members of this group, so they are
    /// aborted before their own turn comes.
    pub fn validate(&mut self) -> EngineResult<usize> {
        for (&tid, record) in &self.records {
            if !self.aborted.contains(&tid) && accepts(tid, &record.footprint)? {
                for version in record.footprint.writes.values() {
                    version.set_status(Status::Committed)?;
                }
                continue;
            }

            self.aborted.insert(tid);
            for version in record.footprint.writes.values() {
                version.set_status(Status::Aborted)?;
                for reader in version.readers()? {
                    debug_assert!(self.records.contains_key(&reader), "{} read across groups", reader);
                    if reader != tid {
                        self.aborted.insert(reader);
                    }
                }
            }
            tracing::trace!(worker = self.id, %tid, "validation failed");
        }

        tracing::debug!(
            worker = self.id,
            transactions = self.records.len(),
            aborted = self.aborted.len(),
            "group validated"
        );
        Ok(self.aborted.len())
    }

    /// End of phase 2: mark the aborted versions as awaiting recheck
    pub fn prepare_recheck(&self) -> EngineResult<()> {
        for tid in &self.aborted {
            let record = self.records.get(tid).ok_or(EngineError::UnknownTx(*tid))?;
            for version in record.footprint.writes.values() {
                version.set_status(Status::Pending)?;
            }
        }
        Ok(())
    }

    /// Phase 3: recheck aborted members in tid order; returns how many
    /// were recovered
    ///
    /// On error every unresolved version of this worker is aborted before
    /// returning, so other workers waiting on them are released.
    pub fn recheck(&mut self) -> EngineResult<usize> {
        let result = self.recheck_inner();
        if result.is_err() {
            self.abandon();
        }
        result
    }

    fn recheck_inner(&mut self) -> EngineResult<usize> {
        let candidates: Vec<TxId> = self.aborted.iter().copied().collect();
        let mut recovered = 0;

        for tid in candidates {
            let record = self.records.get(&tid).ok_or(EngineError::UnknownTx(tid))?;
            let consistent = reads_still_valid(tid, &record.footprint)?;
            let status = if consistent {
                Status::Committed
            } else {
                Status::Aborted
            };
            for version in record.footprint.writes.values() {
                version.set_status(status)?;
            }
            if consistent {
                self.aborted.remove(&tid);
                recovered += 1;
            }
            tracing::trace!(worker = self.id, %tid, consistent, "rechecked");
        }

        tracing::debug!(
            worker = self.id,
            recovered,
            aborted = self.aborted.len(),
            "group rechecked"
        );
        Ok(recovered)
    }

    fn abandon(&self) {
        for tid in &self.aborted {
            let Some(record) = self.records.get(tid) else {
                continue;
            };
            for version in record.footprint.writes.values() {
                if !matches!(version.status(), Ok(Status::Pending)) {
                    continue;
                }
                if let Err(e) = version.set_status(Status::Aborted) {
                    tracing::warn!(
                        worker = self.id,
                        %tid,
                        key = %version.key(),
                        error = %e,
                        "failed to abort pending version"
                    );
                }
            }
        }
    }
}

/// Optimistic validation rule
///
/// Accept when no other transaction older than `tid` published a version
/// after one this transaction read, or when every such intervening writer
/// can still be ordered after this transaction.
fn accepts(tid: TxId, footprint: &TxFootprint) -> MvccResult<bool> {
    let mut max_read = Producer::Snapshot;
    let mut min_next: Option<TxId> = None;
    for version in footprint.reads.values() {
        max_read = max_read.max(version.producer()?);
        if let Some(next) = version.next_foreign(tid)? {
            min_next = Some(min_next.map_or(next, |m| m.min(next)));
        }
    }

    let Some(min_next) = min_next else {
        return Ok(true);
    };
    if tid < min_next {
        return Ok(true);
    }

    let mut max_write_prereq = Producer::Snapshot;
    for version in footprint.writes.values() {
        max_write_prereq = max_write_prereq.max(version.write_prerequisite(tid)?);
    }

    let bound = Producer::Tx(min_next);
    Ok(max_write_prereq < bound && max_read < bound)
}

/// Recheck rule: blocks until every relevant version has resolved
///
/// Stale if an older transaction committed a version after one we read,
/// or if a version we read was itself aborted.
fn reads_still_valid(tid: TxId, footprint: &TxFootprint) -> MvccResult<bool> {
    for version in footprint.reads.values() {
        for successor in version.successors_before(tid)? {
            if successor.wait_resolved()? == Status::Committed {
                return Ok(false);
            }
        }
        if version.wait_resolved()? == Status::Aborted {
            return Ok(false);
        }
    }
    Ok(true)
}
