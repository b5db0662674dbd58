//! Optimistic concurrency control baseline
//!
//! Every pending transaction runs in parallel against the state committed
//! so far, buffering its writes. Validation then walks the round in tid
//! order: a transaction whose reads were overwritten by an earlier commit
//! of the same round is sent to the next round, everything else commits.
//! The lowest pending tid always commits, so the loop ends after at most
//! one round per transaction.
//!
//! The result is serializable in commit order, which is not tid order.

use crate::batch::Batch;
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecStatus, Executor};
use apex_mvcc::{MergedState, SnapshotState, StateView};
use apex_types::{AccessKey, RWSet, StateValue, TxId};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Result of an OCC run
#[derive(Clone, Debug, Default)]
pub struct OccOutcome {
    /// Executor verdict of the committed run of each transaction
    pub results: BTreeMap<TxId, ExecStatus>,
    /// Transactions in the order they committed
    pub commit_order: Vec<TxId>,
    /// Execution rounds
    pub rounds: usize,
    /// Validation failures summed over all rounds
    pub retries: usize,
    /// Values written, sorted by key
    pub writes: BTreeMap<AccessKey, StateValue>,
}

/// Round-based OCC executor
#[derive(Clone, Copy, Debug, Default)]
pub struct OccExecutor;

/// One speculative run waiting for validation
struct Attempt {
    tid: TxId,
    exec: ExecStatus,
    footprint: RWSet,
    writes: HashMap<AccessKey, StateValue>,
}

impl OccExecutor {
    /// Run every transaction of `batch` over `snapshot`
    pub fn run<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        snapshot: &SnapshotState,
    ) -> EngineResult<OccOutcome> {
        let state = MergedState::new(snapshot);
        // Commit sequence number of the last write to each key
        let mut written_at: HashMap<AccessKey, u64> = HashMap::new();
        let mut sequence = 0u64;
        let mut pending = batch.tx_ids();
        let mut outcome = OccOutcome::default();

        while !pending.is_empty() {
            let round_start = sequence;
            let attempts = pending
                .par_iter()
                .map(|tid| attempt(executor, batch, &state, *tid))
                .collect::<EngineResult<Vec<_>>>()?;

            let mut retry = Vec::new();
            for attempt in attempts {
                let stale = attempt
                    .footprint
                    .reads
                    .keys()
                    .any(|key| written_at.get(&key).is_some_and(|at| *at > round_start));
                if stale {
                    tracing::trace!(tid = %attempt.tid, round = outcome.rounds, "occ validation failed");
                    retry.push(attempt.tid);
                    continue;
                }

                sequence += 1;
                for (key, value) in attempt.writes {
                    written_at.insert(key, sequence);
                    state.put(key, value);
                }
                outcome.results.insert(attempt.tid, attempt.exec);
                outcome.commit_order.push(attempt.tid);
            }

            outcome.rounds += 1;
            outcome.retries += retry.len();
            tracing::debug!(
                round = outcome.rounds,
                attempted = pending.len(),
                retried = retry.len(),
                "occ round finished"
            );
            if retry.len() == pending.len() {
                // Unreachable unless the executor is nondeterministic
                return Err(EngineError::NoProgress(retry.len()));
            }
            pending = retry;
        }

        outcome.writes = state.writes();
        Ok(outcome)
    }
}

fn attempt<E: Executor>(
    executor: &E,
    batch: &Batch<E::Tx>,
    state: &MergedState<'_>,
    tid: TxId,
) -> EngineResult<Attempt> {
    let tx = batch.get(tid).ok_or(EngineError::UnknownTx(tid))?;
    let mut view = AttemptView {
        state,
        footprint: RWSet::new(),
        writes: HashMap::new(),
    };
    let exec = executor.execute(&tx.tx, &mut view);
    Ok(Attempt {
        tid,
        exec,
        footprint: view.footprint,
        writes: view.writes,
    })
}

/// Reads committed state, buffers writes privately
struct AttemptView<'m, 's> {
    state: &'m MergedState<'s>,
    footprint: RWSet,
    writes: HashMap<AccessKey, StateValue>,
}

impl StateView for AttemptView<'_, '_> {
    fn read(&mut self, key: &AccessKey) -> StateValue {
        if let Some(value) = self.writes.get(key) {
            return value.clone();
        }
        self.footprint.record_read(*key);
        self.state.get(key)
    }

    fn write(&mut self, key: AccessKey, value: StateValue) {
        self.footprint.record_write(key);
        self.writes.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchBuilder;
    use apex_mvcc::InMemorySource;
    use apex_primitives::{Address, H256, U256};
    use std::sync::Arc;

    enum Op {
        Store(u64, u64),
        Copy(u64, u64),
        Increment(u64),
    }

    struct SlotExecutor;

    fn contract() -> Address {
        Address::from_low_u64(0xc0)
    }

    fn slot(i: u64) -> H256 {
        H256::from_low_u64(i)
    }

    impl Executor for SlotExecutor {
        type Tx = Op;

        fn execute(&self, tx: &Op, state: &mut dyn StateView) -> ExecStatus {
            match *tx {
                Op::Store(s, v) => state.set_storage(contract(), slot(s), U256::from(v)),
                Op::Copy(from, to) => {
                    let v = state.storage(&contract(), slot(from));
                    state.set_storage(contract(), slot(to), v);
                }
                Op::Increment(s) => {
                    let v = state.storage(&contract(), slot(s));
                    state.set_storage(contract(), slot(s), v + 1);
                }
            }
            ExecStatus::Success
        }
    }

    fn run(ops: Vec<Op>) -> OccOutcome {
        let mut builder = BatchBuilder::new();
        for op in ops {
            builder.push(Ok::<_, String>(op), 1, RWSet::new(), None);
        }
        let snapshot = SnapshotState::new(Arc::new(InMemorySource::new()));
        OccExecutor.run(&SlotExecutor, &builder.build(), &snapshot).unwrap()
    }

    fn storage(i: u64, v: u64) -> (AccessKey, StateValue) {
        (
            AccessKey::storage(contract(), slot(i)),
            StateValue::Storage(U256::from(v)),
        )
    }

    #[test]
    fn test_independent_batch_commits_in_one_round() {
        let outcome = run(vec![Op::Store(0, 1), Op::Store(1, 2), Op::Increment(2)]);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.retries, 0);
        assert_eq!(outcome.commit_order, vec![TxId(0), TxId(1), TxId(2)]);
        assert_eq!(outcome.writes.len(), 3);
    }

    #[test]
    fn test_stale_reader_retries_after_younger_commit() {
        // T1 read slot 0 before T0 wrote it and retries in round two. T2
        // never saw T1's write, so it commits first: the outcome is the
        // serial order T0, T2, T1.
        let outcome = run(vec![Op::Store(0, 7), Op::Copy(0, 1), Op::Copy(1, 2)]);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.retries, 1);
        assert_eq!(outcome.commit_order, vec![TxId(0), TxId(2), TxId(1)]);

        let expected: BTreeMap<AccessKey, StateValue> =
            [storage(0, 7), storage(1, 7), storage(2, 0)].into_iter().collect();
        assert_eq!(outcome.writes, expected);
    }

    #[test]
    fn test_hot_counter_serializes() {
        let outcome = run((0..5).map(|_| Op::Increment(0)).collect());
        // Only the lowest pending tid survives each round
        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.retries, 4 + 3 + 2 + 1);
        assert_eq!(outcome.writes[&storage(0, 0).0], storage(0, 5).1);
        assert_eq!(outcome.results.len(), 5);
    }

    #[test]
    fn test_empty_batch() {
        let outcome = run(Vec::new());
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.writes.is_empty());
    }
}
