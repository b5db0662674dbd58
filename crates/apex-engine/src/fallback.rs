//! Conflict-aware re-execution
//!
//! Schedules a set of transactions with the grouping strategies and runs
//! the chosen plan over a [`MergedState`]. In speculative mode the set is
//! whatever stayed aborted after recheck and the merged state sits on top
//! of the committed versions; in partitioned mode the set is the whole
//! batch over the bare snapshot.

use crate::batch::Batch;
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecStatus, Executor};
use apex_mvcc::{MergedState, SnapshotState, VersionStore};
use apex_primitives::Gas;
use apex_scheduler::{Layout, SchedulePlan, Scheduler, StrategyKind, TxProfile};
use apex_types::{AccessKey, RWSet, StateValue, TxId};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Result of one fallback pass
#[derive(Clone, Debug, Default)]
pub struct FallbackOutcome {
    /// Strategy of the executed plan, `None` when nothing ran
    pub strategy: Option<StrategyKind>,
    /// Estimated critical-path cost of the plan
    pub cost: Gas,
    /// Executor verdict per transaction
    pub results: BTreeMap<TxId, ExecStatus>,
    /// Footprint observed per transaction
    pub footprints: BTreeMap<TxId, RWSet>,
    /// Transactions whose footprint escaped their schedule
    pub mispredicted: Vec<TxId>,
    /// Whether the pass was discarded and re-run serially
    pub serial_redo: bool,
    /// Values written, sorted by key
    pub writes: BTreeMap<AccessKey, StateValue>,
}

/// A scheduled transaction subset, ready to run
#[derive(Clone, Debug)]
pub struct PlannedPass {
    tids: Vec<TxId>,
    declared: HashMap<TxId, RWSet>,
    plan: SchedulePlan,
}

impl PlannedPass {
    /// The chosen plan
    pub fn plan(&self) -> &SchedulePlan {
        &self.plan
    }

    /// Whether there is nothing to run
    pub fn is_empty(&self) -> bool {
        self.tids.is_empty()
    }
}

/// Executes a transaction subset according to a conflict-aware plan
pub struct FallbackExecutor<'a> {
    scheduler: &'a Scheduler,
    verify_footprints: bool,
}

type Executed = (TxId, ExecStatus, RWSet);

impl<'a> FallbackExecutor<'a> {
    /// Executor planning with `scheduler`
    pub fn new(scheduler: &'a Scheduler, verify_footprints: bool) -> Self {
        Self {
            scheduler,
            verify_footprints,
        }
    }

    /// Schedule and run `tids`
    ///
    /// Each transaction is scheduled with its declared footprint merged
    /// with `observed[tid]`. Reads go through `versions` (latest committed)
    /// when given, then `snapshot`.
    pub fn run<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        tids: &[TxId],
        observed: &HashMap<TxId, RWSet>,
        versions: Option<&VersionStore>,
        snapshot: &SnapshotState,
    ) -> EngineResult<FallbackOutcome> {
        let pass = self.plan(batch, tids, observed)?;
        self.execute_planned(executor, batch, &pass, versions, snapshot)
    }

    /// Schedule `tids` without touching state
    pub fn plan<T>(
        &self,
        batch: &Batch<T>,
        tids: &[TxId],
        observed: &HashMap<TxId, RWSet>,
    ) -> EngineResult<PlannedPass> {
        if tids.is_empty() {
            return Ok(PlannedPass {
                tids: Vec::new(),
                declared: HashMap::new(),
                plan: SchedulePlan::serial(std::iter::empty(), 0),
            });
        }

        let mut profiles = Vec::with_capacity(tids.len());
        for &tid in tids {
            let tx = batch.get(tid).ok_or(EngineError::UnknownTx(tid))?;
            let mut rw_set = tx.declared();
            if let Some(seen) = observed.get(&tid) {
                rw_set.merge(seen);
            }
            profiles.push(TxProfile::new(tid, tx.cost, rw_set));
        }
        let plan = self.scheduler.schedule(&profiles)?;
        let mut ordered = tids.to_vec();
        ordered.sort_unstable();

        Ok(PlannedPass {
            tids: ordered,
            declared: profiles.into_iter().map(|p| (p.tid, p.rw_set)).collect(),
            plan,
        })
    }

    /// Run a pass produced by [`FallbackExecutor::plan`] for `batch`
    pub fn execute_planned<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        pass: &PlannedPass,
        versions: Option<&VersionStore>,
        snapshot: &SnapshotState,
    ) -> EngineResult<FallbackOutcome> {
        if pass.is_empty() {
            return Ok(FallbackOutcome::default());
        }
        let plan = &pass.plan;
        let mut state = merged(versions, snapshot);
        let executed = execute_plan(executor, batch, plan, &state)?;

        let mut mispredicted: Vec<TxId> = executed
            .iter()
            .filter(|(tid, _, footprint)| {
                pass.declared
                    .get(tid)
                    .map(|d| !footprint.is_covered_by(d))
                    .unwrap_or(true)
            })
            .map(|(tid, _, _)| *tid)
            .collect();
        mispredicted.sort_unstable();

        let mut serial_redo = false;
        let executed = if self.verify_footprints && !mispredicted.is_empty() {
            tracing::warn!(
                mispredicted = mispredicted.len(),
                first = %mispredicted[0],
                "footprint escaped its schedule, re-running serially"
            );
            serial_redo = true;
            state = merged(versions, snapshot);
            pass.tids
                .iter()
                .map(|tid| run_one(executor, batch, &state, *tid))
                .collect::<EngineResult<Vec<_>>>()?
        } else {
            executed
        };

        let mut outcome = FallbackOutcome {
            strategy: Some(plan.strategy),
            cost: plan.cost,
            mispredicted,
            serial_redo,
            writes: state.writes(),
            ..Default::default()
        };
        for (tid, exec, footprint) in executed {
            outcome.results.insert(tid, exec);
            outcome.footprints.insert(tid, footprint);
        }

        tracing::debug!(
            transactions = pass.tids.len(),
            strategy = %plan.strategy,
            cost = plan.cost,
            serial_redo,
            "fallback finished"
        );
        Ok(outcome)
    }
}

fn merged<'s>(versions: Option<&'s VersionStore>, snapshot: &'s SnapshotState) -> MergedState<'s> {
    match versions {
        Some(store) => MergedState::over_versions(store, snapshot),
        None => MergedState::new(snapshot),
    }
}

/// Lanes run in parallel, each in order; rounds run in order, each in
/// parallel
fn execute_plan<E: Executor>(
    executor: &E,
    batch: &Batch<E::Tx>,
    plan: &SchedulePlan,
    state: &MergedState<'_>,
) -> EngineResult<Vec<Executed>> {
    match &plan.layout {
        Layout::Lanes(lanes) => {
            let per_lane = lanes
                .par_iter()
                .map(|lane| {
                    lane.iter()
                        .map(|tid| run_one(executor, batch, state, *tid))
                        .collect::<EngineResult<Vec<_>>>()
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(per_lane.into_iter().flatten().collect())
        }
        Layout::Rounds(rounds) => {
            let mut executed = Vec::with_capacity(plan.tx_count());
            for round in rounds {
                let done = round
                    .par_iter()
                    .map(|tid| run_one(executor, batch, state, *tid))
                    .collect::<EngineResult<Vec<_>>>()?;
                executed.extend(done);
            }
            Ok(executed)
        }
    }
}

fn run_one<E: Executor>(
    executor: &E,
    batch: &Batch<E::Tx>,
    state: &MergedState<'_>,
    tid: TxId,
) -> EngineResult<Executed> {
    let tx = batch.get(tid).ok_or(EngineError::UnknownTx(tid))?;
    let mut view = state.view();
    let exec = executor.execute(&tx.tx, &mut view);
    tracing::trace!(%tid, ?exec, "re-executed");
    Ok((tid, exec, view.into_footprint()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchBuilder;
    use apex_mvcc::{InMemorySource, StateView, TrackingView, BufferedState};
    use apex_primitives::{Address, U256};
    use std::sync::Arc;

    /// Moves one unit from `from` to `to`; `sneaky` also bumps account 99
    struct Move {
        from: u64,
        to: u64,
        sneaky: bool,
    }

    struct MoveExecutor;

    fn addr(id: u64) -> Address {
        Address::from_low_u64(id)
    }

    impl Executor for MoveExecutor {
        type Tx = Move;

        fn execute(&self, tx: &Move, state: &mut dyn StateView) -> ExecStatus {
            if !state.sub_balance(addr(tx.from), U256::one()) {
                return ExecStatus::Reverted;
            }
            state.add_balance(addr(tx.to), U256::one());
            if tx.sneaky {
                state.add_balance(addr(99), U256::one());
            }
            ExecStatus::Success
        }
    }

    fn snapshot() -> SnapshotState {
        let source = (0..8).fold(InMemorySource::new(), |s, i| {
            s.with_account(addr(i), U256::from(10))
        });
        SnapshotState::new(Arc::new(source))
    }

    /// Batch whose declared footprints come from an honest dry run
    fn batch(moves: Vec<Move>, snapshot: &SnapshotState) -> Batch<Move> {
        let mut builder = BatchBuilder::new();
        for m in moves {
            let honest = Move { sneaky: false, ..m };
            let mut buffer = BufferedState::new(snapshot);
            let mut view = TrackingView::new(&mut buffer);
            MoveExecutor.execute(&honest, &mut view);
            let predicted = view.into_rw_set();
            builder.push(Ok::<_, String>(m), 10, predicted, None);
        }
        builder.build()
    }

    fn balance(v: u64) -> StateValue {
        StateValue::Balance(U256::from(v))
    }

    fn mv(from: u64, to: u64) -> Move {
        Move {
            from,
            to,
            sneaky: false,
        }
    }

    #[test]
    fn test_empty_subset() {
        let snap = snapshot();
        let b = batch(vec![mv(0, 1)], &snap);
        let scheduler = Scheduler::new();
        let outcome = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &[], &HashMap::new(), None, &snap)
            .unwrap();
        assert!(outcome.strategy.is_none());
        assert!(outcome.writes.is_empty());
    }

    #[test]
    fn test_plan_matches_sequential() {
        let snap = snapshot();
        let b = batch(vec![mv(0, 1), mv(1, 2), mv(3, 4), mv(2, 0)], &snap);
        let scheduler = Scheduler::new();
        let tids = b.tx_ids();

        let outcome = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &tids, &HashMap::new(), None, &snap)
            .unwrap();

        assert!(!outcome.serial_redo);
        assert!(outcome.mispredicted.is_empty());
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.writes[&AccessKey::balance(addr(0))], balance(10));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(1))], balance(10));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(3))], balance(9));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(4))], balance(11));
    }

    #[test]
    fn test_misprediction_triggers_serial_redo() {
        let snap = snapshot();
        let b = batch(
            vec![
                Move { from: 0, to: 1, sneaky: true },
                Move { from: 2, to: 3, sneaky: true },
            ],
            &snap,
        );
        let scheduler = Scheduler::new();
        let tids = b.tx_ids();

        let outcome = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &tids, &HashMap::new(), None, &snap)
            .unwrap();

        assert!(outcome.serial_redo);
        assert_eq!(outcome.mispredicted, vec![TxId(0), TxId(1)]);
        // Serial redo: both increments of account 99 land
        assert_eq!(outcome.writes[&AccessKey::balance(addr(99))], balance(2));
    }

    #[test]
    fn test_observed_footprint_prevents_misprediction() {
        let snap = snapshot();
        let b = batch(vec![Move { from: 0, to: 1, sneaky: true }], &snap);
        let scheduler = Scheduler::new();

        let mut seen = RWSet::new();
        seen.record_read(AccessKey::balance(addr(99)));
        seen.record_write(AccessKey::balance(addr(99)));
        let observed: HashMap<TxId, RWSet> = [(TxId(0), seen)].into_iter().collect();

        let outcome = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &[TxId(0)], &observed, None, &snap)
            .unwrap();
        assert!(!outcome.serial_redo);
        assert!(outcome.mispredicted.is_empty());
    }

    #[test]
    fn test_reads_committed_versions() {
        let snap = snapshot();
        let b = batch(vec![mv(0, 1)], &snap);
        let store = VersionStore::new();
        store
            .install(&AccessKey::balance(addr(0)), TxId(5), balance(3))
            .unwrap()
            .set_status(apex_mvcc::Status::Committed)
            .unwrap();

        let scheduler = Scheduler::new();
        let outcome = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &[TxId(0)], &HashMap::new(), Some(&store), &snap)
            .unwrap();
        assert_eq!(outcome.writes[&AccessKey::balance(addr(0))], balance(2));
    }

    #[test]
    fn test_plan_then_execute() {
        let snap = snapshot();
        let b = batch(vec![mv(0, 1), mv(1, 2)], &snap);
        let scheduler = Scheduler::new();
        let fallback = FallbackExecutor::new(&scheduler, true);

        let pass = fallback.plan(&b, &[TxId(1), TxId(0)], &HashMap::new()).unwrap();
        assert!(!pass.is_empty());
        assert_eq!(pass.plan().tx_count(), 2);

        let outcome = fallback
            .execute_planned(&MoveExecutor, &b, &pass, None, &snap)
            .unwrap();
        assert_eq!(outcome.strategy, Some(pass.plan().strategy));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(0))], balance(9));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(1))], balance(10));
        assert_eq!(outcome.writes[&AccessKey::balance(addr(2))], balance(11));

        let empty = fallback.plan(&b, &[], &HashMap::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_unknown_tid() {
        let snap = snapshot();
        let b = batch(vec![mv(0, 1)], &snap);
        let scheduler = Scheduler::new();
        let err = FallbackExecutor::new(&scheduler, true)
            .run(&MoveExecutor, &b, &[TxId(3)], &HashMap::new(), None, &snap)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTx(TxId(3))));
    }
}
