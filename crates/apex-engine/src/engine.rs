//! Batch pipeline
//!
//! Everything mutable during a batch (snapshot cache, version store,
//! overlay) is created inside [`Engine::execute`] and dropped when it
//! returns. The engine itself only carries configuration and metrics.
//!
//! A batch is first planned from its costs and declared footprints, then
//! executed. The split lets [`Engine::execute_stream`] plan the next batch
//! while the current one runs.

use crate::batch::Batch;
use crate::config::{EngineConfig, ExecutionMode};
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecStatus, Executor};
use crate::fallback::{FallbackExecutor, PlannedPass};
use crate::metrics::{self, EngineMetrics};
use crate::occ::OccExecutor;
use crate::worker::{SpeculativeRecord, SpeculativeWorker};
use apex_mvcc::{
    BufferedState, OverlaySource, SnapshotState, StateSource, TrackingView, VersionStore,
};
use apex_primitives::Gas;
use apex_scheduler::{GreedyBalancer, Scheduler, StrategyKind, WorkerGroup};
use apex_types::{AccessKey, RWSet, StateValue, TxId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// How a transaction made it into the final state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted by speculative validation or recheck, run by the
    /// partitioned plan, or committed by OCC
    Committed,
    /// Re-executed by the fallback pass
    CommittedInFallback,
}

/// Per-transaction result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReport {
    /// Transaction
    pub tid: TxId,
    /// Path that produced the final result
    pub status: TxStatus,
    /// Executor verdict of that run
    pub exec: ExecStatus,
}

/// Wall-clock time per phase, microseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// Balancing or planning
    pub schedule_us: u64,
    /// Speculative execution, or plan execution
    pub execute_us: u64,
    /// Validation and cascade
    pub validate_us: u64,
    /// Recheck
    pub recheck_us: u64,
    /// Fallback pass
    pub fallback_us: u64,
}

/// Aggregate statistics of one batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Mode the batch ran in
    pub mode: ExecutionMode,
    /// Batch size
    pub transactions: usize,
    /// Non-empty speculative groups
    pub workers: usize,
    /// Aborted after validation and cascade; under OCC, validation
    /// failures over all rounds
    pub aborted_after_validation: usize,
    /// Still aborted after recheck; under OCC every failure re-executes,
    /// so this equals the validation count
    pub aborted_after_recheck: usize,
    /// Transactions re-executed by the fallback pass
    pub fallback_transactions: usize,
    /// Strategy of the conflict-aware plan, if one ran
    pub strategy: Option<StrategyKind>,
    /// Estimated critical-path cost of that plan
    pub plan_cost: Gas,
    /// Footprints that escaped their schedule
    pub mispredictions: usize,
    /// Whether the plan was discarded for a serial run
    pub serial_redo: bool,
    /// OCC execution rounds, zero in the other modes
    pub rounds: usize,
    /// Phase timings
    pub timings: PhaseTimings,
}

impl BatchStats {
    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of [`Engine::execute`]
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    reports: Vec<TxReport>,
    writes: BTreeMap<AccessKey, StateValue>,
    stats: BatchStats,
}

impl BatchOutcome {
    /// One report per transaction, in tid order
    pub fn reports(&self) -> &[TxReport] {
        &self.reports
    }

    /// Report of `tid`
    pub fn report(&self, tid: TxId) -> Option<&TxReport> {
        self.reports.get(tid.as_usize())
    }

    /// Final value of every key the batch wrote
    pub fn final_writes(&self) -> &BTreeMap<AccessKey, StateValue> {
        &self.writes
    }

    /// Consume into the final writes
    pub fn into_writes(self) -> BTreeMap<AccessKey, StateValue> {
        self.writes
    }

    /// Statistics
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Transactions that needed the fallback pass
    pub fn committed_in_fallback(&self) -> Vec<TxId> {
        self.reports
            .iter()
            .filter(|r| r.status == TxStatus::CommittedInFallback)
            .map(|r| r.tid)
            .collect()
    }
}

/// Result of [`Engine::replay_sequential`]
#[derive(Clone, Debug)]
pub struct SequentialOutcome {
    /// Executor verdict per transaction, in tid order
    pub results: Vec<(TxId, ExecStatus)>,
    /// Observed footprint per transaction, in tid order
    pub footprints: Vec<RWSet>,
    /// Final value of every key written
    pub writes: BTreeMap<AccessKey, StateValue>,
}

/// Work decided before a batch touches state
///
/// Depends only on the batch's costs and declared footprints.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    kind: PlanKind,
    transactions: usize,
    schedule_us: u64,
}

#[derive(Clone, Debug)]
enum PlanKind {
    /// Speculative worker groups
    Groups(Vec<WorkerGroup>),
    /// Conflict-aware schedule of the whole batch
    Schedule(PlannedPass),
    /// OCC decides everything at run time
    Rounds,
}

impl BatchPlan {
    /// Mode the plan executes in
    pub fn mode(&self) -> ExecutionMode {
        match self.kind {
            PlanKind::Groups(_) => ExecutionMode::Speculative,
            PlanKind::Schedule(_) => ExecutionMode::Partitioned,
            PlanKind::Rounds => ExecutionMode::Occ,
        }
    }

    /// Size of the planned batch
    pub fn len(&self) -> usize {
        self.transactions
    }

    /// Whether the planned batch was empty
    pub fn is_empty(&self) -> bool {
        self.transactions == 0
    }
}

/// Parallel batch executor
pub struct Engine {
    config: EngineConfig,
    scheduler: Scheduler,
    balancer: GreedyBalancer,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// Engine for a validated `config`
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let scheduler =
            Scheduler::with_strategies(&config.strategies).with_preserve_order(config.preserve_order);
        let balancer = GreedyBalancer::new(config.workers)?;
        Ok(Self {
            config,
            scheduler,
            balancer,
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics accumulated over every batch
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Shared handle to the metrics
    pub fn shared_metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Predict footprints by dry-running each transaction on `snapshot`
    ///
    /// Transactions run independently, each against the unmodified
    /// snapshot, so the result is only a guess for conflicting ones.
    pub fn predict<E: Executor>(executor: &E, snapshot: &SnapshotState, txs: &[E::Tx]) -> Vec<RWSet> {
        txs.par_iter()
            .map(|tx| {
                let mut buffer = BufferedState::new(snapshot);
                let mut view = TrackingView::new(&mut buffer);
                executor.execute(tx, &mut view);
                view.into_rw_set()
            })
            .collect()
    }

    /// Execute the batch one transaction at a time, in tid order
    pub fn replay_sequential<E: Executor>(
        executor: &E,
        source: Arc<dyn StateSource>,
        batch: &Batch<E::Tx>,
    ) -> SequentialOutcome {
        let snapshot = SnapshotState::new(source);
        let mut state = BufferedState::new(&snapshot);
        let mut results = Vec::with_capacity(batch.len());
        let mut footprints = Vec::with_capacity(batch.len());

        for tx in batch.iter() {
            let mut view = TrackingView::new(&mut state);
            let exec = executor.execute(&tx.tx, &mut view);
            footprints.push(view.into_rw_set());
            results.push((tx.tid, exec));
        }

        SequentialOutcome {
            results,
            footprints,
            writes: state.into_writes(),
        }
    }

    /// Execute `batch` over the state served by `source`
    pub fn execute<E: Executor>(
        &self,
        executor: &E,
        source: Arc<dyn StateSource>,
        batch: &Batch<E::Tx>,
    ) -> EngineResult<BatchOutcome> {
        let plan = self.plan(batch)?;
        self.execute_planned(executor, source, batch, plan)
    }

    /// Plan `batch` for the configured mode without reading any state
    pub fn plan<T>(&self, batch: &Batch<T>) -> EngineResult<BatchPlan> {
        let clock = Instant::now();
        let kind = match self.config.mode {
            ExecutionMode::Speculative => PlanKind::Groups(
                self.balancer
                    .partition(&batch.tx_costs())
                    .into_iter()
                    .filter(|group| !group.is_empty())
                    .collect(),
            ),
            ExecutionMode::Partitioned => {
                PlanKind::Schedule(self.fallback().plan(batch, &batch.tx_ids(), &HashMap::new())?)
            }
            ExecutionMode::Occ => PlanKind::Rounds,
        };
        Ok(BatchPlan {
            kind,
            transactions: batch.len(),
            schedule_us: micros(clock),
        })
    }

    /// Execute `batch` according to a plan made for it by [`Engine::plan`]
    pub fn execute_planned<E: Executor>(
        &self,
        executor: &E,
        source: Arc<dyn StateSource>,
        batch: &Batch<E::Tx>,
        plan: BatchPlan,
    ) -> EngineResult<BatchOutcome> {
        if plan.transactions != batch.len() {
            return Err(EngineError::PlanMismatch {
                planned: plan.transactions,
                actual: batch.len(),
            });
        }

        let started = Instant::now();
        let snapshot = SnapshotState::new(source);
        if self.config.prefetch {
            snapshot.prefetch(&batch.prefetch_keys());
        }

        let mut outcome = match plan.kind {
            PlanKind::Groups(groups) => {
                self.execute_speculative(executor, batch, groups, &snapshot)?
            }
            PlanKind::Schedule(pass) => self.execute_partitioned(executor, batch, &pass, &snapshot)?,
            PlanKind::Rounds => self.execute_occ(executor, batch, &snapshot)?,
        };
        outcome.stats.timings.schedule_us = plan.schedule_us;

        self.metrics.record_batch(&outcome.stats);
        tracing::info!(
            mode = ?outcome.stats.mode,
            transactions = batch.len(),
            aborted = outcome.stats.aborted_after_validation,
            fallback = outcome.stats.fallback_transactions,
            writes = outcome.writes.len(),
            elapsed_us = micros(started),
            "batch executed"
        );
        Ok(outcome)
    }

    /// Execute consecutive batches, each over the state the earlier ones
    /// left behind
    ///
    /// Batch `i + 1` is planned while batch `i` executes. Its source is
    /// `source` overlaid with every write committed so far.
    pub fn execute_stream<E: Executor>(
        &self,
        executor: &E,
        source: Arc<dyn StateSource>,
        batches: &[Batch<E::Tx>],
    ) -> EngineResult<Vec<BatchOutcome>> {
        let started = Instant::now();
        let mut carried = OverlaySource::new(source);
        let mut outcomes = Vec::with_capacity(batches.len());
        let mut next_plan = batches.first().map(|b| self.plan(b)).transpose()?;

        for (i, batch) in batches.iter().enumerate() {
            let plan = match next_plan.take() {
                Some(plan) => plan,
                None => self.plan(batch)?,
            };
            let current: Arc<dyn StateSource> = Arc::new(carried.clone());
            let (outcome, upcoming) = rayon::join(
                || self.execute_planned(executor, current, batch, plan),
                || batches.get(i + 1).map(|b| self.plan(b)).transpose(),
            );
            let outcome = outcome?;
            next_plan = upcoming?;

            carried.apply(outcome.final_writes());
            tracing::debug!(batch = i, carried = carried.len(), "stream batch committed");
            outcomes.push(outcome);
        }

        tracing::info!(
            batches = batches.len(),
            transactions = batches.iter().map(|b| b.len()).sum::<usize>(),
            elapsed_us = micros(started),
            "stream executed"
        );
        Ok(outcomes)
    }

    fn fallback(&self) -> FallbackExecutor<'_> {
        FallbackExecutor::new(&self.scheduler, self.config.verify_footprints)
    }

    fn execute_speculative<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        groups: Vec<WorkerGroup>,
        snapshot: &SnapshotState,
    ) -> EngineResult<BatchOutcome> {
        let mut timings = PhaseTimings::default();
        let mut workers: Vec<SpeculativeWorker> = groups
            .into_iter()
            .enumerate()
            .map(|(id, group)| SpeculativeWorker::new(id, group))
            .collect();

        let store = VersionStore::new();

        let clock = Instant::now();
        run_phase(&mut workers, |w| w.execute(executor, batch, &store, snapshot))?;
        timings.execute_us = micros(clock);

        let clock = Instant::now();
        let aborted_after_validation: usize = run_phase(&mut workers, |w| {
            let aborted = w.validate()?;
            w.prepare_recheck()?;
            Ok(aborted)
        })?
        .into_iter()
        .sum();
        timings.validate_us = micros(clock);

        let clock = Instant::now();
        let recovered: usize = run_phase(&mut workers, |w| w.recheck())?.into_iter().sum();
        timings.recheck_us = micros(clock);

        let records: BTreeMap<TxId, &SpeculativeRecord> = workers
            .iter()
            .flat_map(|w| w.records().iter().map(|(tid, record)| (*tid, record)))
            .collect();
        let aborted: Vec<TxId> = {
            let mut all: Vec<TxId> = workers
                .iter()
                .flat_map(|w| w.aborted().iter().copied())
                .collect();
            all.sort_unstable();
            all
        };
        tracing::debug!(
            workers = workers.len(),
            aborted_after_validation,
            recovered,
            remaining = aborted.len(),
            "speculative phases finished"
        );

        let observed: HashMap<TxId, RWSet> = aborted
            .iter()
            .filter_map(|tid| records.get(tid).map(|r| (*tid, r.footprint.rw_set())))
            .collect();

        let clock = Instant::now();
        let fallback = self.fallback().run(
            executor,
            batch,
            &aborted,
            &observed,
            Some(&store),
            snapshot,
        )?;
        timings.fallback_us = micros(clock);

        let mut reports = Vec::with_capacity(batch.len());
        for tid in batch.tx_ids() {
            let report = match fallback.results.get(&tid) {
                Some(exec) => TxReport {
                    tid,
                    status: TxStatus::CommittedInFallback,
                    exec: *exec,
                },
                None => {
                    let record = records.get(&tid).ok_or(EngineError::UnknownTx(tid))?;
                    TxReport {
                        tid,
                        status: TxStatus::Committed,
                        exec: record.exec,
                    }
                }
            };
            reports.push(report);
        }

        let mut writes = store.committed_writes();
        writes.extend(fallback.writes);

        let stats = BatchStats {
            mode: ExecutionMode::Speculative,
            transactions: batch.len(),
            workers: workers.len(),
            aborted_after_validation,
            aborted_after_recheck: aborted.len(),
            fallback_transactions: fallback.results.len(),
            strategy: fallback.strategy,
            plan_cost: fallback.cost,
            mispredictions: fallback.mispredicted.len(),
            serial_redo: fallback.serial_redo,
            rounds: 0,
            timings,
        };
        Ok(BatchOutcome {
            reports,
            writes,
            stats,
        })
    }

    fn execute_partitioned<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        pass: &PlannedPass,
        snapshot: &SnapshotState,
    ) -> EngineResult<BatchOutcome> {
        let clock = Instant::now();
        let outcome = self
            .fallback()
            .execute_planned(executor, batch, pass, None, snapshot)?;
        let timings = PhaseTimings {
            execute_us: micros(clock),
            ..Default::default()
        };

        let reports = committed_reports(batch, &outcome.results)?;
        let stats = BatchStats {
            mode: ExecutionMode::Partitioned,
            transactions: batch.len(),
            workers: 0,
            aborted_after_validation: 0,
            aborted_after_recheck: 0,
            fallback_transactions: 0,
            strategy: outcome.strategy,
            plan_cost: outcome.cost,
            mispredictions: outcome.mispredicted.len(),
            serial_redo: outcome.serial_redo,
            rounds: 0,
            timings,
        };
        Ok(BatchOutcome {
            reports,
            writes: outcome.writes,
            stats,
        })
    }

    fn execute_occ<E: Executor>(
        &self,
        executor: &E,
        batch: &Batch<E::Tx>,
        snapshot: &SnapshotState,
    ) -> EngineResult<BatchOutcome> {
        let clock = Instant::now();
        let outcome = OccExecutor.run(executor, batch, snapshot)?;
        let timings = PhaseTimings {
            execute_us: micros(clock),
            ..Default::default()
        };

        let reports = committed_reports(batch, &outcome.results)?;
        let stats = BatchStats {
            mode: ExecutionMode::Occ,
            transactions: batch.len(),
            workers: 0,
            aborted_after_validation: outcome.retries,
            aborted_after_recheck: outcome.retries,
            fallback_transactions: 0,
            strategy: None,
            plan_cost: 0,
            mispredictions: 0,
            serial_redo: false,
            rounds: outcome.rounds,
            timings,
        };
        Ok(BatchOutcome {
            reports,
            writes: outcome.writes,
            stats,
        })
    }
}

/// One `Committed` report per transaction of `batch`
fn committed_reports<T>(
    batch: &Batch<T>,
    results: &BTreeMap<TxId, ExecStatus>,
) -> EngineResult<Vec<TxReport>> {
    batch
        .tx_ids()
        .into_iter()
        .map(|tid| {
            results
                .get(&tid)
                .map(|exec| TxReport {
                    tid,
                    status: TxStatus::Committed,
                    exec: *exec,
                })
                .ok_or(EngineError::UnknownTx(tid))
        })
        .collect()
}

/// Run `phase` on every worker in its own thread and join them all
fn run_phase<T, F>(workers: &mut [SpeculativeWorker], phase: F) -> EngineResult<Vec<T>>
where
    T: Send,
    F: Fn(&mut SpeculativeWorker) -> EngineResult<T> + Sync,
{
    thread::scope(|scope| {
        let phase = &phase;
        let handles: Vec<_> = workers
            .iter_mut()
            .map(|worker| scope.spawn(move || phase(worker)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| {
                handle
                    .join()
                    .map_err(|_| EngineError::WorkerPanicked(id))
                    .and_then(|result| result)
            })
            .collect()
    })
}

fn micros(since: Instant) -> u64 {
    metrics::saturating_micros(since.elapsed())
}
