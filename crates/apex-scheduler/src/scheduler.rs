//! Cost-based strategy selection
//!
//! Builds the conflict model once, runs every configured grouping strategy
//! concurrently and keeps the plan with the cheapest critical path.

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::ConflictGraph;
use crate::plan::{CostTable, SchedulePlan, StrategyKind};
use crate::strategy::{self, GroupingStrategy};
use apex_primitives::Gas;
use apex_types::{AccessedBy, RWSet, TxId};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// What the scheduler needs to know about one transaction
#[derive(Clone, Debug)]
pub struct TxProfile {
    /// Transaction ID
    pub tid: TxId,
    /// Cost estimate
    pub cost: Gas,
    /// Read/write set (predicted or observed)
    pub rw_set: RWSet,
}

impl TxProfile {
    /// Create a new profile
    pub fn new(tid: TxId, cost: Gas, rw_set: RWSet) -> Self {
        Self { tid, cost, rw_set }
    }
}

/// Conflict-aware scheduler
pub struct Scheduler {
    strategies: Vec<Box<dyn GroupingStrategy>>,
    preserve_order: bool,
}

impl Scheduler {
    /// Scheduler running all three strategies
    pub fn new() -> Self {
        Self::with_strategies(&StrategyKind::ALL)
    }

    /// Scheduler running only `kinds`; `Serial` entries are ignored since
    /// the serial plan is always available
    pub fn with_strategies(kinds: &[StrategyKind]) -> Self {
        let mut unique: Vec<StrategyKind> = kinds.to_vec();
        unique.sort();
        unique.dedup();
        Self {
            strategies: unique.into_iter().filter_map(strategy::for_kind).collect(),
            preserve_order: false,
        }
    }

    /// Only accept plans that run every conflicting pair in tid order
    ///
    /// Needed whenever the plan's result must equal a sequential replay
    /// and the transactions do not commute.
    pub fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    /// Whether plans reordering conflicting transactions are rejected
    pub fn preserves_order(&self) -> bool {
        self.preserve_order
    }

    /// Strategies this scheduler compares
    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Build the conflict model for `txs`
    ///
    /// Fails only on malformed input (a tid listed twice).
    pub fn conflict_model(txs: &[TxProfile]) -> SchedulerResult<(ConflictGraph, CostTable)> {
        let mut seen = BTreeSet::new();
        for tx in txs {
            if !seen.insert(tx.tid) {
                return Err(SchedulerError::DuplicateTx(tx.tid));
            }
        }

        let index = AccessedBy::build(txs.iter().map(|tx| (tx.tid, &tx.rw_set)));
        let graph = ConflictGraph::from_accessed_by(&index, txs.iter().map(|tx| tx.tid))?;
        let costs = txs.iter().map(|tx| (tx.tid, tx.cost)).collect();
        Ok((graph, costs))
    }

    /// Choose a plan for `txs`
    pub fn schedule(&self, txs: &[TxProfile]) -> SchedulerResult<SchedulePlan> {
        let (graph, costs) = Self::conflict_model(txs)?;
        tracing::debug!(
            transactions = graph.len(),
            conflicts = graph.edge_count(),
            "conflict graph built"
        );
        Ok(self.plan_graph(&graph, &costs))
    }

    /// Run every strategy on `graph` and keep the cheapest plan
    ///
    /// A strategy that fails is skipped; with none left the serial plan
    /// is returned, so this never fails.
    pub fn plan_graph(&self, graph: &ConflictGraph, costs: &CostTable) -> SchedulePlan {
        let candidates: Vec<(StrategyKind, SchedulerResult<SchedulePlan>)> = self
            .strategies
            .par_iter()
            .map(|s| (s.kind(), s.plan(graph, costs)))
            .collect();

        let mut best: Option<SchedulePlan> = None;
        for (kind, result) in candidates {
            match result {
                Ok(plan) if self.preserve_order && !plan.preserves_order(graph) => {
                    tracing::debug!(
                        strategy = %kind,
                        cost = plan.cost,
                        "strategy reorders conflicting transactions, skipped"
                    );
                }
                Ok(plan) => {
                    tracing::debug!(
                        strategy = %kind,
                        cost = plan.cost,
                        groups = plan.layout.groups().len(),
                        "strategy evaluated"
                    );
                    let better = best
                        .as_ref()
                        .map(|b| (plan.cost, plan.strategy) < (b.cost, b.strategy))
                        .unwrap_or(true);
                    if better {
                        best = Some(plan);
                    }
                }
                Err(e) => tracing::warn!(strategy = %kind, error = %e, "strategy failed"),
            }
        }

        let plan = best.unwrap_or_else(|| SchedulePlan::serial(graph.vertices(), costs.total()));
        tracing::info!(
            strategy = %plan.strategy,
            cost = plan.cost,
            transactions = plan.tx_count(),
            "schedule selected"
        );
        plan
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
