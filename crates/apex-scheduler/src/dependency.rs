//! Directed dependency graph for order-preserving grouping
//!
//! Orients every conflict edge from the lower tid to the higher one, so the
//! original order is preserved between any two conflicting transactions.

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::ConflictGraph;
use apex_types::TxId;
use std::collections::{BTreeMap, BTreeSet};

/// Dependency DAG
///
/// An edge `from -> to` means `from` must finish before `to` starts.
#[derive(Clone, Debug, Default)]
pub struct DependencyDag {
    /// Forward edges: tx -> transactions that depend on it
    forward: BTreeMap<TxId, BTreeSet<TxId>>,
    /// Backward edges: tx -> transactions it depends on
    backward: BTreeMap<TxId, BTreeSet<TxId>>,
}

impl DependencyDag {
    /// Create a new empty DAG
    pub fn new() -> Self {
        Self::default()
    }

    /// Orient the conflict edges low -> high
    pub fn from_conflicts(graph: &ConflictGraph) -> Self {
        let mut dag = Self::new();
        for v in graph.vertices() {
            dag.add_transaction(v);
        }
        for (low, high) in graph.edges() {
            dag.add_dependency(low, high);
        }
        dag
    }

    /// Add a transaction to the graph
    pub fn add_transaction(&mut self, tx_id: TxId) {
        self.forward.entry(tx_id).or_default();
        self.backward.entry(tx_id).or_default();
    }

    /// Add a dependency edge: `from` must execute before `to`
    pub fn add_dependency(&mut self, from: TxId, to: TxId) {
        self.add_transaction(from);
        self.add_transaction(to);
        self.forward.entry(from).or_default().insert(to);
        self.backward.entry(to).or_default().insert(from);
    }

    /// Transactions that depend on `tx_id`
    pub fn dependents(&self, tx_id: TxId) -> impl Iterator<Item = TxId> + '_ {
        self.forward.get(&tx_id).into_iter().flatten().copied()
    }

    /// Transactions `tx_id` depends on
    pub fn dependencies(&self, tx_id: TxId) -> impl Iterator<Item = TxId> + '_ {
        self.backward.get(&tx_id).into_iter().flatten().copied()
    }

    /// Get in-degree (number of dependencies) for a transaction
    pub fn in_degree(&self, tx_id: TxId) -> usize {
        self.backward.get(&tx_id).map(|deps| deps.len()).unwrap_or(0)
    }

    /// Peel zero in-degree vertices into successive levels (Kahn)
    ///
    /// Members of one level share no edge; every edge goes from a lower
    /// level to a strictly higher one.
    pub fn levels(&self) -> SchedulerResult<Vec<Vec<TxId>>> {
        let mut in_degree: BTreeMap<TxId, usize> = self
            .backward
            .iter()
            .map(|(tx, deps)| (*tx, deps.len()))
            .collect();

        let mut ready: Vec<TxId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&tx, _)| tx)
            .collect();

        let mut levels = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut next = BTreeSet::new();
            for &tx in &ready {
                for dep in self.dependents(tx) {
                    if let Some(deg) = in_degree.get_mut(&dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            next.insert(dep);
                        }
                    }
                }
            }
            placed += ready.len();
            levels.push(ready);
            ready = next.into_iter().collect();
        }

        if placed != in_degree.len() {
            let in_cycle = in_degree
                .iter()
                .find(|(_, &deg)| deg > 0)
                .map(|(&tx, _)| tx)
                .unwrap_or_default();
            return Err(SchedulerError::CircularDependency(in_cycle));
        }

        Ok(levels)
    }

    /// Topological order: levels flattened
    pub fn topological_order(&self) -> SchedulerResult<Vec<TxId>> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }

    /// Get total number of transactions
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Get total number of dependency edges
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|edges| edges.len()).sum()
    }
}
