//! Linear-time reducing-peeling approximation of a maximal independent set
//!
//! Low-degree vertices are resolved by exact reductions: degree-one
//! vertices evict their neighbor and chains of degree-two vertices are
//! folded away and restored afterwards. Only when every remaining vertex
//! has degree three or more is a vertex dropped heuristically, which is
//! what makes the result approximate.
//!
//! Every choice (bucket seed, max-degree victim) takes the lowest tid, so
//! the output depends only on the graph.

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::ConflictGraph;
use crate::plan::{CostTable, SchedulePlan, StrategyKind};
use crate::strategy::GroupingStrategy;
use apex_types::TxId;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Iterated approximate maximal independent set
///
/// Each iteration solves one independent set on the live graph, emits it
/// as a round and removes it, until no vertex is left.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproximateMis;

impl ApproximateMis {
    /// One independent set of `graph`
    ///
    /// Fails only if the graph's adjacency is inconsistent.
    pub fn independent_set(graph: &ConflictGraph) -> SchedulerResult<BTreeSet<TxId>> {
        Reducer::new(graph).solve()
    }
}

impl GroupingStrategy for ApproximateMis {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mis
    }

    fn plan(&self, graph: &ConflictGraph, costs: &CostTable) -> SchedulerResult<SchedulePlan> {
        let mut live = graph.clone();
        let mut rounds = Vec::new();

        while !live.is_empty() {
            let set = Self::independent_set(&live)?;
            if set.is_empty() {
                return Err(SchedulerError::NoProgress {
                    strategy: StrategyKind::Mis.name(),
                    remaining: live.len(),
                });
            }
            live.remove_vertices(&set);
            rounds.push(set.into_iter().collect());
        }

        SchedulePlan::rounds(StrategyKind::Mis, rounds, costs)
    }
}

/// Outcome of walking a chain of degree-two vertices
enum Chain {
    /// The walk came back to the seed
    Cycle,
    /// Path in canonical order plus its outer endpoints
    Path {
        path: Vec<TxId>,
        v: TxId,
        w: TxId,
    },
}

struct Reducer<'g> {
    original: &'g ConflictGraph,
    live: ConflictGraph,
    ones: BTreeSet<TxId>,
    twos: BTreeSet<TxId>,
    many: BTreeSet<TxId>,
    independent: BTreeSet<TxId>,
    folded: Vec<TxId>,
}

impl<'g> Reducer<'g> {
    fn new(original: &'g ConflictGraph) -> Self {
        let mut reducer = Self {
            original,
            live: original.clone(),
            ones: BTreeSet::new(),
            twos: BTreeSet::new(),
            many: BTreeSet::new(),
            independent: BTreeSet::new(),
            folded: Vec::new(),
        };
        for v in original.vertices() {
            reducer.classify(v);
        }
        reducer
    }

    fn solve(mut self) -> SchedulerResult<BTreeSet<TxId>> {
        loop {
            if let Some(&u) = self.ones.first() {
                match self.live.neighbors(u).and_then(|ns| ns.first().copied()) {
                    Some(n) => self.delete(n),
                    None => self.classify(u),
                }
            } else if let Some(&u) = self.twos.first() {
                self.reduce_chain(u)?;
            } else if let Some(v) = self.max_degree() {
                self.delete(v);
            } else {
                break;
            }
        }

        // Anything left isolated is free to join.
        let isolated: Vec<TxId> = self
            .live
            .vertices()
            .filter(|v| self.live.degree(*v) == Some(0))
            .collect();
        self.independent.extend(isolated);

        // Greedy restore, latest fold first. A folded vertex joins unless an
        // original neighbour already has; this may undershoot the exact unfold.
        while let Some(v) = self.folded.pop() {
            let blocked = self
                .original
                .neighbors(v)
                .map(|ns| ns.iter().any(|n| self.independent.contains(n)))
                .unwrap_or(false);
            if !blocked {
                self.independent.insert(v);
            }
        }

        Ok(self.independent)
    }

    fn unbucket(&mut self, v: TxId) {
        self.ones.remove(&v);
        self.twos.remove(&v);
        self.many.remove(&v);
    }

    /// File `v` under its current degree; degree zero joins the set
    fn classify(&mut self, v: TxId) {
        self.unbucket(v);
        match self.live.degree(v) {
            None => {}
            Some(0) => {
                self.live.remove_vertex(v);
                self.independent.insert(v);
            }
            Some(1) => {
                self.ones.insert(v);
            }
            Some(2) => {
                self.twos.insert(v);
            }
            Some(_) => {
                self.many.insert(v);
            }
        }
    }

    /// Exclude `v` from the set
    fn delete(&mut self, v: TxId) {
        if !self.live.contains(v) {
            return;
        }
        self.unbucket(v);
        for n in self.live.remove_vertex(v) {
            self.classify(n);
        }
    }

    /// Move `v` out of the live graph onto the reconstruction stack
    fn fold(&mut self, v: TxId) {
        self.unbucket(v);
        self.live.remove_vertex(v);
        self.folded.push(v);
    }

    fn max_degree(&self) -> Option<TxId> {
        self.many
            .iter()
            .copied()
            .max_by_key(|v| (self.live.degree(*v).unwrap_or(0), Reverse(*v)))
    }

    /// Follow degree-two vertices away from `seed`, entering at `first`
    ///
    /// `None` means the walk came back to `seed`.
    fn walk(&self, seed: TxId, first: TxId) -> SchedulerResult<Option<(Vec<TxId>, TxId)>> {
        let mut path = Vec::new();
        let mut prev = seed;
        let mut cur = first;
        loop {
            if cur == seed {
                return Ok(None);
            }
            let neighbors = self
                .live
                .neighbors(cur)
                .ok_or(SchedulerError::TxNotFound(cur))?;
            if neighbors.len() != 2 {
                return Ok(Some((path, cur)));
            }
            path.push(cur);
            let next = neighbors
                .iter()
                .copied()
                .find(|n| *n != prev)
                .ok_or(SchedulerError::TxNotFound(cur))?;
            prev = cur;
            cur = next;
        }
    }

    /// The chain through `seed`, or `None` if `seed` no longer has degree two
    fn chain_through(&self, seed: TxId) -> SchedulerResult<Option<Chain>> {
        let neighbors: Vec<TxId> = self
            .live
            .neighbors(seed)
            .ok_or(SchedulerError::TxNotFound(seed))?
            .iter()
            .copied()
            .collect();
        let [a, b] = neighbors[..] else {
            return Ok(None);
        };
        let Some((left, v)) = self.walk(seed, a)? else {
            return Ok(Some(Chain::Cycle));
        };
        let Some((right, w)) = self.walk(seed, b)? else {
            return Ok(Some(Chain::Cycle));
        };

        let mut path: Vec<TxId> = left.into_iter().rev().collect();
        path.push(seed);
        path.extend(right);
        Ok(Some(Chain::Path { path, v, w }))
    }

    fn reduce_chain(&mut self, seed: TxId) -> SchedulerResult<()> {
        let Some(chain) = self.chain_through(seed)? else {
            self.classify(seed);
            return Ok(());
        };

        match chain {
            Chain::Cycle => self.delete(seed),
            Chain::Path { v, w, .. } if v == w => self.delete(v),
            Chain::Path { path, v, w } if path.len() % 2 == 1 => {
                if self.live.has_edge(v, w) {
                    self.delete(v);
                    self.delete(w);
                } else if path.len() == 1 {
                    // Nothing to splice; revisit once a neighbor changes.
                    self.twos.remove(&seed);
                } else {
                    let head = path[0];
                    for &x in path[1..].iter().rev() {
                        self.fold(x);
                    }
                    self.live.add_edge(head, w);
                    self.classify(head);
                    self.classify(w);
                }
            }
            Chain::Path { path, v, w } => {
                for &x in path.iter().rev() {
                    self.fold(x);
                }
                self.live.add_edge(v, w);
                self.classify(v);
                self.classify(w);
            }
        }
        Ok(())
    }
}
