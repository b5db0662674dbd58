//! Execution plans and their cost model

use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::ConflictGraph;
use apex_primitives::Gas;
use apex_types::TxId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Which grouping strategy produced a plan
///
/// The numeric id is stable and breaks cost ties: lower ids win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// One transaction at a time, in tid order
    Serial = 0,
    /// Connected components
    Components = 1,
    /// Topological leveling
    Topological = 2,
    /// Iterated approximate maximal independent set
    Mis = 3,
}

impl StrategyKind {
    /// Every conflict-aware strategy, in tie-break order
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Components,
        StrategyKind::Topological,
        StrategyKind::Mis,
    ];

    /// Stable numeric id
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Serial => "serial",
            StrategyKind::Components => "components",
            StrategyKind::Topological => "topological",
            StrategyKind::Mis => "mis",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cost estimate per transaction
#[derive(Clone, Debug, Default)]
pub struct CostTable(HashMap<TxId, Gas>);

impl CostTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cost of one transaction
    pub fn insert(&mut self, tid: TxId, cost: Gas) {
        self.0.insert(tid, cost);
    }

    /// Cost of `tid`
    pub fn cost(&self, tid: TxId) -> SchedulerResult<Gas> {
        self.0
            .get(&tid)
            .copied()
            .ok_or(SchedulerError::MissingCost(tid))
    }

    /// Sum of the costs of `tids`
    pub fn sum(&self, tids: &[TxId]) -> SchedulerResult<Gas> {
        tids.iter()
            .try_fold(0 as Gas, |acc, tid| Ok(acc.saturating_add(self.cost(*tid)?)))
    }

    /// Largest cost among `tids`, zero when empty
    pub fn max(&self, tids: &[TxId]) -> SchedulerResult<Gas> {
        tids.iter()
            .try_fold(0 as Gas, |acc, tid| Ok(acc.max(self.cost(*tid)?)))
    }

    /// Sum of every cost in the table
    pub fn total(&self) -> Gas {
        self.0.values().fold(0, |acc, c| acc.saturating_add(*c))
    }
}

impl FromIterator<(TxId, Gas)> for CostTable {
    fn from_iter<I: IntoIterator<Item = (TxId, Gas)>>(iter: I) -> Self {
        CostTable(iter.into_iter().collect())
    }
}

/// Shape of a plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Lanes run in parallel; each lane runs its members in order
    Lanes(Vec<Vec<TxId>>),
    /// Rounds run in order; members of one round run in parallel
    Rounds(Vec<Vec<TxId>>),
}

impl Layout {
    /// The groups, lanes or rounds
    pub fn groups(&self) -> &[Vec<TxId>] {
        match self {
            Layout::Lanes(groups) | Layout::Rounds(groups) => groups,
        }
    }
}

/// A complete execution plan with its critical-path cost
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulePlan {
    /// Producing strategy
    pub strategy: StrategyKind,
    /// Estimated critical-path cost
    pub cost: Gas,
    /// Groups to execute
    pub layout: Layout,
}

impl SchedulePlan {
    /// Plan of parallel lanes; cost is the heaviest lane
    pub fn lanes(
        strategy: StrategyKind,
        lanes: Vec<Vec<TxId>>,
        costs: &CostTable,
    ) -> SchedulerResult<Self> {
        let cost = lanes
            .iter()
            .try_fold(0 as Gas, |acc, lane| Ok::<_, SchedulerError>(acc.max(costs.sum(lane)?)))?;
        Ok(Self {
            strategy,
            cost,
            layout: Layout::Lanes(lanes),
        })
    }

    /// Plan of sequential rounds; cost sums the heaviest member per round
    pub fn rounds(
        strategy: StrategyKind,
        rounds: Vec<Vec<TxId>>,
        costs: &CostTable,
    ) -> SchedulerResult<Self> {
        let cost = rounds.iter().try_fold(0 as Gas, |acc, round| {
            Ok::<_, SchedulerError>(acc.saturating_add(costs.max(round)?))
        })?;
        Ok(Self {
            strategy,
            cost,
            layout: Layout::Rounds(rounds),
        })
    }

    /// One singleton round per transaction, in tid order
    pub fn serial(tids: impl IntoIterator<Item = TxId>, total_cost: Gas) -> Self {
        let mut ordered: Vec<TxId> = tids.into_iter().collect();
        ordered.sort_unstable();
        Self {
            strategy: StrategyKind::Serial,
            cost: total_cost,
            layout: Layout::Rounds(ordered.into_iter().map(|tid| vec![tid]).collect()),
        }
    }

    /// Every scheduled transaction, in layout order
    pub fn tx_ids(&self) -> Vec<TxId> {
        self.layout.groups().iter().flatten().copied().collect()
    }

    /// Number of scheduled transactions
    pub fn tx_count(&self) -> usize {
        self.layout.groups().iter().map(|g| g.len()).sum()
    }

    /// Whether every transaction in `expected` appears exactly once and
    /// nothing else does
    pub fn covers_exactly(&self, expected: &BTreeSet<TxId>) -> bool {
        let ids = self.tx_ids();
        let unique: BTreeSet<TxId> = ids.iter().copied().collect();
        unique.len() == ids.len() && &unique == expected
    }

    /// Whether every conflicting pair runs lower tid first
    ///
    /// Lanes must hold both ends of an edge with the lower tid earlier;
    /// rounds must put the lower tid in a strictly earlier round.
    pub fn preserves_order(&self, graph: &ConflictGraph) -> bool {
        let mut position: HashMap<TxId, (usize, usize)> = HashMap::new();
        for (g, group) in self.layout.groups().iter().enumerate() {
            for (i, tid) in group.iter().enumerate() {
                position.insert(*tid, (g, i));
            }
        }
        graph.edges().into_iter().all(|(low, high)| {
            let (Some(lo), Some(hi)) = (position.get(&low), position.get(&high)) else {
                return false;
            };
            match self.layout {
                Layout::Lanes(_) => lo.0 == hi.0 && lo.1 < hi.1,
                Layout::Rounds(_) => lo.0 < hi.0,
            }
        })
    }

    /// Most transactions that can run at the same time
    pub fn max_parallelism(&self) -> usize {
        match &self.layout {
            Layout::Lanes(lanes) => lanes.iter().filter(|l| !l.is_empty()).count(),
            Layout::Rounds(rounds) => rounds.iter().map(|r| r.len()).max().unwrap_or(0),
        }
    }

    /// Transactions per sequential step (1.0 = fully serial)
    pub fn parallelism_ratio(&self) -> f64 {
        let steps = match &self.layout {
            Layout::Lanes(lanes) => lanes.iter().map(|l| l.len()).max().unwrap_or(0),
            Layout::Rounds(rounds) => rounds.len(),
        };
        if steps == 0 {
            return 0.0;
        }
        self.tx_count() as f64 / steps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs(values: &[Gas]) -> CostTable {
        values
            .iter()
            .enumerate()
            .map(|(i, c)| (TxId::from(i), *c))
            .collect()
    }

    #[test]
    fn test_lane_cost_is_heaviest_lane() {
        let table = costs(&[10, 20, 5, 40]);
        let plan = SchedulePlan::lanes(
            StrategyKind::Components,
            vec![vec![TxId(0), TxId(1), TxId(2)], vec![TxId(3)]],
            &table,
        )
        .unwrap();
        assert_eq!(plan.cost, 40);
        assert_eq!(plan.max_parallelism(), 2);
    }

    #[test]
    fn test_round_cost_sums_round_maxima() {
        let table = costs(&[10, 20, 5, 40]);
        let plan = SchedulePlan::rounds(
            StrategyKind::Topological,
            vec![vec![TxId(0), TxId(1)], vec![TxId(2), TxId(3)]],
            &table,
        )
        .unwrap();
        assert_eq!(plan.cost, 20 + 40);
        assert_eq!(plan.parallelism_ratio(), 2.0);
    }

    #[test]
    fn test_missing_cost() {
        let table = costs(&[1]);
        let err = SchedulePlan::rounds(StrategyKind::Mis, vec![vec![TxId(5)]], &table).unwrap_err();
        assert!(matches!(err, SchedulerError::MissingCost(TxId(5))));
    }

    #[test]
    fn test_serial_plan() {
        let plan = SchedulePlan::serial([TxId(2), TxId(0), TxId(1)], 9);
        assert_eq!(plan.strategy, StrategyKind::Serial);
        assert_eq!(plan.cost, 9);
        assert_eq!(plan.tx_ids(), vec![TxId(0), TxId(1), TxId(2)]);
        assert_eq!(plan.max_parallelism(), 1);
    }

    #[test]
    fn test_covers_exactly() {
        let expected: BTreeSet<TxId> = [TxId(0), TxId(1)].into_iter().collect();
        let good = SchedulePlan::serial([TxId(0), TxId(1)], 0);
        assert!(good.covers_exactly(&expected));

        let dup = SchedulePlan {
            strategy: StrategyKind::Mis,
            cost: 0,
            layout: Layout::Rounds(vec![vec![TxId(0)], vec![TxId(0), TxId(1)]]),
        };
        assert!(!dup.covers_exactly(&expected));
    }

    #[test]
    fn test_preserves_order() {
        let mut graph = ConflictGraph::with_vertices([TxId(0), TxId(1), TxId(2)]);
        graph.add_edge(TxId(0), TxId(1));
        graph.add_edge(TxId(1), TxId(2));
        let table = costs(&[1, 1, 1]);

        let levels = SchedulePlan::rounds(
            StrategyKind::Topological,
            vec![vec![TxId(0)], vec![TxId(1)], vec![TxId(2)]],
            &table,
        )
        .unwrap();
        assert!(levels.preserves_order(&graph));

        // Independent rounds that run T2 before T1
        let reordered = SchedulePlan::rounds(
            StrategyKind::Mis,
            vec![vec![TxId(0), TxId(2)], vec![TxId(1)]],
            &table,
        )
        .unwrap();
        assert!(!reordered.preserves_order(&graph));

        let lane = SchedulePlan::lanes(
            StrategyKind::Components,
            vec![vec![TxId(0), TxId(1), TxId(2)]],
            &table,
        )
        .unwrap();
        assert!(lane.preserves_order(&graph));

        let backwards = SchedulePlan::lanes(
            StrategyKind::Components,
            vec![vec![TxId(1), TxId(0), TxId(2)]],
            &table,
        )
        .unwrap();
        assert!(!backwards.preserves_order(&graph));

        assert!(SchedulePlan::serial([TxId(2), TxId(1), TxId(0)], 3).preserves_order(&graph));
    }

    #[test]
    fn test_strategy_ids() {
        assert_eq!(StrategyKind::Components.id(), 1);
        assert_eq!(StrategyKind::Topological.id(), 2);
        assert_eq!(StrategyKind::Mis.id(), 3);
        assert_eq!(StrategyKind::Mis.to_string(), "mis");
    }
}
