use crate::dependency::DependencyDag;
use crate::error::SchedulerResult;
use crate::graph::ConflictGraph;
use crate::plan::{CostTable, SchedulePlan, StrategyKind};
use crate::strategy::GroupingStrategy;

/// Rounds from Kahn peeling of the low -> high dependency DAG
#[derive(Clone, Copy, Debug, Default)]
pub struct TopologicalLeveling;

impl GroupingStrategy for TopologicalLeveling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Topological
    }

    fn plan(&self, graph: &ConflictGraph, costs: &CostTable) -> SchedulerResult<SchedulePlan> {
        let levels = DependencyDag::from_conflicts(graph).levels()?;
        SchedulePlan::rounds(StrategyKind::Topological, levels, costs)
    }
}
