use crate::error::SchedulerResult;
use crate::graph::ConflictGraph;
use crate::plan::{CostTable, SchedulePlan, StrategyKind};
use crate::strategy::GroupingStrategy;

/// One lane per connected component
///
/// Components never share a key with a write, so lanes run fully in
/// parallel while each lane keeps tid order internally.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectedComponents;

impl GroupingStrategy for ConnectedComponents {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Components
    }

    fn plan(&self, graph: &ConflictGraph, costs: &CostTable) -> SchedulerResult<SchedulePlan> {
        SchedulePlan::lanes(StrategyKind::Components, graph.connected_components(), costs)
    }
}
