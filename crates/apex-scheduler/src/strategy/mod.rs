//! Grouping strategies
//!
//! Each strategy turns a conflict graph into a plan whose groups are
//! conflict-free at the granularity they run in parallel.

mod components;
mod mis;
mod topological;

pub use components::ConnectedComponents;
pub use mis::ApproximateMis;
pub use topological::TopologicalLeveling;

use crate::error::SchedulerResult;
use crate::graph::ConflictGraph;
use crate::plan::{CostTable, SchedulePlan, StrategyKind};

/// A way of partitioning a conflict graph into execution groups
pub trait GroupingStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Build a plan covering every vertex of `graph` exactly once
    fn plan(&self, graph: &ConflictGraph, costs: &CostTable) -> SchedulerResult<SchedulePlan>;
}

/// Instantiate a strategy by kind; `Serial` has no strategy object
pub fn for_kind(kind: StrategyKind) -> Option<Box<dyn GroupingStrategy>> {
    match kind {
        StrategyKind::Components => Some(Box::new(ConnectedComponents)),
        StrategyKind::Topological => Some(Box::new(TopologicalLeveling)),
        StrategyKind::Mis => Some(Box::new(ApproximateMis)),
        StrategyKind::Serial => None,
    }
}
