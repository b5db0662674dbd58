//! # apex-scheduler
//!
//! Conflict-aware scheduling for the Apex parallel execution engine.
//!
//! Features:
//! - Conflict graph construction from the [`AccessedBy`](apex_types::AccessedBy) index
//! - Three grouping strategies: connected components, topological leveling
//!   and approximate maximal-independent-set peeling
//! - Cost-based selection among strategies
//! - Gas-balanced partitioning for speculative workers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod balancer;
pub mod dependency;
pub mod error;
pub mod graph;
pub mod plan;
pub mod scheduler;
pub mod strategy;

pub use balancer::{GreedyBalancer, WorkerGroup};
pub use dependency::DependencyDag;
pub use error::{SchedulerError, SchedulerResult};
pub use graph::ConflictGraph;
pub use plan::{CostTable, Layout, SchedulePlan, StrategyKind};
pub use scheduler::{Scheduler, TxProfile};
pub use strategy::{ApproximateMis, ConnectedComponents, GroupingStrategy, TopologicalLeveling};
