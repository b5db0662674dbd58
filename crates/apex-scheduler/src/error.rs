//! Error types for the scheduler

use apex_types::TxId;
use thiserror::Error;

/// Scheduler errors
///
/// Every variant is a contract violation. Strategy selection itself never
/// fails because the serial plan is always available.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Transaction not found
    #[error("transaction {0} not found")]
    TxNotFound(TxId),

    /// Transaction appears twice in one batch
    #[error("transaction {0} submitted twice")]
    DuplicateTx(TxId),

    /// No cost estimate for a scheduled transaction
    #[error("no cost estimate for transaction {0}")]
    MissingCost(TxId),

    /// Circular dependency detected
    #[error("circular dependency detected involving transaction {0}")]
    CircularDependency(TxId),

    /// A grouping round came out empty while vertices remained
    #[error("{strategy} made no progress with {remaining} transactions left")]
    NoProgress {
        /// Strategy name
        strategy: &'static str,
        /// Vertices still unassigned
        remaining: usize,
    },

    /// Balancer asked for zero groups
    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
