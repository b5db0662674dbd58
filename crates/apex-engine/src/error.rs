//! Engine error types

use apex_mvcc::MvccError;
use apex_scheduler::SchedulerError;
use apex_types::TxId;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values parse but make no sense together
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Batch execution errors
///
/// Every variant ends the batch. Validation aborts are not errors; they
/// show up in the batch report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Conflict model or plan was inconsistent
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Version store contract violated
    #[error("version store error: {0}")]
    Mvcc(#[from] MvccError),

    /// A tid outside the batch was referenced
    #[error("unknown transaction: {0}")]
    UnknownTx(TxId),

    /// A plan was executed against a batch it was not made for
    #[error("plan covers {planned} transactions, batch has {actual}")]
    PlanMismatch {
        /// Planned batch size
        planned: usize,
        /// Executed batch size
        actual: usize,
    },

    /// An OCC round committed nothing
    #[error("optimistic round made no progress with {0} transactions pending")]
    NoProgress(usize),

    /// A worker thread panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
