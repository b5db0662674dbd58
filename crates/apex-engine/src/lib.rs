//! # apex-engine
//!
//! Parallel re-execution of an ordered transaction batch with a
//! serializable outcome.
//!
//! Two modes:
//! - **speculative**: gas-balanced worker groups execute optimistically
//!   against a multi-version store, then validate, cascade aborts and
//!   recheck; whatever stays aborted is re-run by the [`FallbackExecutor`]
//! - **partitioned**: the conflict-aware scheduler plans the whole batch
//!   from predicted footprints and the plan is executed directly
//! - **occ**: round-based optimistic concurrency control, a baseline to
//!   compare the other two against
//!
//! [`Engine::execute_stream`] runs consecutive batches, planning each one
//! while its predecessor executes.
//!
//! ```ignore
//! let engine = Engine::new(EngineConfig::default())?;
//! let outcome = engine.execute(&executor, source, &batch)?;
//! for (key, value) in outcome.final_writes() {
//!     println!("{key} = {value:?}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod metrics;
pub mod occ;
pub mod telemetry;
pub mod worker;

pub use batch::{Batch, BatchBuilder, BatchTx};
pub use config::{EngineConfig, ExecutionMode};
pub use engine::{
    BatchOutcome, BatchPlan, BatchStats, Engine, PhaseTimings, SequentialOutcome, TxReport,
    TxStatus,
};
pub use error::{ConfigError, EngineError, EngineResult};
pub use executor::{ExecStatus, Executor};
pub use fallback::{FallbackExecutor, FallbackOutcome, PlannedPass};
pub use metrics::{EngineMetrics, Histogram, MetricsSnapshot, Phase};
pub use occ::{OccExecutor, OccOutcome};
pub use telemetry::init_tracing;
pub use worker::{SpeculativeRecord, SpeculativeWorker};
