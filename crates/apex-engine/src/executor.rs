//! Transaction executor callback

use apex_mvcc::StateView;
use serde::{Deserialize, Serialize};

/// Result of running one transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    /// Ran to completion
    Success,
    /// Reverted by its own logic; still counts as executed
    Reverted,
}

impl ExecStatus {
    /// Whether the transaction succeeded
    pub fn is_success(self) -> bool {
        self == ExecStatus::Success
    }
}

/// Runs transactions against a [`StateView`]
///
/// The engine never looks inside a transaction. Whatever the executor
/// reads and writes through the view is the transaction's footprint, so
/// running the same transaction on the same state must touch the same keys.
pub trait Executor: Sync {
    /// Decoded transaction
    type Tx: Sync;

    /// Execute `tx` against `state`
    fn execute(&self, tx: &Self::Tx, state: &mut dyn StateView) -> ExecStatus;
}
