//! Error types for the version store
//!
//! All variants are contract violations; none is retried.

use apex_types::{AccessKey, TxId};
use thiserror::Error;

/// Version store errors
#[derive(Debug, Error)]
pub enum MvccError {
    /// Handle points past the end of its chain's arena
    #[error("version {index} missing from chain {key}")]
    VersionNotFound {
        /// Chain key
        key: AccessKey,
        /// Arena index
        index: u32,
    },

    /// A transaction tried to publish two versions of one key
    #[error("{tid} already has a version of {key}")]
    DuplicateVersion {
        /// Chain key
        key: AccessKey,
        /// Producing transaction
        tid: TxId,
    },

    /// Chain arena exceeded its index space
    #[error("chain {0} is full")]
    ChainFull(AccessKey),
}

/// Result type for version store operations
pub type MvccResult<T> = Result<T, MvccError>;
