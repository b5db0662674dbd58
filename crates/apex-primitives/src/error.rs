//! Parsing errors for fixed-size identifiers

use thiserror::Error;

/// Error produced while decoding an [`Address`](crate::Address) or [`H256`](crate::H256)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Input is not valid hex
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Decoded byte length does not match the type
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length in bytes
        expected: usize,
        /// Length actually supplied
        got: usize,
    },
}
