//! # apex-primitives
//!
//! Fixed-size identifiers used across the Apex parallel execution engine.
//!
//! Accounts are addressed by a 20-byte [`Address`], storage slots and code
//! hashes by a 32-byte [`H256`]. Balances and slot values are [`U256`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod fixed;

pub use error::PrimitiveError;
pub use fixed::{Address, H256};

pub use primitive_types::U256;

/// Per-transaction cost estimate used as a scheduling proxy
pub type Gas = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_arithmetic() {
        let a = U256::from(100u64);
        let b = U256::from(250u64);
        assert_eq!(a + b, U256::from(350u64));
        assert_eq!(b.checked_sub(a), Some(U256::from(150u64)));
        assert_eq!(a.checked_sub(b), None);
    }
}
