//! # apex-types
//!
//! Access model for the Apex parallel execution engine.
//!
//! Features:
//! - [`AccessKey`]: one versioned state unit, an (account, field) pair
//! - [`RWSet`]: per-transaction read/write footprint
//! - [`AccessedBy`]: reverse index from key to the transactions touching it
//! - [`StateValue`]: typed payload stored under a key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessed_by;
pub mod error;
pub mod rw_set;
pub mod state_key;
pub mod value;

pub use accessed_by::AccessedBy;
pub use error::{TypesError, TypesResult};
pub use rw_set::{AccessSet, RWSet};
pub use state_key::{AccessKey, Field, TxId};
pub use value::StateValue;
