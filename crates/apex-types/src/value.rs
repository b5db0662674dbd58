//! Typed payload of one access key

use crate::state_key::Field;
use apex_primitives::{H256, U256};
use bytes::Bytes;

/// Value stored under an [`AccessKey`](crate::AccessKey)
///
/// The variant always matches the key's [`Field`]. Values are replaced as a
/// whole on write, never patched in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValue {
    /// Account balance
    Balance(U256),
    /// Account nonce
    Nonce(u64),
    /// Contract bytecode
    Code(Bytes),
    /// Hash of the bytecode
    CodeHash(H256),
    /// Existence flag
    Alive(bool),
    /// Storage slot value
    Storage(U256),
}

impl StateValue {
    /// Value of a key that was never written
    pub fn default_for(field: &Field) -> Self {
        match field {
            Field::Balance => StateValue::Balance(U256::zero()),
            Field::Nonce => StateValue::Nonce(0),
            Field::Code => StateValue::Code(Bytes::new()),
            Field::CodeHash => StateValue::CodeHash(H256::ZERO),
            Field::Alive => StateValue::Alive(false),
            Field::Storage(_) => StateValue::Storage(U256::zero()),
        }
    }

    /// Whether this value has the variant a key with `field` carries
    pub fn matches(&self, field: &Field) -> bool {
        matches!(
            (self, field),
            (StateValue::Balance(_), Field::Balance)
                | (StateValue::Nonce(_), Field::Nonce)
                | (StateValue::Code(_), Field::Code)
                | (StateValue::CodeHash(_), Field::CodeHash)
                | (StateValue::Alive(_), Field::Alive)
                | (StateValue::Storage(_), Field::Storage(_))
        )
    }

    /// Numeric payload of a balance or storage value
    pub fn as_u256(&self) -> Option<U256> {
        match self {
            StateValue::Balance(v) | StateValue::Storage(v) => Some(*v),
            _ => None,
        }
    }

    /// Nonce payload
    pub fn as_nonce(&self) -> Option<u64> {
        match self {
            StateValue::Nonce(n) => Some(*n),
            _ => None,
        }
    }

    /// Code payload
    pub fn as_code(&self) -> Option<&Bytes> {
        match self {
            StateValue::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Code hash payload
    pub fn as_code_hash(&self) -> Option<H256> {
        match self {
            StateValue::CodeHash(h) => Some(*h),
            _ => None,
        }
    }

    /// Existence flag payload
    pub fn as_alive(&self) -> Option<bool> {
        match self {
            StateValue::Alive(a) => Some(*a),
            _ => None,
        }
    }
}
