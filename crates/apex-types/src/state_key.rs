//! State keys and transaction identifiers

use crate::error::TypesError;
use apex_primitives::{Address, H256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Transaction sequence number
///
/// The position of a transaction in the batch's original total order.
/// Lower ids have priority during validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub u32);

impl TxId {
    /// Create a new transaction ID
    pub fn new(id: u32) -> Self {
        TxId(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Index into per-batch vectors
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for TxId {
    fn from(id: u32) -> Self {
        TxId(id)
    }
}

impl From<usize> for TxId {
    fn from(id: usize) -> Self {
        TxId(id as u32)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// One versioned component of an account
///
/// The account fields form a closed set. Every storage slot is a separate
/// field so that two slots of one contract never conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    /// Account balance
    Balance,
    /// Account nonce
    Nonce,
    /// Contract bytecode
    Code,
    /// Hash of the contract bytecode
    CodeHash,
    /// Existence flag, cleared by self-destruct
    Alive,
    /// Contract storage slot
    Storage(H256),
}

impl Field {
    /// Whether this field is a storage slot
    pub fn is_storage(&self) -> bool {
        matches!(self, Field::Storage(_))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Balance => f.write_str("balance"),
            Field::Nonce => f.write_str("nonce"),
            Field::Code => f.write_str("code"),
            Field::CodeHash => f.write_str("codeHash"),
            Field::Alive => f.write_str("alive"),
            Field::Storage(slot) => write!(f, "{}", slot),
        }
    }
}

impl FromStr for Field {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(Field::Balance),
            "nonce" => Ok(Field::Nonce),
            "code" => Ok(Field::Code),
            "codeHash" => Ok(Field::CodeHash),
            "alive" => Ok(Field::Alive),
            other => H256::from_hex(other)
                .map(Field::Storage)
                .map_err(|_| TypesError::InvalidField(other.to_string())),
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Key identifying one versioned state unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessKey {
    /// Account address
    pub address: Address,
    /// Field of the account
    pub field: Field,
}

impl AccessKey {
    /// Create a new access key
    pub fn new(address: Address, field: Field) -> Self {
        Self { address, field }
    }

    /// Key for an account balance
    pub fn balance(address: Address) -> Self {
        Self::new(address, Field::Balance)
    }

    /// Key for an account nonce
    pub fn nonce(address: Address) -> Self {
        Self::new(address, Field::Nonce)
    }

    /// Key for contract code
    pub fn code(address: Address) -> Self {
        Self::new(address, Field::Code)
    }

    /// Key for the code hash
    pub fn code_hash(address: Address) -> Self {
        Self::new(address, Field::CodeHash)
    }

    /// Key for the existence flag
    pub fn alive(address: Address) -> Self {
        Self::new(address, Field::Alive)
    }

    /// Key for a storage slot
    pub fn storage(address: Address, slot: H256) -> Self {
        Self::new(address, Field::Storage(slot))
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.field)
    }
}
