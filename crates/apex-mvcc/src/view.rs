//! State access capability
//!
//! Executors only ever see a [`StateView`]. Which store sits behind it
//! (snapshot, MVCC chains or the fallback overlay) is decided by the engine.

use apex_primitives::{Address, H256, U256};
use apex_types::{AccessKey, Field, StateValue};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Get/set access to world state, one [`AccessKey`] at a time
///
/// Reads of never-written keys return the field's default.
pub trait StateView {
    /// Current value of `key`
    fn read(&mut self, key: &AccessKey) -> StateValue;

    /// Replace the value of `key`
    fn write(&mut self, key: AccessKey, value: StateValue);

    /// Account balance
    fn balance(&mut self, address: &Address) -> U256 {
        self.read(&AccessKey::balance(*address))
            .as_u256()
            .unwrap_or_default()
    }

    /// Set account balance
    fn set_balance(&mut self, address: Address, value: U256) {
        self.write(AccessKey::balance(address), StateValue::Balance(value));
    }

    /// Credit `amount`; saturates at the maximum
    fn add_balance(&mut self, address: Address, amount: U256) {
        let current = self.balance(&address);
        self.set_balance(address, current.saturating_add(amount));
    }

    /// Debit `amount`
    ///
    /// Returns `false` and writes nothing when the balance is too low.
    fn sub_balance(&mut self, address: Address, amount: U256) -> bool {
        let current = self.balance(&address);
        if current < amount {
            return false;
        }
        self.set_balance(address, current - amount);
        true
    }

    /// Account nonce
    fn nonce(&mut self, address: &Address) -> u64 {
        self.read(&AccessKey::nonce(*address))
            .as_nonce()
            .unwrap_or_default()
    }

    /// Set account nonce
    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.write(AccessKey::nonce(address), StateValue::Nonce(nonce));
    }

    /// Contract code
    fn code(&mut self, address: &Address) -> Bytes {
        self.read(&AccessKey::code(*address))
            .as_code()
            .cloned()
            .unwrap_or_default()
    }

    /// Set contract code
    fn set_code(&mut self, address: Address, code: Bytes) {
        self.write(AccessKey::code(address), StateValue::Code(code));
    }

    /// Code hash
    fn code_hash(&mut self, address: &Address) -> H256 {
        self.read(&AccessKey::code_hash(*address))
            .as_code_hash()
            .unwrap_or_default()
    }

    /// Set code hash
    fn set_code_hash(&mut self, address: Address, hash: H256) {
        self.write(AccessKey::code_hash(address), StateValue::CodeHash(hash));
    }

    /// Storage slot
    fn storage(&mut self, address: &Address, slot: H256) -> U256 {
        self.read(&AccessKey::storage(*address, slot))
            .as_u256()
            .unwrap_or_default()
    }

    /// Set storage slot
    fn set_storage(&mut self, address: Address, slot: H256, value: U256) {
        self.write(AccessKey::storage(address, slot), StateValue::Storage(value));
    }

    /// Whether the account exists
    fn is_alive(&mut self, address: &Address) -> bool {
        self.read(&AccessKey::alive(*address))
            .as_alive()
            .unwrap_or_default()
    }

    /// Mark the account as existing
    fn create_account(&mut self, address: Address) {
        self.write(AccessKey::alive(address), StateValue::Alive(true));
    }

    /// Destroy the account: not alive, zero balance
    fn self_destruct(&mut self, address: Address) {
        self.write(AccessKey::alive(address), StateValue::Alive(false));
        self.set_balance(address, U256::zero());
    }
}

/// Where pre-batch state comes from
///
/// Implementations must be safe to query from many workers at once.
pub trait StateSource: Send + Sync {
    /// Value of `key` before the batch
    fn load(&self, key: &AccessKey) -> StateValue;
}

/// Hash-map backed [`StateSource`]
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    values: HashMap<AccessKey, StateValue>,
}

impl InMemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one value
    pub fn insert(&mut self, key: AccessKey, value: StateValue) {
        self.values.insert(key, value);
    }

    /// Builder: alive account with `balance`
    pub fn with_account(mut self, address: Address, balance: U256) -> Self {
        self.insert(AccessKey::alive(address), StateValue::Alive(true));
        self.insert(AccessKey::balance(address), StateValue::Balance(balance));
        self
    }

    /// Builder: storage slot value
    pub fn with_storage(mut self, address: Address, slot: H256, value: U256) -> Self {
        self.insert(AccessKey::storage(address, slot), StateValue::Storage(value));
        self
    }

    /// Builder: contract code and its hash
    pub fn with_code(mut self, address: Address, code: Bytes, hash: H256) -> Self {
        self.insert(AccessKey::code(address), StateValue::Code(code));
        self.insert(AccessKey::code_hash(address), StateValue::CodeHash(hash));
        self
    }

    /// Apply `writes` on top of this state
    pub fn apply<'a>(&mut self, writes: impl IntoIterator<Item = (&'a AccessKey, &'a StateValue)>) {
        for (key, value) in writes {
            self.values.insert(*key, value.clone());
        }
    }

    /// Number of explicit values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value was set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StateSource for InMemorySource {
    fn load(&self, key: &AccessKey) -> StateValue {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default_value(key))
    }
}

/// Values written by earlier batches layered over another source
///
/// Lets consecutive batches run without materializing every intermediate
/// state into the base store.
pub struct OverlaySource {
    base: Arc<dyn StateSource>,
    writes: HashMap<AccessKey, StateValue>,
}

impl OverlaySource {
    /// Empty overlay over `base`
    pub fn new(base: Arc<dyn StateSource>) -> Self {
        Self {
            base,
            writes: HashMap::new(),
        }
    }

    /// Apply `writes` on top of the overlay
    pub fn apply<'a>(&mut self, writes: impl IntoIterator<Item = (&'a AccessKey, &'a StateValue)>) {
        for (key, value) in writes {
            self.writes.insert(*key, value.clone());
        }
    }

    /// Number of overlaid keys
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is overlaid
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl Clone for OverlaySource {
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            writes: self.writes.clone(),
        }
    }
}

impl StateSource for OverlaySource {
    fn load(&self, key: &AccessKey) -> StateValue {
        match self.writes.get(key) {
            Some(value) => value.clone(),
            None => self.base.load(key),
        }
    }
}

/// Field default without going through a source
pub(crate) fn default_value(key: &AccessKey) -> StateValue {
    StateValue::default_for(&key.field)
}
