//! Single-owner write buffer over the snapshot

use crate::snapshot::SnapshotState;
use crate::view::StateView;
use apex_types::{AccessKey, StateValue};
use std::collections::BTreeMap;

/// Private overlay: writes stay local, misses go to the snapshot
///
/// Used for dry runs (one buffer per transaction) and for sequential
/// execution (one buffer for the whole batch).
#[derive(Debug)]
pub struct BufferedState<'s> {
    snapshot: &'s SnapshotState,
    writes: BTreeMap<AccessKey, StateValue>,
}

impl<'s> BufferedState<'s> {
    /// Empty buffer over `snapshot`
    pub fn new(snapshot: &'s SnapshotState) -> Self {
        Self {
            snapshot,
            writes: BTreeMap::new(),
        }
    }

    /// Buffered writes
    pub fn writes(&self) -> &BTreeMap<AccessKey, StateValue> {
        &self.writes
    }

    /// Consume the buffer
    pub fn into_writes(self) -> BTreeMap<AccessKey, StateValue> {
        self.writes
    }
}

impl StateView for BufferedState<'_> {
    fn read(&mut self, key: &AccessKey) -> StateValue {
        match self.writes.get(key) {
            Some(value) => value.clone(),
            None => self.snapshot.get(key),
        }
    }

    fn write(&mut self, key: AccessKey, value: StateValue) {
        self.writes.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::InMemorySource;
    use apex_primitives::{Address, U256};
    use std::sync::Arc;

    #[test]
    fn test_overlay() {
        let a = Address::from_low_u64(1);
        let snapshot =
            SnapshotState::new(Arc::new(InMemorySource::new().with_account(a, U256::from(10))));
        let mut state = BufferedState::new(&snapshot);

        assert_eq!(state.balance(&a), U256::from(10));
        state.add_balance(a, U256::from(5));
        assert_eq!(state.balance(&a), U256::from(15));
        assert_eq!(snapshot.get(&AccessKey::balance(a)), StateValue::Balance(U256::from(10)));

        let writes = state.into_writes();
        assert_eq!(writes.len(), 1);
    }
}
