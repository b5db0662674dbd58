//! Access recording wrapper

use crate::view::StateView;
use apex_types::{AccessKey, RWSet, StateValue};

/// Forwards to an inner view and records every key touched
///
/// A read of a key the transaction already wrote is served by the inner
/// view but not recorded as a read.
pub struct TrackingView<'v> {
    inner: &'v mut dyn StateView,
    rw_set: RWSet,
}

impl<'v> TrackingView<'v> {
    /// Wrap `inner`
    pub fn new(inner: &'v mut dyn StateView) -> Self {
        Self {
            inner,
            rw_set: RWSet::new(),
        }
    }

    /// Accesses so far
    pub fn rw_set(&self) -> &RWSet {
        &self.rw_set
    }

    /// Finish and take the recorded accesses
    pub fn into_rw_set(self) -> RWSet {
        self.rw_set
    }
}

impl StateView for TrackingView<'_> {
    fn read(&mut self, key: &AccessKey) -> StateValue {
        if !self.rw_set.writes_key(key) {
            self.rw_set.record_read(*key);
        }
        self.inner.read(key)
    }

    fn write(&mut self, key: AccessKey, value: StateValue) {
        self.rw_set.record_write(key);
        self.inner.write(key, value);
    }
}
