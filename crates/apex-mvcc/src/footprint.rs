//! What one speculative transaction touched

use crate::chain::VersionRef;
use apex_types::{AccessKey, RWSet, StateValue, TxId};
use std::collections::{BTreeMap, HashMap};

/// Version each key was read from (reads served by the snapshot point at
/// the chain anchor)
pub type ReadView = HashMap<AccessKey, VersionRef>;

/// Version each key was published as
pub type WriteView = HashMap<AccessKey, VersionRef>;

/// Writes of the transaction in flight, applied at commit in key order
pub type LocalWriteBuffer = BTreeMap<AccessKey, StateValue>;

/// Read and write versions of one committed speculative transaction
#[derive(Clone, Debug)]
pub struct TxFootprint {
    /// Transaction
    pub tid: TxId,
    /// Versions read
    pub reads: ReadView,
    /// Versions written
    pub writes: WriteView,
}

impl TxFootprint {
    /// Keys touched, without version information
    pub fn rw_set(&self) -> RWSet {
        let mut rw = RWSet::new();
        for key in self.reads.keys() {
            rw.record_read(*key);
        }
        for key in self.writes.keys() {
            rw.record_write(*key);
        }
        rw
    }
}
