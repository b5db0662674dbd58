//! Per-key version chains
//!
//! A chain is an arena of [`VersionNode`]s behind one mutex. Nodes are
//! doubly linked in ascending producer order; index 0 is the committed
//! anchor standing for the snapshot. Indices are never reused, so a
//! [`VersionRef`] stays valid for the life of the batch.
//!
//! Every status change wakes all waiters of the chain.

use crate::error::{MvccError, MvccResult};
use crate::version::{Producer, Status, VersionInfo, VersionNode};
use apex_types::{AccessKey, StateValue, TxId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

const ANCHOR: u32 = 0;

/// Version chain of one key
pub struct VersionChain {
    key: AccessKey,
    nodes: Mutex<Vec<VersionNode>>,
    resolved: Condvar,
}

impl VersionChain {
    /// Chain holding only the snapshot anchor
    pub fn new(key: AccessKey) -> Self {
        Self {
            key,
            nodes: Mutex::new(vec![VersionNode::anchor()]),
            resolved: Condvar::new(),
        }
    }

    /// Key this chain versions
    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    /// Number of versions, anchor included
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Whether only the anchor is present
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Copy of every version, in chain order
    pub fn versions(&self) -> Vec<VersionInfo> {
        let nodes = self.nodes.lock();
        let mut out = Vec::with_capacity(nodes.len());
        let mut cursor = Some(ANCHOR);
        while let Some(idx) = cursor {
            let Some(node) = nodes.get(idx as usize) else {
                break;
            };
            out.push(node.info(idx));
            cursor = node.next;
        }
        out
    }

    /// Value of the highest committed transaction version
    ///
    /// `None` means nothing in the batch committed a write to this key.
    pub fn latest_committed(&self) -> Option<StateValue> {
        let nodes = self.nodes.lock();
        let mut latest = None;
        let mut cursor = nodes.get(ANCHOR as usize).and_then(|n| n.next);
        while let Some(idx) = cursor {
            let Some(node) = nodes.get(idx as usize) else {
                break;
            };
            if node.status == Status::Committed {
                latest = node.payload.as_ref();
            }
            cursor = node.next;
        }
        latest.cloned()
    }

    fn node<'a>(&self, nodes: &'a [VersionNode], index: u32) -> MvccResult<&'a VersionNode> {
        nodes.get(index as usize).ok_or(MvccError::VersionNotFound {
            key: self.key,
            index,
        })
    }

    fn node_mut<'a>(
        &self,
        nodes: &'a mut [VersionNode],
        index: u32,
    ) -> MvccResult<&'a mut VersionNode> {
        nodes.get_mut(index as usize).ok_or(MvccError::VersionNotFound {
            key: self.key,
            index,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<VersionNode>> {
        self.nodes.lock()
    }
}

impl fmt::Debug for VersionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionChain")
            .field("key", &self.key)
            .field("versions", &self.len())
            .finish()
    }
}

/// Handle to one version: its chain plus a stable arena index
#[derive(Clone)]
pub struct VersionRef {
    chain: Arc<VersionChain>,
    index: u32,
}

impl VersionRef {
    /// Handle to the snapshot anchor of `chain`
    pub fn anchor(chain: Arc<VersionChain>) -> Self {
        Self {
            chain,
            index: ANCHOR,
        }
    }

    /// Handle to an arbitrary slot of `chain`, valid or not
    #[cfg(test)]
    pub(crate) fn at(chain: Arc<VersionChain>, index: u32) -> Self {
        Self { chain, index }
    }

    /// Link a new pending version produced by `tid` into `chain`
    ///
    /// The version is placed after every version with a smaller producer,
    /// keeping the chain ordered by tid regardless of installation order.
    pub fn install(chain: Arc<VersionChain>, tid: TxId, value: StateValue) -> MvccResult<Self> {
        let producer = Producer::Tx(tid);
        let index = {
            let mut nodes = chain.lock();
            let index = u32::try_from(nodes.len()).map_err(|_| MvccError::ChainFull(chain.key))?;

            let mut prev = ANCHOR;
            loop {
                let next = chain.node(&nodes, prev)?.next;
                match next {
                    Some(n) => {
                        let candidate = chain.node(&nodes, n)?.producer;
                        if candidate == producer {
                            return Err(MvccError::DuplicateVersion {
                                key: chain.key,
                                tid,
                            });
                        }
                        if candidate > producer {
                            break;
                        }
                        prev = n;
                    }
                    None => break,
                }
            }

            let next = chain.node(&nodes, prev)?.next;
            if let Some(n) = next {
                chain.node_mut(&mut nodes, n)?.prev = Some(index);
            }
            chain.node_mut(&mut nodes, prev)?.next = Some(index);
            nodes.push(VersionNode {
                producer,
                payload: Some(value),
                status: Status::Pending,
                readers: Default::default(),
                prev: Some(prev),
                next,
            });
            index
        };
        Ok(Self { chain, index })
    }

    /// Key of the chain
    pub fn key(&self) -> &AccessKey {
        self.chain.key()
    }

    /// Arena index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether this is the snapshot anchor
    pub fn is_anchor(&self) -> bool {
        self.index == ANCHOR
    }

    /// Producing transaction
    pub fn producer(&self) -> MvccResult<Producer> {
        let nodes = self.chain.lock();
        Ok(self.chain.node(&nodes, self.index)?.producer)
    }

    /// Current status
    pub fn status(&self) -> MvccResult<Status> {
        let nodes = self.chain.lock();
        Ok(self.chain.node(&nodes, self.index)?.status)
    }

    /// Stored value, `None` for the anchor
    pub fn payload(&self) -> MvccResult<Option<StateValue>> {
        let nodes = self.chain.lock();
        Ok(self.chain.node(&nodes, self.index)?.payload.clone())
    }

    /// Change the status and wake every waiter on the chain
    pub fn set_status(&self, status: Status) -> MvccResult<()> {
        {
            let mut nodes = self.chain.lock();
            self.chain.node_mut(&mut nodes, self.index)?.status = status;
        }
        self.chain.resolved.notify_all();
        Ok(())
    }

    /// Record `reader` and return the value it sees
    ///
    /// Anchor reads are recorded too: a later writer of the key must
    /// follow every snapshot reader.
    pub fn observe(&self, reader: TxId) -> MvccResult<Option<StateValue>> {
        let mut nodes = self.chain.lock();
        let node = self.chain.node_mut(&mut nodes, self.index)?;
        node.readers.insert(reader);
        Ok(node.payload.clone())
    }

    /// Recorded readers, ascending
    pub fn readers(&self) -> MvccResult<Vec<TxId>> {
        let nodes = self.chain.lock();
        Ok(self
            .chain
            .node(&nodes, self.index)?
            .readers
            .iter()
            .copied()
            .collect())
    }

    /// Highest recorded reader
    pub fn max_reader(&self) -> MvccResult<Option<TxId>> {
        let nodes = self.chain.lock();
        Ok(self.chain.node(&nodes, self.index)?.max_reader())
    }

    /// Producer of the first later version not produced by `own`
    pub fn next_foreign(&self, own: TxId) -> MvccResult<Option<TxId>> {
        let nodes = self.chain.lock();
        let mut cursor = self.chain.node(&nodes, self.index)?.next;
        while let Some(idx) = cursor {
            let node = self.chain.node(&nodes, idx)?;
            match node.producer {
                Producer::Tx(tid) if tid != own => return Ok(Some(tid)),
                _ => cursor = node.next,
            }
        }
        Ok(None)
    }

    /// Latest transaction this version had to follow
    ///
    /// The larger of the predecessor's producer and the predecessor's
    /// highest reader other than `own`.
    pub fn write_prerequisite(&self, own: TxId) -> MvccResult<Producer> {
        let nodes = self.chain.lock();
        let Some(prev) = self.chain.node(&nodes, self.index)?.prev else {
            return Ok(Producer::Snapshot);
        };
        let prev = self.chain.node(&nodes, prev)?;
        let reader = prev
            .readers
            .iter()
            .rev()
            .find(|r| **r != own)
            .map(|r| Producer::Tx(*r))
            .unwrap_or(Producer::Snapshot);
        Ok(prev.producer.max(reader))
    }

    /// Later versions whose producers precede `own`, in chain order
    pub fn successors_before(&self, own: TxId) -> MvccResult<Vec<VersionRef>> {
        let nodes = self.chain.lock();
        let mut out = Vec::new();
        let mut cursor = self.chain.node(&nodes, self.index)?.next;
        while let Some(idx) = cursor {
            let node = self.chain.node(&nodes, idx)?;
            if node.producer >= Producer::Tx(own) {
                break;
            }
            out.push(VersionRef {
                chain: Arc::clone(&self.chain),
                index: idx,
            });
            cursor = node.next;
        }
        Ok(out)
    }

    /// Block until this version is no longer pending
    pub fn wait_resolved(&self) -> MvccResult<Status> {
        let mut nodes = self.chain.lock();
        loop {
            let status = self.chain.node(&nodes, self.index)?.status;
            if status != Status::Pending {
                return Ok(status);
            }
            self.chain.resolved.wait(&mut nodes);
        }
    }

    /// Copy of this version
    pub fn info(&self) -> MvccResult<VersionInfo> {
        let nodes = self.chain.lock();
        Ok(self.chain.node(&nodes, self.index)?.info(self.index))
    }
}

impl PartialEq for VersionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.chain, &other.chain) && self.index == other.index
    }
}

impl Eq for VersionRef {}

impl fmt::Debug for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionRef({}#{})", self.chain.key, self.index)
    }
}
