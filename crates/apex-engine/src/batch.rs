//! Batch input

use apex_primitives::Gas;
use apex_types::{AccessKey, RWSet, TxId};
use std::collections::BTreeSet;
use std::fmt;

/// One transaction of a batch
#[derive(Clone, Debug)]
pub struct BatchTx<T> {
    /// Position in the original order
    pub tid: TxId,
    /// Decoded transaction
    pub tx: T,
    /// Cost estimate
    pub cost: Gas,
    /// Footprint from a dry run
    pub predicted: RWSet,
    /// Footprint known from an earlier real run, if any
    pub authoritative: Option<RWSet>,
}

impl<T> BatchTx<T> {
    /// Union of the predicted and authoritative footprints
    pub fn declared(&self) -> RWSet {
        let mut rw = self.predicted.clone();
        if let Some(authoritative) = &self.authoritative {
            rw.merge(authoritative);
        }
        rw
    }
}

/// Ordered batch with dense tids `0..len`
#[derive(Clone, Debug)]
pub struct Batch<T> {
    txs: Vec<BatchTx<T>>,
}

impl<T> Batch<T> {
    /// Join consecutive batches into one, renumbering tids densely
    ///
    /// Order is preserved: every transaction of `parts[i]` precedes every
    /// transaction of `parts[i + 1]`.
    pub fn concat(parts: impl IntoIterator<Item = Batch<T>>) -> Self {
        let mut txs = Vec::new();
        for part in parts {
            for tx in part.txs {
                txs.push(BatchTx {
                    tid: TxId::from(txs.len()),
                    ..tx
                });
            }
        }
        Batch { txs }
    }

    /// Transaction `tid`
    pub fn get(&self, tid: TxId) -> Option<&BatchTx<T>> {
        self.txs.get(tid.as_usize())
    }

    /// Transactions in order
    pub fn iter(&self) -> impl Iterator<Item = &BatchTx<T>> {
        self.txs.iter()
    }

    /// Every tid, ascending
    pub fn tx_ids(&self) -> Vec<TxId> {
        self.txs.iter().map(|t| t.tid).collect()
    }

    /// `(tid, cost)` pairs for balancing
    pub fn tx_costs(&self) -> Vec<(TxId, Gas)> {
        self.txs.iter().map(|t| (t.tid, t.cost)).collect()
    }

    /// Sum of all costs
    pub fn total_cost(&self) -> Gas {
        self.txs.iter().fold(0, |acc, t| acc.saturating_add(t.cost))
    }

    /// Every key any declared footprint touches
    pub fn prefetch_keys(&self) -> Vec<AccessKey> {
        let keys: BTreeSet<AccessKey> = self
            .txs
            .iter()
            .flat_map(|t| {
                let mut keys: Vec<AccessKey> = t.predicted.keys().keys().collect();
                if let Some(authoritative) = &t.authoritative {
                    keys.extend(authoritative.keys().keys());
                }
                keys
            })
            .collect();
        keys.into_iter().collect()
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// Assembles a [`Batch`], dropping transactions that failed to decode
#[derive(Debug)]
pub struct BatchBuilder<T> {
    txs: Vec<BatchTx<T>>,
    discarded: usize,
}

impl<T> Default for BatchBuilder<T> {
    fn default() -> Self {
        Self {
            txs: Vec::new(),
            discarded: 0,
        }
    }
}

impl<T> BatchBuilder<T> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction; returns its tid, or `None` if it was dropped
    ///
    /// Dropped transactions never receive a tid, so the ones that remain
    /// stay dense.
    pub fn push<E: fmt::Display>(
        &mut self,
        decoded: Result<T, E>,
        cost: Gas,
        predicted: RWSet,
        authoritative: Option<RWSet>,
    ) -> Option<TxId> {
        match decoded {
            Ok(tx) => {
                let tid = TxId::from(self.txs.len());
                self.txs.push(BatchTx {
                    tid,
                    tx,
                    cost,
                    predicted,
                    authoritative,
                });
                Some(tid)
            }
            Err(e) => {
                self.discarded += 1;
                tracing::warn!(position = self.txs.len() + self.discarded - 1, error = %e, "transaction discarded");
                None
            }
        }
    }

    /// Number of transactions dropped so far
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Finish the batch
    pub fn build(self) -> Batch<T> {
        Batch { txs: self.txs }
    }
}
