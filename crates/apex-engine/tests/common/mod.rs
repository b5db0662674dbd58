//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use apex_engine::{init_tracing, Batch, BatchBuilder, Engine, ExecStatus, Executor};
use apex_mvcc::{InMemorySource, SnapshotState, StateSource, StateView};
use apex_primitives::{Address, Gas, H256, U256};
use apex_types::{AccessKey, StateValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Contract whose storage the slot ops touch
pub const CONTRACT: u64 = 0xC0;

/// Toy transaction set
#[derive(Clone, Debug)]
pub enum Op {
    /// Move `amount` between accounts; reverts when `from` is short
    Transfer { from: u64, to: u64, amount: u64 },
    /// Overwrite a balance without reading it
    SetBalance { account: u64, value: u64 },
    /// Copy one balance onto another
    CopyBalance { from: u64, to: u64 },
    /// Blind write to a contract slot
    Store { slot: u64, value: u64 },
    /// Read-modify-write of a contract slot
    Increment { slot: u64 },
}

pub struct TransferExecutor;

impl Executor for TransferExecutor {
    type Tx = Op;

    fn execute(&self, tx: &Op, state: &mut dyn StateView) -> ExecStatus {
        match *tx {
            Op::Transfer { from, to, amount } => {
                let amount = U256::from(amount);
                if !state.sub_balance(addr(from), amount) {
                    return ExecStatus::Reverted;
                }
                state.add_balance(addr(to), amount);
            }
            Op::SetBalance { account, value } => state.set_balance(addr(account), U256::from(value)),
            Op::CopyBalance { from, to } => {
                let value = state.balance(&addr(from));
                state.set_balance(addr(to), value);
            }
            Op::Store { slot, value } => {
                state.set_storage(addr(CONTRACT), H256::from_low_u64(slot), U256::from(value))
            }
            Op::Increment { slot } => {
                let slot = H256::from_low_u64(slot);
                let value = state.storage(&addr(CONTRACT), slot);
                state.set_storage(addr(CONTRACT), slot, value + U256::one());
            }
        }
        ExecStatus::Success
    }
}

pub fn addr(id: u64) -> Address {
    Address::from_low_u64(id)
}

pub fn balance_key(id: u64) -> AccessKey {
    AccessKey::balance(addr(id))
}

pub fn slot_key(slot: u64) -> AccessKey {
    AccessKey::storage(addr(CONTRACT), H256::from_low_u64(slot))
}

pub fn balance(value: u64) -> StateValue {
    StateValue::Balance(U256::from(value))
}

pub fn storage(value: u64) -> StateValue {
    StateValue::Storage(U256::from(value))
}

/// `accounts` funded accounts numbered from 1, slot 0 holding `slot0`
pub fn source(accounts: u64, funds: u64, slot0: u64) -> Arc<dyn StateSource> {
    let mut state = InMemorySource::new();
    for id in 1..=accounts {
        state = state.with_account(addr(id), U256::from(funds));
    }
    state = state.with_storage(addr(CONTRACT), H256::from_low_u64(0), U256::from(slot0));
    Arc::new(state)
}

/// Batch with footprints predicted against `source`
pub fn batch(source: &Arc<dyn StateSource>, ops: &[(Op, Gas)]) -> Batch<Op> {
    init_tracing("warn");
    let snapshot = SnapshotState::new(Arc::clone(source));
    let txs: Vec<Op> = ops.iter().map(|(op, _)| op.clone()).collect();
    let predicted = Engine::predict(&TransferExecutor, &snapshot, &txs);

    let mut builder = BatchBuilder::new();
    for ((op, cost), rw_set) in ops.iter().zip(predicted) {
        builder.push(Ok::<_, String>(op.clone()), *cost, rw_set, None);
    }
    builder.build()
}

/// Seeded mix of transfers and slot increments over `accounts` accounts
pub fn random_workload(n: usize, accounts: u64, seed: u64) -> Vec<(Op, Gas)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let op = if rng.gen_bool(0.8) {
                Op::Transfer {
                    from: rng.gen_range(1..=accounts),
                    to: rng.gen_range(1..=accounts),
                    amount: rng.gen_range(1..100),
                }
            } else {
                Op::Increment {
                    slot: rng.gen_range(0..4),
                }
            };
            (op, rng.gen_range(21_000..60_000))
        })
        .collect()
}
