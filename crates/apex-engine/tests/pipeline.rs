//! Multi-batch streams, merged batches and the OCC baseline

mod common;

use apex_engine::{Batch, Engine, EngineConfig, EngineError, ExecutionMode, TxStatus};
use apex_mvcc::StateSource;
use apex_primitives::Gas;
use apex_types::{AccessKey, StateValue};
use common::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn engine(mode: ExecutionMode) -> Engine {
    Engine::new(EngineConfig::default().with_workers(4).with_mode(mode)).unwrap()
}

/// Order-sensitive blocks: later blocks read what earlier ones wrote
fn blocks() -> Vec<Vec<(Op, Gas)>> {
    vec![
        vec![
            (Op::SetBalance { account: 1, value: 40 }, 10),
            (Op::Transfer { from: 1, to: 2, amount: 15 }, 10),
            (Op::Increment { slot: 0 }, 5),
        ],
        vec![
            (Op::CopyBalance { from: 2, to: 3 }, 10),
            (Op::Transfer { from: 3, to: 4, amount: 20 }, 10),
            (Op::Store { slot: 1, value: 9 }, 5),
        ],
        vec![
            (Op::Transfer { from: 4, to: 1, amount: 200 }, 10),
            (Op::CopyBalance { from: 4, to: 5 }, 10),
            (Op::Increment { slot: 0 }, 5),
        ],
    ]
}

fn batches(state: &Arc<dyn StateSource>, blocks: &[Vec<(Op, Gas)>]) -> Vec<Batch<Op>> {
    blocks.iter().map(|ops| batch(state, ops)).collect()
}

/// Fold per-batch writes into one final state
fn folded<'a>(
    writes: impl IntoIterator<Item = &'a BTreeMap<AccessKey, StateValue>>,
) -> BTreeMap<AccessKey, StateValue> {
    let mut all = BTreeMap::new();
    for batch_writes in writes {
        all.extend(batch_writes.iter().map(|(k, v)| (*k, v.clone())));
    }
    all
}

#[test]
fn test_partitioned_stream_matches_sequential() {
    let state = source(5, 100, 3);
    let parts = batches(&state, &blocks());
    let whole = Batch::concat(parts.clone());
    let sequential = Engine::replay_sequential(&TransferExecutor, state.clone(), &whole);

    let outcomes = engine(ExecutionMode::Partitioned)
        .execute_stream(&TransferExecutor, state, &parts)
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(folded(outcomes.iter().map(|o| o.final_writes())), sequential.writes);

    assert_eq!(sequential.writes[&balance_key(3)], balance(95));
    // The third block's transfer is short and reverts
    assert_eq!(sequential.writes[&balance_key(5)], balance(120));
    assert!(!outcomes[2].reports()[0].exec.is_success());
    assert_eq!(sequential.writes[&slot_key(0)], storage(5));
}

#[test]
fn test_speculative_stream_of_commutative_blocks() {
    let state = source(20, 1_000_000, 0);
    let parts: Vec<Batch<Op>> = (0..4)
        .map(|seed| batch(&state, &random_workload(60, 20, seed)))
        .collect();
    let whole = Batch::concat(parts.clone());
    let sequential = Engine::replay_sequential(&TransferExecutor, state.clone(), &whole);

    let outcomes = engine(ExecutionMode::Speculative)
        .execute_stream(&TransferExecutor, state, &parts)
        .unwrap();
    assert_eq!(folded(outcomes.iter().map(|o| o.final_writes())), sequential.writes);
}

#[test]
fn test_later_batch_reads_earlier_writes() {
    let state = source(2, 10, 0);
    let parts = batches(
        &state,
        &[
            vec![(Op::SetBalance { account: 1, value: 500 }, 1)],
            vec![(Op::Transfer { from: 1, to: 2, amount: 300 }, 1)],
        ],
    );

    let outcomes = engine(ExecutionMode::Speculative)
        .execute_stream(&TransferExecutor, state, &parts)
        .unwrap();
    // Predicted against the initial balance the transfer would revert
    let second = &outcomes[1];
    assert!(second.reports()[0].exec.is_success());
    assert_eq!(second.final_writes()[&balance_key(1)], balance(200));
    assert_eq!(second.final_writes()[&balance_key(2)], balance(310));
}

#[test]
fn test_stream_records_every_batch() {
    let state = source(5, 100, 0);
    let parts = batches(&state, &blocks());
    let engine = engine(ExecutionMode::Partitioned);
    engine.execute_stream(&TransferExecutor, state, &parts).unwrap();
    assert_eq!(engine.metrics().snapshot().counters["batches"], 3);
    assert_eq!(engine.metrics().snapshot().counters["transactions"], 9);
}

#[test]
fn test_empty_stream() {
    let outcomes = engine(ExecutionMode::Speculative)
        .execute_stream(&TransferExecutor, source(1, 1, 0), &[])
        .unwrap();
    assert!(outcomes.is_empty());
}

#[test]
fn test_merged_blocks_match_stream() {
    let state = source(5, 100, 3);
    let parts = batches(&state, &blocks());
    let whole = Batch::concat(parts.clone());
    assert_eq!(whole.len(), 9);

    let engine = engine(ExecutionMode::Partitioned);
    let merged = engine.execute(&TransferExecutor, state.clone(), &whole).unwrap();
    let streamed = engine.execute_stream(&TransferExecutor, state, &parts).unwrap();
    assert_eq!(
        merged.final_writes(),
        &folded(streamed.iter().map(|o| o.final_writes()))
    );
    assert_eq!(merged.reports().len(), 9);
}

#[test]
fn test_plan_must_match_batch() {
    let state = source(3, 100, 0);
    let engine = engine(ExecutionMode::Speculative);
    let small = batch(&state, &[(Op::Increment { slot: 0 }, 1)]);
    let large = batch(
        &state,
        &[(Op::Increment { slot: 0 }, 1), (Op::Increment { slot: 1 }, 1)],
    );

    let plan = engine.plan(&small).unwrap();
    assert_eq!(plan.mode(), ExecutionMode::Speculative);
    assert_eq!(plan.len(), 1);
    let err = engine
        .execute_planned(&TransferExecutor, state, &large, plan)
        .unwrap_err();
    assert!(matches!(err, EngineError::PlanMismatch { planned: 1, actual: 2 }));
}

#[test]
fn test_occ_commits_everything() {
    let state = source(4, 1_000_000, 0);
    let b = batch(&state, &random_workload(120, 4, 11));
    let outcome = engine(ExecutionMode::Occ)
        .execute(&TransferExecutor, state.clone(), &b)
        .unwrap();
    let sequential = Engine::replay_sequential(&TransferExecutor, state, &b);

    let stats = outcome.stats();
    assert_eq!(stats.mode, ExecutionMode::Occ);
    assert!(stats.rounds >= 1);
    assert!(stats.aborted_after_validation > 0, "four hot accounts must collide");
    assert!(outcome.reports().iter().all(|r| r.status == TxStatus::Committed));
    assert_eq!(outcome.reports().len(), 120);
    // Transfers and increments commute while nobody runs dry
    assert_eq!(outcome.final_writes(), &sequential.writes);
}

#[test]
fn test_occ_orders_by_commit() {
    // T1 read account 1 before T0 overwrote it and commits in round two,
    // after T2 copied the untouched account 2.
    let state = source(3, 100, 0);
    let ops = [
        (Op::SetBalance { account: 1, value: 5 }, 1),
        (Op::CopyBalance { from: 1, to: 2 }, 1),
        (Op::CopyBalance { from: 2, to: 3 }, 1),
    ];
    let b = batch(&state, &ops);
    let outcome = engine(ExecutionMode::Occ)
        .execute(&TransferExecutor, state.clone(), &b)
        .unwrap();
    assert_eq!(outcome.stats().rounds, 2);
    assert_eq!(outcome.stats().aborted_after_validation, 1);

    let reordered = batch(&state, &[ops[0].clone(), ops[2].clone(), ops[1].clone()]);
    let replay = Engine::replay_sequential(&TransferExecutor, state, &reordered);
    assert_eq!(outcome.final_writes(), &replay.writes);
    assert_eq!(outcome.final_writes()[&balance_key(3)], balance(100));
}
