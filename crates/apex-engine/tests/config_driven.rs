//! Engines built from TOML configuration

mod common;

use apex_engine::{Engine, EngineConfig, EngineError, ExecutionMode, Phase};
use apex_scheduler::StrategyKind;
use common::*;
use std::fs;

#[test]
fn test_engine_from_toml() {
    let config = EngineConfig::from_toml_str(
        r#"
        workers = 2
        mode = "partitioned"
        strategies = ["topological"]
        "#,
    )
    .unwrap();
    let engine = Engine::new(config).unwrap();
    assert_eq!(engine.config().mode, ExecutionMode::Partitioned);

    let state = source(3, 100, 0);
    let b = batch(
        &state,
        &[
            (Op::Transfer { from: 1, to: 2, amount: 1 }, 4),
            (Op::Transfer { from: 2, to: 3, amount: 1 }, 4),
            (Op::Transfer { from: 3, to: 1, amount: 1 }, 4),
        ],
    );
    let outcome = engine.execute(&TransferExecutor, state, &b).unwrap();
    assert_eq!(outcome.stats().strategy, Some(StrategyKind::Topological));
    assert_eq!(outcome.stats().plan_cost, 12);
    for id in 1..=3 {
        assert_eq!(outcome.final_writes()[&balance_key(id)], balance(100));
    }
}

#[test]
fn test_config_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("apex-engine-{}.toml", std::process::id()));
    let config = EngineConfig::default()
        .with_workers(6)
        .with_strategies(vec![StrategyKind::Mis]);
    fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_config_refused() {
    let config = EngineConfig::default().with_strategies(Vec::new());
    assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
}

#[test]
fn test_metrics_accumulate_across_batches() {
    let engine = Engine::new(EngineConfig::default().with_workers(2)).unwrap();
    let state = source(0, 0, 0);
    let b = batch(
        &state,
        &[
            (Op::Store { slot: 0, value: 1 }, 10),
            (Op::Increment { slot: 0 }, 10),
        ],
    );

    for _ in 0..3 {
        engine.execute(&TransferExecutor, state.clone(), &b).unwrap();
    }

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.counters["batches"], 3);
    assert_eq!(snapshot.counters["transactions"], 6);
    assert_eq!(snapshot.counters["fallback_transactions"], 3);
    assert_eq!(engine.metrics().phase(Phase::Execute).total_count(), 3);
    assert!(snapshot.to_json().unwrap().contains("speculative_aborts"));
}
