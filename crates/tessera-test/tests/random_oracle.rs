//! Seeded random workloads checked against the serializability oracle.
//!
//! Every protocol variant that promises serializability must produce only
//! serializable histories. Every variant must keep terminal states final
//! and reach quiescence.

use tessera_cli::random_engine;
use tessera_common::config::{EngineConfig, Protocol, ReadLockDuration};
use tessera_test::utils::{object_ids, txn_ids, verdict};
use tessera_test::workload::{run_seeded, terminal_is_final};
use tessera_txn::{Randomized, TxnOutcome};

const RUNS: u64 = 60;

fn configs() -> Vec<EngineConfig> {
    vec![
        EngineConfig::two_phase_locking(txn_ids(3), object_ids(2)).with_max_ops(3),
        EngineConfig::two_phase_locking(txn_ids(3), object_ids(2))
            .with_read_locks(ReadLockDuration::Short)
            .with_max_ops(3),
        EngineConfig::snapshot_isolation(txn_ids(3), object_ids(2)).with_max_ops(3),
        EngineConfig::serializable(txn_ids(3), object_ids(2)).with_max_ops(3),
    ]
}

/// Long-lock 2PL and SSI never commit a non-serializable history.
#[test]
fn test_serializable_protocols_pass_oracle() {
    for config in configs().into_iter().filter(|c| c.promises_serializability()) {
        for seed in 0..RUNS {
            let (engine, summary) = run_seeded(&config, seed).unwrap();
            if summary.committed.is_empty() {
                continue;
            }
            let verdict = verdict(&engine).unwrap();
            assert!(
                verdict.is_serializable(),
                "{} seed {} produced a non-serializable history:\n{}",
                config.label(),
                seed,
                engine.history()
            );
        }
    }
}

/// No transaction acts after its commit or abort.
#[test]
fn test_terminal_states_are_final() {
    for config in configs() {
        for seed in 0..RUNS {
            let (engine, _) = run_seeded(&config, seed).unwrap();
            assert!(
                terminal_is_final(&engine.history()),
                "{} seed {}",
                config.label(),
                seed
            );
        }
    }
}

/// SI runs always finish with every transaction committed or aborted.
#[test]
fn test_snapshot_runs_complete() {
    for config in configs()
        .into_iter()
        .filter(|c| c.protocol == Protocol::SnapshotIsolation)
    {
        for seed in 0..RUNS {
            let (engine, summary) = run_seeded(&config, seed).unwrap();
            assert!(summary.is_complete(), "{} seed {}", config.label(), seed);
            assert_eq!(
                summary.committed.len() + summary.aborted.len(),
                config.transactions.len()
            );
            for txn in &config.transactions {
                assert!(engine.outcome(*txn).unwrap().is_terminal());
            }
        }
    }
}

/// 2PL transactions never abort; each one commits or is stuck behind a
/// deadlock.
#[test]
fn test_two_phase_runs_commit_or_deadlock() {
    for config in configs()
        .into_iter()
        .filter(|c| c.protocol == Protocol::TwoPhaseLocking)
    {
        for seed in 0..RUNS {
            let (engine, summary) = run_seeded(&config, seed).unwrap();
            assert!(summary.aborted.is_empty());
            if !summary.deadlocked.is_empty() {
                assert!(summary.deadlocked.len() >= 2);
            }
            for txn in &config.transactions {
                let outcome = engine.outcome(*txn).unwrap();
                assert!(
                    matches!(
                        outcome,
                        TxnOutcome::Committed | TxnOutcome::Deadlocked | TxnOutcome::Blocked
                    ),
                    "{} seed {}: {} ended {}",
                    config.label(),
                    seed,
                    txn,
                    outcome
                );
            }
        }
    }
}

/// Voluntary aborts never break SSI's guarantee.
#[test]
fn test_ssi_with_cancellations() {
    let config = EngineConfig::serializable(txn_ids(4), object_ids(2)).with_max_ops(3);
    for seed in 0..RUNS {
        let strategy = Randomized::new(seed).with_cancel_probability(0.1);
        let engine = random_engine(&config, seed, strategy).unwrap();
        let summary = engine.run_to_quiescence().unwrap();

        assert!(summary.is_complete());
        assert!(terminal_is_final(&engine.history()));
        if !summary.committed.is_empty() {
            assert!(verdict(&engine).unwrap().is_serializable(), "seed {}", seed);
        }
    }
}

/// Replaying a seed reproduces the same history.
#[test]
fn test_seeded_runs_are_deterministic() {
    let config = EngineConfig::serializable(txn_ids(3), object_ids(2));
    let (first, _) = run_seeded(&config, 42).unwrap();
    let (second, _) = run_seeded(&config, 42).unwrap();
    assert_eq!(first.history(), second.history());
}
