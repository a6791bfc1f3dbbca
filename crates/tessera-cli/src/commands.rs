//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tessera_checker::SerializabilityChecker;
use tessera_common::config::EngineConfig;
use tessera_common::error::TesseraError;
use tessera_common::types::{ObjectId, TxnId};
use tessera_txn::{Randomized, RoundRobin, Script, SelectionStrategy, TransactionEngine};

use crate::report::{BatchLine, BatchReport, RunReport};
use crate::scenario::Scenario;

/// How `run` schedules transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyChoice {
    /// The scenario's order, else round-robin.
    Auto,
    /// Round-robin.
    RoundRobin,
    /// Seeded random.
    Random {
        /// Seed.
        seed: u64,
    },
}

/// Runs a scenario file to quiescence and checks its history.
pub fn run_scenario(
    path: &Path,
    strategy: StrategyChoice,
    checker: &SerializabilityChecker,
) -> Result<RunReport> {
    let scenario = Scenario::from_file(path)?;
    tracing::info!(path = %path.display(), protocol = scenario.config().label(), "running scenario");

    let engine = match (strategy, scenario.scripted_strategy()) {
        (StrategyChoice::Auto, Some(scripted)) => scenario.build_engine(scripted)?,
        (StrategyChoice::Auto, None) | (StrategyChoice::RoundRobin, _) => {
            scenario.build_engine(RoundRobin::new())?
        }
        (StrategyChoice::Random { seed }, _) => scenario.build_engine(Randomized::new(seed))?,
    };
    let summary = engine.run_to_quiescence()?;
    RunReport::collect(&engine, summary, checker)
}

/// Parameters of a randomized batch.
#[derive(Debug, Clone)]
pub struct RandomBatch {
    /// Protocol configuration; its transaction and object sets are used.
    pub config: EngineConfig,
    /// Number of runs.
    pub runs: usize,
    /// Seed of the first run; run `i` uses `seed + i`.
    pub seed: u64,
    /// Per-step voluntary abort probability (SI only).
    pub cancel_probability: f64,
}

impl RandomBatch {
    /// Builds a batch configuration.
    pub fn new(mut config: EngineConfig, txns: u64, objects: u32, max_ops: usize) -> Self {
        config.transactions = (1..=txns).map(TxnId::new).collect();
        config.objects = (1..=objects).map(ObjectId::new).collect();
        config.max_ops_per_script = max_ops;
        Self {
            config,
            runs: 1,
            seed: 0,
            cancel_probability: 0.0,
        }
    }
}

/// Creates an engine with random scripts for every configured transaction.
pub fn random_engine<S>(config: &EngineConfig, seed: u64, strategy: S) -> Result<TransactionEngine>
where
    S: SelectionStrategy + 'static,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let engine = TransactionEngine::new(config.clone(), strategy)?;
    for txn in &config.transactions {
        let script = Script::random(&mut rng, &config.objects, config.max_ops_per_script);
        engine.admit(*txn, script)?;
    }
    Ok(engine)
}

/// Runs a randomized batch and checks every history.
///
/// A batch whose transaction count exceeds the checker's bound is rejected
/// before any run, since a run committing every transaction could not be
/// checked.
pub fn run_random(batch: &RandomBatch, checker: &SerializabilityChecker) -> Result<BatchReport> {
    let txns = batch.config.transactions.len();
    if txns > checker.max_committed() {
        return Err(TesseraError::TooManyTransactions {
            committed: txns,
            max: checker.max_committed(),
        })
        .context("raise --max-committed or lower --txns");
    }
    let mut lines = Vec::with_capacity(batch.runs);
    let mut violations = 0;
    for run in 0..batch.runs {
        let seed = batch.seed.wrapping_add(run as u64);
        let strategy = Randomized::new(seed).with_cancel_probability(batch.cancel_probability);
        let engine = random_engine(&batch.config, seed, strategy)?;
        let summary = engine.run_to_quiescence()?;
        let verdict = checker
            .check(&engine.history(), &engine.store_snapshot())
            .with_context(|| format!("checking run {} (seed {})", run, seed))?;

        if batch.config.promises_serializability() && !verdict.is_serializable() {
            tracing::warn!(run, seed, "serializability violated");
            violations += 1;
        }
        lines.push(BatchLine {
            run,
            seed,
            committed: summary.committed.len(),
            aborted: summary.aborted.len(),
            deadlocked: summary.deadlocked.len(),
            serializable: verdict.is_serializable(),
        });
    }
    Ok(BatchReport {
        protocol: batch.config.label(),
        runs: lines,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_batch_ssi_has_no_violations() {
        let config = EngineConfig::serializable(vec![TxnId::new(1)], vec![ObjectId::new(1)]);
        let mut batch = RandomBatch::new(config, 3, 2, 3);
        batch.runs = 20;
        batch.seed = 11;

        let report = run_random(&batch, &SerializabilityChecker::default()).unwrap();
        assert_eq!(report.runs.len(), 20);
        assert_eq!(report.violations, 0);
        assert_eq!(report.protocol, "SSI");
    }

    #[test]
    fn test_random_batch_rejects_uncheckable_size() {
        let config = EngineConfig::serializable(Vec::new(), Vec::new());
        let batch = RandomBatch::new(config, 9, 2, 2);

        let err = run_random(&batch, &SerializabilityChecker::new(8)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TesseraError>(),
            Some(&TesseraError::TooManyTransactions {
                committed: 9,
                max: 8
            })
        );

        let report = run_random(&batch, &SerializabilityChecker::new(9)).unwrap();
        assert_eq!(report.runs.len(), 1);
    }

    #[test]
    fn test_random_engine_is_deterministic() {
        let config = EngineConfig::two_phase_locking(
            (1..=3).map(TxnId::new).collect(),
            vec![ObjectId::new(1), ObjectId::new(2)],
        );
        let a = random_engine(&config, 5, RoundRobin::new()).unwrap();
        let b = random_engine(&config, 5, RoundRobin::new()).unwrap();
        a.run_to_quiescence().unwrap();
        b.run_to_quiescence().unwrap();
        assert_eq!(a.history(), b.history());
    }
}
