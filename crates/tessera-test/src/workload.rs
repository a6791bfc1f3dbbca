use std::collections::HashSet;

use anyhow::Result;
use tessera_cli::random_engine;
use tessera_common::config::EngineConfig;
use tessera_txn::{HistoryLog, Randomized, RunSummary, TransactionEngine};

/// Runs random scripts under a random schedule. The same seed always
/// produces the same run.
pub fn run_seeded(config: &EngineConfig, seed: u64) -> Result<(TransactionEngine, RunSummary)> {
    let engine = random_engine(config, seed, Randomized::new(seed))?;
    let summary = engine.run_to_quiescence()?;
    Ok((engine, summary))
}

/// Returns true if no transaction has an entry after its commit or abort,
/// and none terminates twice.
pub fn terminal_is_final(history: &HistoryLog) -> bool {
    let mut ended = HashSet::new();
    for entry in history.entries() {
        if ended.contains(&entry.txn_id) {
            return false;
        }
        if entry.event.is_terminal() {
            ended.insert(entry.txn_id);
        }
    }
    true
}
