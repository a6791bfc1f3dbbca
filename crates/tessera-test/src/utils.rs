use tessera_checker::{SerializabilityChecker, Verdict};
use tessera_common::config::EngineConfig;
use tessera_common::error::TesseraResult;
use tessera_common::types::{ObjectId, TxnId, Value};
use tessera_txn::{Event, HistoryLog, Operation, Script, SelectionStrategy, TransactionEngine};

/// `T1..=Tn`.
pub fn txn_ids(n: u64) -> Vec<TxnId> {
    (1..=n).map(TxnId::new).collect()
}

/// `o1..=on`.
pub fn object_ids(n: u32) -> Vec<ObjectId> {
    (1..=n).map(ObjectId::new).collect()
}

/// Builds an engine and admits `scripts[i]` as `T{i+1}`.
pub fn engine_with<S>(
    config: EngineConfig,
    strategy: S,
    scripts: &[&[Operation]],
) -> TesseraResult<TransactionEngine>
where
    S: SelectionStrategy + 'static,
{
    let engine = TransactionEngine::new(config, strategy)?;
    for (i, ops) in scripts.iter().enumerate() {
        engine.admit(TxnId::new(i as u64 + 1), Script::new(ops.to_vec()))?;
    }
    Ok(engine)
}

/// Values observed by a transaction's reads, in order.
pub fn reads_of(history: &HistoryLog, txn_id: TxnId) -> Vec<Value> {
    history
        .for_txn(txn_id)
        .filter_map(|e| match e.event {
            Event::Read { value, .. } => Some(value),
            _ => None,
        })
        .collect()
}

/// Runs the oracle over the engine's history and store.
pub fn verdict(engine: &TransactionEngine) -> TesseraResult<Verdict> {
    SerializabilityChecker::default().check(&engine.history(), &engine.store_snapshot())
}
