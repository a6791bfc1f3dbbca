//! Scenario files.
//!
//! A scenario fixes the protocol, the objects, each transaction's script,
//! and optionally the interleaving to replay:
//!
//! ```toml
//! protocol = "snapshot-isolation"
//! serialize_mode = true
//! objects = [1, 2]
//! order = [1, 2, 1, 2]
//!
//! [[txn]]
//! id = 1
//! ops = [{ read = 1 }, { write = 2 }]
//!
//! [[txn]]
//! id = 2
//! ops = [{ read = 2 }, { write = 1 }]
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tessera_common::config::{EngineConfig, Protocol, ReadLockDuration, DEFAULT_MAX_OPS_PER_SCRIPT};
use tessera_common::types::{ObjectId, TxnId};
use tessera_txn::{Script, Scripted, SelectionStrategy, TransactionEngine};

/// One transaction of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioTxn {
    /// Transaction identity.
    pub id: TxnId,
    /// Its script; an empty script only commits.
    #[serde(default)]
    pub ops: Script,
}

/// A scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Concurrency-control protocol.
    pub protocol: Protocol,

    /// SSI conflict checks (snapshot isolation only).
    #[serde(default)]
    pub serialize_mode: bool,

    /// READ lock duration (two-phase locking only).
    #[serde(default)]
    pub read_locks: ReadLockDuration,

    /// Objects.
    pub objects: Vec<ObjectId>,

    /// Interleaving to replay, one transaction id per step.
    #[serde(default)]
    pub order: Vec<TxnId>,

    /// Preferred deadlock victims.
    #[serde(default)]
    pub victims: Vec<TxnId>,

    /// Transactions.
    #[serde(default, rename = "txn")]
    pub txns: Vec<ScenarioTxn>,
}

impl Scenario {
    /// Loads a scenario from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Parses a scenario from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(content)?;
        if scenario.txns.is_empty() {
            bail!("scenario has no transactions");
        }
        Ok(scenario)
    }

    /// Engine configuration for this scenario.
    pub fn config(&self) -> EngineConfig {
        let longest = self.txns.iter().map(|t| t.ops.len()).max().unwrap_or(0);
        EngineConfig {
            protocol: self.protocol,
            serialize_mode: self.serialize_mode,
            read_locks: self.read_locks,
            transactions: self.txns.iter().map(|t| t.id).collect(),
            objects: self.objects.clone(),
            max_ops_per_script: longest.max(DEFAULT_MAX_OPS_PER_SCRIPT),
        }
    }

    /// Strategy replaying the scenario's order, if it has one.
    pub fn scripted_strategy(&self) -> Option<Scripted> {
        if self.order.is_empty() {
            return None;
        }
        Some(Scripted::new(self.order.iter().copied()).with_victims(self.victims.iter().copied()))
    }

    /// Creates an engine with every transaction admitted.
    pub fn build_engine<S>(&self, strategy: S) -> Result<TransactionEngine>
    where
        S: SelectionStrategy + 'static,
    {
        let engine = TransactionEngine::new(self.config(), strategy)?;
        for txn in &self.txns {
            engine
                .admit(txn.id, txn.ops.clone())
                .with_context(|| format!("admitting {}", txn.id))?;
        }
        Ok(engine)
    }
}
