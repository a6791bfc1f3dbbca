//! Engine configuration structures.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{TesseraError, TesseraResult};
use crate::types::{ObjectId, TxnId};

/// Default maximum number of operations in one script.
pub const DEFAULT_MAX_OPS_PER_SCRIPT: usize = 4;

/// Concurrency-control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Strict two-phase locking over scalar objects.
    TwoPhaseLocking,
    /// Multi-version snapshot isolation, optionally serializable.
    SnapshotIsolation,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::TwoPhaseLocking => write!(f, "2PL"),
            Protocol::SnapshotIsolation => write!(f, "SI"),
        }
    }
}

/// How long a two-phase-locking read holds its READ lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadLockDuration {
    /// Held until commit.
    #[default]
    Long,
    /// Compatibility is checked at the instant of the read; no lock is kept.
    Short,
}

/// Engine configuration.
///
/// # Example
///
/// ```rust
/// use tessera_common::config::{EngineConfig, Protocol};
/// use tessera_common::types::{ObjectId, TxnId};
///
/// let config = EngineConfig::two_phase_locking(
///     vec![TxnId::new(1)],
///     vec![ObjectId::new(1)],
/// );
/// assert_eq!(config.protocol, Protocol::TwoPhaseLocking);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrency-control protocol.
    pub protocol: Protocol,

    /// Enables SSI conflict checks. Ignored under two-phase locking.
    #[serde(default)]
    pub serialize_mode: bool,

    /// READ lock duration under two-phase locking.
    #[serde(default)]
    pub read_locks: ReadLockDuration,

    /// Finite transaction-identity set.
    pub transactions: Vec<TxnId>,

    /// Finite object set.
    pub objects: Vec<ObjectId>,

    /// Maximum operations per script, excluding the implicit commit.
    #[serde(default = "default_max_ops")]
    pub max_ops_per_script: usize,
}

fn default_max_ops() -> usize {
    DEFAULT_MAX_OPS_PER_SCRIPT
}

impl EngineConfig {
    /// Two-phase locking with long-duration read locks.
    #[must_use]
    pub fn two_phase_locking(transactions: Vec<TxnId>, objects: Vec<ObjectId>) -> Self {
        Self {
            protocol: Protocol::TwoPhaseLocking,
            serialize_mode: false,
            read_locks: ReadLockDuration::Long,
            transactions,
            objects,
            max_ops_per_script: DEFAULT_MAX_OPS_PER_SCRIPT,
        }
    }

    /// Plain snapshot isolation.
    #[must_use]
    pub fn snapshot_isolation(transactions: Vec<TxnId>, objects: Vec<ObjectId>) -> Self {
        Self {
            protocol: Protocol::SnapshotIsolation,
            serialize_mode: false,
            read_locks: ReadLockDuration::Long,
            transactions,
            objects,
            max_ops_per_script: DEFAULT_MAX_OPS_PER_SCRIPT,
        }
    }

    /// Serializable snapshot isolation.
    #[must_use]
    pub fn serializable(transactions: Vec<TxnId>, objects: Vec<ObjectId>) -> Self {
        Self {
            serialize_mode: true,
            ..Self::snapshot_isolation(transactions, objects)
        }
    }

    /// Sets the READ lock duration.
    #[must_use]
    pub fn with_read_locks(mut self, read_locks: ReadLockDuration) -> Self {
        self.read_locks = read_locks;
        self
    }

    /// Sets the maximum operation count per script.
    #[must_use]
    pub fn with_max_ops(mut self, max_ops_per_script: usize) -> Self {
        self.max_ops_per_script = max_ops_per_script;
        self
    }

    /// Returns true if SSI conflict tracking is active.
    #[must_use]
    pub fn is_serializable_si(&self) -> bool {
        self.protocol == Protocol::SnapshotIsolation && self.serialize_mode
    }

    /// Returns true if every committed history must be serializable:
    /// 2PL with long read locks, or SSI.
    #[must_use]
    pub fn promises_serializability(&self) -> bool {
        match self.protocol {
            Protocol::TwoPhaseLocking => self.read_locks == ReadLockDuration::Long,
            Protocol::SnapshotIsolation => self.serialize_mode,
        }
    }

    /// Short human-readable protocol label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match (self.protocol, self.serialize_mode, self.read_locks) {
            (Protocol::TwoPhaseLocking, _, ReadLockDuration::Long) => "2PL",
            (Protocol::TwoPhaseLocking, _, ReadLockDuration::Short) => "2PL (short reads)",
            (Protocol::SnapshotIsolation, true, _) => "SSI",
            (Protocol::SnapshotIsolation, false, _) => "SI",
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TesseraResult<()> {
        if self.transactions.is_empty() {
            return Err(TesseraError::invalid_config(
                "transaction set must not be empty",
            ));
        }
        if self.objects.is_empty() {
            return Err(TesseraError::invalid_config("object set must not be empty"));
        }
        if self.max_ops_per_script == 0 {
            return Err(TesseraError::invalid_config(
                "max_ops_per_script must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for txn in &self.transactions {
            if !txn.is_valid() {
                return Err(TesseraError::invalid_config(
                    "transaction id 0 is reserved for the genesis writer",
                ));
            }
            if !seen.insert(*txn) {
                return Err(TesseraError::invalid_config(format!(
                    "duplicate transaction {}",
                    txn
                )));
            }
        }

        let mut seen = HashSet::new();
        for obj in &self.objects {
            if !seen.insert(*obj) {
                return Err(TesseraError::invalid_config(format!(
                    "duplicate object {}",
                    obj
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txns(n: u64) -> Vec<TxnId> {
        (1..=n).map(TxnId::new).collect()
    }

    fn objs(n: u32) -> Vec<ObjectId> {
        (1..=n).map(ObjectId::new).collect()
    }

    #[test]
    fn test_constructors() {
        let c = EngineConfig::two_phase_locking(txns(2), objs(2));
        assert_eq!(c.protocol, Protocol::TwoPhaseLocking);
        assert!(!c.is_serializable_si());
        assert_eq!(c.label(), "2PL");

        let c = EngineConfig::snapshot_isolation(txns(2), objs(2));
        assert!(!c.is_serializable_si());
        assert_eq!(c.label(), "SI");

        let c = EngineConfig::serializable(txns(2), objs(2));
        assert!(c.is_serializable_si());
        assert_eq!(c.label(), "SSI");
    }

    #[test]
    fn test_promises_serializability() {
        assert!(EngineConfig::two_phase_locking(txns(1), objs(1)).promises_serializability());
        assert!(!EngineConfig::two_phase_locking(txns(1), objs(1))
            .with_read_locks(ReadLockDuration::Short)
            .promises_serializability());
        assert!(EngineConfig::serializable(txns(1), objs(1)).promises_serializability());
        assert!(!EngineConfig::snapshot_isolation(txns(1), objs(1)).promises_serializability());
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::serializable(txns(3), objs(2)).validate().is_ok());
        assert!(EngineConfig::serializable(vec![], objs(2)).validate().is_err());
        assert!(EngineConfig::serializable(txns(2), vec![]).validate().is_err());
        assert!(EngineConfig::serializable(vec![TxnId::GENESIS], objs(1))
            .validate()
            .is_err());
        assert!(EngineConfig::serializable(vec![TxnId::new(1), TxnId::new(1)], objs(1))
            .validate()
            .is_err());
        assert!(EngineConfig::serializable(txns(1), objs(1))
            .with_max_ops(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_toml_roundtrip_defaults() {
        let toml_str = r#"
            protocol = "two-phase-locking"
            read_locks = "short"
            transactions = [1, 2]
            objects = [10]
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.protocol, Protocol::TwoPhaseLocking);
        assert_eq!(config.read_locks, ReadLockDuration::Short);
        assert!(!config.serialize_mode);
        assert_eq!(config.max_ops_per_script, DEFAULT_MAX_OPS_PER_SCRIPT);
        assert_eq!(config.label(), "2PL (short reads)");
    }
}
