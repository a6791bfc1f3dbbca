//! Point-in-time copies of the store.
//!
//! Inspection hands out owned copies so callers never hold the engine's
//! critical section while examining the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_common::types::{ObjectId, TxnId, Value};

use crate::version::Version;

/// Final store contents, by protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreSnapshot {
    /// One counter per object (two-phase locking).
    Scalar(BTreeMap<ObjectId, u64>),
    /// One version chain per object (snapshot isolation).
    Versioned(BTreeMap<ObjectId, Vec<Version>>),
}

impl StoreSnapshot {
    /// Objects present in the store.
    pub fn objects(&self) -> Vec<ObjectId> {
        match self {
            StoreSnapshot::Scalar(cells) => cells.keys().copied().collect(),
            StoreSnapshot::Versioned(chains) => chains.keys().copied().collect(),
        }
    }

    /// The value every object holds before any transaction runs.
    pub fn initial_value(&self) -> Value {
        match self {
            StoreSnapshot::Scalar(_) => Value::Counter(0),
            StoreSnapshot::Versioned(_) => Value::Writer(TxnId::GENESIS),
        }
    }

    /// The current value of an object: its counter, or the writer of its
    /// version with the greatest timestamp.
    pub fn final_value(&self, object: ObjectId) -> Option<Value> {
        match self {
            StoreSnapshot::Scalar(cells) => cells.get(&object).map(|n| Value::Counter(*n)),
            StoreSnapshot::Versioned(chains) => chains
                .get(&object)
                .and_then(|chain| chain.iter().max_by_key(|v| v.timestamp))
                .map(Version::value),
        }
    }

    /// Returns true for a multi-version store.
    pub fn is_versioned(&self) -> bool {
        matches!(self, StoreSnapshot::Versioned(_))
    }
}
