//! Abstract values.
//!
//! Payloads are never modelled. Under two-phase locking an object holds a
//! counter that each write increments; under snapshot isolation a value is
//! the identity of the transaction that wrote the version.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TxnId;

/// A value observed by a read or produced by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Value {
    /// Scalar counter of a two-phase-locking object.
    Counter(u64),
    /// Writer identity of a multi-version object.
    Writer(TxnId),
}

impl Value {
    /// Returns the counter, if this is a scalar value.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Value::Counter(n) => Some(*n),
            Value::Writer(_) => None,
        }
    }

    /// Returns the writer identity, if this is a versioned value.
    pub fn as_writer(&self) -> Option<TxnId> {
        match self {
            Value::Writer(txn) => Some(*txn),
            Value::Counter(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Counter(n) => write!(f, "{}", n),
            Value::Writer(txn) if *txn == TxnId::GENESIS => write!(f, "init"),
            Value::Writer(txn) => write!(f, "{}", txn),
        }
    }
}
