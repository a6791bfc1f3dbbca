//! Version chain storage and management.
//!
//! Every object holds an append-only chain of committed versions. A version
//! is the pair `(timestamp, writer)`; payloads are abstracted to the writer
//! identity. Versions are never removed and never mutated once installed.
//!
//! # Version Chain Structure
//!
//! ```text
//! Object o1
//! ┌──────────────────────────────┐
//! │ @0  writer: GENESIS          │  oldest
//! │ @2  writer: T1               │
//! │ @5  writer: T3               │  latest
//! └──────────────────────────────┘
//! ```
//!
//! Within a chain timestamps are strictly increasing in commit order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, Timestamp, TxnId, Value};

/// A single committed version of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Commit timestamp of the writer.
    pub timestamp: Timestamp,
    /// Transaction that produced this version.
    pub writer: TxnId,
}

impl Version {
    /// Creates a new version.
    pub fn new(timestamp: Timestamp, writer: TxnId) -> Self {
        Self { timestamp, writer }
    }

    /// The initial version every object starts with.
    pub fn genesis() -> Self {
        Self::new(Timestamp::ZERO, TxnId::GENESIS)
    }

    /// The abstract value a read of this version observes.
    pub fn value(&self) -> Value {
        Value::Writer(self.writer)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value(), self.timestamp)
    }
}

/// A chain of versions for a single object, oldest first.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// Creates a chain holding only the genesis version.
    pub fn new() -> Self {
        Self {
            versions: vec![Version::genesis()],
        }
    }

    /// Returns the number of versions in the chain.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if the chain is empty. Chains always hold genesis.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Returns the most recent version.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Returns the version with the greatest timestamp `<= read_ts`.
    pub fn visible_at(&self, read_ts: Timestamp) -> Option<&Version> {
        self.versions.iter().rev().find(|v| v.timestamp <= read_ts)
    }

    /// Returns every version committed after `ts`.
    pub fn newer_than(&self, ts: Timestamp) -> impl Iterator<Item = &Version> + '_ {
        self.versions.iter().filter(move |v| v.timestamp > ts)
    }

    /// Returns true if some version was committed after `ts`.
    pub fn has_newer_than(&self, ts: Timestamp) -> bool {
        self.latest().map_or(false, |v| v.timestamp > ts)
    }

    /// Appends a version. Its timestamp must exceed every existing one.
    pub fn append(&mut self, version: Version) -> TesseraResult<()> {
        if let Some(latest) = self.latest() {
            if version.timestamp <= latest.timestamp {
                return Err(TesseraError::internal(format!(
                    "version {} does not follow {}",
                    version, latest
                )));
            }
        }
        self.versions.push(version);
        Ok(())
    }

    /// Returns all versions, oldest first.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }
}

impl Default for VersionChain {
    fn default() -> Self {
        Self::new()
    }
}

/// A store of version chains, one per configured object.
#[derive(Debug, Clone)]
pub struct VersionStore {
    chains: BTreeMap<ObjectId, VersionChain>,
}

impl VersionStore {
    /// Creates a store with a genesis version for each object.
    pub fn new(objects: &[ObjectId]) -> Self {
        Self {
            chains: objects.iter().map(|o| (*o, VersionChain::new())).collect(),
        }
    }

    /// Gets the chain for an object.
    pub fn chain(&self, object: ObjectId) -> TesseraResult<&VersionChain> {
        self.chains
            .get(&object)
            .ok_or(TesseraError::UnknownObject { object })
    }

    /// Reads the version visible to a snapshot taken at `read_ts`.
    pub fn read_at(&self, object: ObjectId, read_ts: Timestamp) -> TesseraResult<Version> {
        self.chain(object)?
            .visible_at(read_ts)
            .copied()
            .ok_or_else(|| TesseraError::internal(format!("{} has no visible version", object)))
    }

    /// Installs a committed version.
    pub fn install(
        &mut self,
        object: ObjectId,
        timestamp: Timestamp,
        writer: TxnId,
    ) -> TesseraResult<()> {
        let chain = self
            .chains
            .get_mut(&object)
            .ok_or(TesseraError::UnknownObject { object })?;
        chain.append(Version::new(timestamp, writer))?;
        tracing::trace!(object = %object, writer = %writer, ts = %timestamp, "version installed");
        Ok(())
    }

    /// Copies every chain.
    pub fn versions(&self) -> BTreeMap<ObjectId, Vec<Version>> {
        self.chains
            .iter()
            .map(|(o, c)| (*o, c.versions().to_vec()))
            .collect()
    }
}
