//! Lock table for transaction isolation.
//!
//! Each object has at most one WRITE holder and, under two-phase locking, a
//! set of READ holders. The WRITE holder is stored as an `Option`, so the
//! exclusive-writer invariant holds structurally.
//!
//! # Compatibility
//!
//! ```text
//!             │ held R (foreign) │ held W (foreign) │
//! ────────────┼──────────────────┼──────────────────┤
//!  request R  │        ✓         │        ✗         │
//!  request W  │  ✓ acquire, wait │        ✗         │
//! ```
//!
//! A WRITE request may take the lock while foreign readers remain; the write
//! itself is applied only once the READ holder set is a subset of the WRITE
//! holder set.
//!
//! Locks are never released individually: a transaction releases everything
//! it holds when it commits or aborts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, TxnId};

/// Lock mode for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read lock (two-phase locking only).
    Read,
    /// Exclusive write lock.
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => write!(f, "R"),
            LockMode::Write => write!(f, "W"),
        }
    }
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    /// Lock was granted.
    Granted,
    /// Transaction already holds the lock.
    AlreadyHeld,
    /// Lock is held by another transaction.
    Waiting,
}

impl LockResult {
    /// Returns true if the lock is held after the attempt.
    pub fn is_success(&self) -> bool {
        matches!(self, LockResult::Granted | LockResult::AlreadyHeld)
    }
}

/// A pending lock request, used to build the wait-for relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    /// Transaction requesting the lock.
    pub txn_id: TxnId,
    /// Requested object.
    pub object: ObjectId,
    /// Requested lock mode.
    pub mode: LockMode,
}

impl LockRequest {
    /// Creates a new lock request.
    pub fn new(txn_id: TxnId, object: ObjectId, mode: LockMode) -> Self {
        Self {
            txn_id,
            object,
            mode,
        }
    }
}

/// Holders of one object's locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockHolders {
    /// The exclusive WRITE holder.
    pub writer: Option<TxnId>,
    /// READ holders.
    pub readers: BTreeSet<TxnId>,
}

impl LockHolders {
    /// Returns true if the object is unlocked or WRITE-locked by `txn_id`.
    pub fn writer_is_free_or(&self, txn_id: TxnId) -> bool {
        self.writer.map_or(true, |w| w == txn_id)
    }

    /// Returns true if every READ holder is also a WRITE holder.
    pub fn readers_covered_by_writer(&self) -> bool {
        self.readers.iter().all(|r| Some(*r) == self.writer)
    }

    /// Returns true if no transaction holds any lock.
    pub fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

/// Statistics about the lock table.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock acquisitions.
    pub acquisitions: AtomicU64,
    /// Total lock releases.
    pub releases: AtomicU64,
    /// Total refused acquisitions.
    pub waits: AtomicU64,
}

impl LockStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful acquisition.
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a release.
    pub fn record_release(&self) {
        self.releases.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a wait.
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// The lock table.
pub struct LockTable {
    /// Lock holders, keyed by object.
    locks: BTreeMap<ObjectId, LockHolders>,
    /// Objects locked by each transaction.
    txn_locks: HashMap<TxnId, HashSet<ObjectId>>,
    /// Statistics.
    stats: LockStats,
}

impl LockTable {
    /// Creates a lock table for the configured objects.
    pub fn new(objects: &[ObjectId]) -> Self {
        Self {
            locks: objects.iter().map(|o| (*o, LockHolders::default())).collect(),
            txn_locks: HashMap::new(),
            stats: LockStats::new(),
        }
    }

    /// Returns the holders of an object's locks.
    pub fn holders(&self, object: ObjectId) -> TesseraResult<&LockHolders> {
        self.locks
            .get(&object)
            .ok_or(TesseraError::UnknownObject { object })
    }

    fn holders_mut(&mut self, object: ObjectId) -> TesseraResult<&mut LockHolders> {
        self.locks
            .get_mut(&object)
            .ok_or(TesseraError::UnknownObject { object })
    }

    /// Returns the WRITE holder of an object.
    pub fn writer(&self, object: ObjectId) -> TesseraResult<Option<TxnId>> {
        Ok(self.holders(object)?.writer)
    }

    /// Tries to take the WRITE lock.
    pub fn try_write(&mut self, txn_id: TxnId, object: ObjectId) -> TesseraResult<LockResult> {
        let holders = self.holders_mut(object)?;
        let result = match holders.writer {
            Some(w) if w == txn_id => LockResult::AlreadyHeld,
            Some(_) => LockResult::Waiting,
            None => {
                holders.writer = Some(txn_id);
                LockResult::Granted
            }
        };
        self.record(txn_id, object, result);
        Ok(result)
    }

    /// Registers a long-duration READ lock.
    ///
    /// Refused while a foreign transaction holds the WRITE lock.
    pub fn try_read(&mut self, txn_id: TxnId, object: ObjectId) -> TesseraResult<LockResult> {
        let holders = self.holders_mut(object)?;
        let result = if !holders.writer_is_free_or(txn_id) {
            LockResult::Waiting
        } else if holders.readers.insert(txn_id) {
            LockResult::Granted
        } else {
            LockResult::AlreadyHeld
        };
        self.record(txn_id, object, result);
        Ok(result)
    }

    fn record(&mut self, txn_id: TxnId, object: ObjectId, result: LockResult) {
        match result {
            LockResult::Granted => {
                self.txn_locks.entry(txn_id).or_default().insert(object);
                self.stats.record_acquisition();
            }
            LockResult::Waiting => self.stats.record_wait(),
            LockResult::AlreadyHeld => {}
        }
    }

    /// Releases every lock held by a transaction.
    pub fn release_all(&mut self, txn_id: TxnId) -> usize {
        let objects = self.txn_locks.remove(&txn_id).unwrap_or_default();
        let mut released = 0;
        for object in objects {
            if let Some(holders) = self.locks.get_mut(&object) {
                if holders.writer == Some(txn_id) {
                    holders.writer = None;
                    released += 1;
                }
                if holders.readers.remove(&txn_id) {
                    released += 1;
                }
            }
        }
        for _ in 0..released {
            self.stats.record_release();
        }
        released
    }

    /// Transactions that `request` waits for.
    ///
    /// A READ waits on the foreign WRITE holder. A WRITE waits on the foreign
    /// WRITE holder and, when `writes_wait_for_readers` is set, on foreign
    /// READ holders too.
    pub fn blockers(
        &self,
        request: &LockRequest,
        writes_wait_for_readers: bool,
    ) -> TesseraResult<BTreeSet<TxnId>> {
        let holders = self.holders(request.object)?;
        let mut blockers: BTreeSet<TxnId> = holders.writer.into_iter().collect();
        if request.mode == LockMode::Write && writes_wait_for_readers {
            blockers.extend(holders.readers.iter().copied());
        }
        blockers.remove(&request.txn_id);
        Ok(blockers)
    }

    /// Returns the number of objects with at least one holder.
    pub fn lock_count(&self) -> usize {
        self.locks.values().filter(|h| !h.is_free()).count()
    }

    /// Returns statistics about the lock table.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("lock_count", &self.lock_count())
            .field("txn_count", &self.txn_locks.len())
            .finish()
    }
}
