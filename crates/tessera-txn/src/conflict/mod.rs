//! Rw-antidependency tracking for serializable snapshot isolation.
//!
//! Every SI transaction carries two flags:
//!
//! - `in_conflict`: some concurrent transaction read a version this one
//!   overwrote (an rw-edge points *into* this transaction)
//! - `out_conflict`: this transaction made an SSI read, so an rw-edge may
//!   point *out of* it. Set on every read, whether or not a concurrent
//!   writer of the object is known yet.
//!
//! A transaction with both flags set is the pivot of a dangerous structure
//! and must not commit. Flags only ever go from false to true.
//!
//! The tracker also keeps the SIREAD set of each object: every transaction
//! that read the object under SSI. Entries outlive commit, since a committed
//! reader still constrains writers that overlapped it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tessera_common::types::{ObjectId, TxnId};

/// Conflict flags of one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflictFlags {
    /// An rw-edge points into this transaction.
    pub in_conflict: bool,
    /// An rw-edge points out of this transaction.
    pub out_conflict: bool,
}

impl ConflictFlags {
    /// Returns true if both flags are set.
    pub fn is_pivot(&self) -> bool {
        self.in_conflict && self.out_conflict
    }
}

/// SIREAD sets and conflict flags.
#[derive(Debug, Default)]
pub struct ConflictTracker {
    flags: BTreeMap<TxnId, ConflictFlags>,
    sireads: BTreeMap<ObjectId, BTreeSet<TxnId>>,
}

impl ConflictTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `txn_id` as an SIREAD holder of `object`.
    pub fn register_read(&mut self, txn_id: TxnId, object: ObjectId) {
        self.sireads.entry(object).or_default().insert(txn_id);
    }

    /// SIREAD holders of `object`, excluding `except`.
    pub fn readers_except(&self, object: ObjectId, except: TxnId) -> Vec<TxnId> {
        self.sireads
            .get(&object)
            .map(|readers| readers.iter().copied().filter(|r| *r != except).collect())
            .unwrap_or_default()
    }

    /// Records an rw-edge from `reader` to `writer`.
    pub fn record_edge(&mut self, reader: TxnId, writer: TxnId) {
        self.mark_out(reader);
        self.mark_in(writer);
    }

    /// Sets `in_conflict` on a transaction.
    pub fn mark_in(&mut self, txn_id: TxnId) {
        self.flags.entry(txn_id).or_default().in_conflict = true;
    }

    /// Sets `out_conflict` on a transaction.
    pub fn mark_out(&mut self, txn_id: TxnId) {
        self.flags.entry(txn_id).or_default().out_conflict = true;
    }

    /// Returns the flags of a transaction.
    pub fn flags(&self, txn_id: TxnId) -> ConflictFlags {
        self.flags.get(&txn_id).copied().unwrap_or_default()
    }

    /// Returns true if the transaction is a dangerous-structure pivot.
    pub fn is_pivot(&self, txn_id: TxnId) -> bool {
        self.flags(txn_id).is_pivot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ObjectId = ObjectId::new(1);
    const B: ObjectId = ObjectId::new(2);

    #[test]
    fn test_flags_default_clear() {
        let tracker = ConflictTracker::new();
        let flags = tracker.flags(TxnId::new(1));
        assert!(!flags.in_conflict);
        assert!(!flags.out_conflict);
        assert!(!flags.is_pivot());
    }

    #[test]
    fn test_record_edge() {
        let mut tracker = ConflictTracker::new();
        let (t1, t2, t3) = (TxnId::new(1), TxnId::new(2), TxnId::new(3));

        tracker.record_edge(t1, t2);
        assert!(tracker.flags(t1).out_conflict);
        assert!(tracker.flags(t2).in_conflict);
        assert!(!tracker.is_pivot(t2));

        tracker.record_edge(t2, t3);
        assert!(tracker.is_pivot(t2));
        assert!(!tracker.is_pivot(t1));
    }

    #[test]
    fn test_siread_sets() {
        let mut tracker = ConflictTracker::new();
        let (t1, t2) = (TxnId::new(1), TxnId::new(2));

        tracker.register_read(t1, A);
        tracker.register_read(t2, A);
        tracker.register_read(t1, A);
        tracker.register_read(t1, B);

        assert_eq!(tracker.readers_except(A, t1), vec![t2]);
        assert_eq!(tracker.readers_except(A, TxnId::new(9)), vec![t1, t2]);
        assert!(tracker.readers_except(ObjectId::new(7), t1).is_empty());
        assert_eq!(tracker.readers_except(B, t2), vec![t1]);
    }
}
