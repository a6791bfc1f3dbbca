//! Permutation-based serializability oracle.
//!
//! A history is accepted when some order of its committed transactions,
//! replayed one after another from the initial store, reproduces every
//! recorded read. Two tests share the search:
//!
//! - **conflict** (scalar stores, 2PL): reads must match
//! - **view** (versioned stores, SI/SSI): reads must match, and the final
//!   replay state must equal the writer of each object's newest version
//!
//! The search extends a prefix one transaction at a time and abandons it as
//! soon as a replayed read disagrees, so it visits every permutation only in
//! the worst case. It is still factorial, hence the bound on committed
//! transactions.

use serde::Serialize;
use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::TxnId;
use tessera_mvcc::StoreSnapshot;
use tessera_txn::HistoryLog;

use crate::replay::{ReplayState, SubHistory};

/// Default bound on committed transactions.
pub const DEFAULT_MAX_COMMITTED: usize = 8;

/// Which equivalence the oracle tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    /// Reads only.
    Conflict,
    /// Reads and final versions.
    View,
}

impl CheckMode {
    /// The mode a store calls for.
    pub fn for_store(store: &StoreSnapshot) -> Self {
        if store.is_versioned() {
            CheckMode::View
        } else {
            CheckMode::Conflict
        }
    }
}

/// The oracle's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum Verdict {
    /// `order` is a serial order equivalent to the history.
    Serializable {
        /// Witness order.
        order: Vec<TxnId>,
    },
    /// No serial order of `committed` is equivalent to the history.
    NotSerializable {
        /// Committed transactions, in commit order.
        committed: Vec<TxnId>,
    },
}

impl Verdict {
    /// Returns true for a serializable history.
    pub fn is_serializable(&self) -> bool {
        matches!(self, Verdict::Serializable { .. })
    }

    /// Returns the witness order, if any.
    pub fn order(&self) -> Option<&[TxnId]> {
        match self {
            Verdict::Serializable { order } => Some(order),
            Verdict::NotSerializable { .. } => None,
        }
    }
}

/// Offline serializability checker.
#[derive(Debug, Clone, Copy)]
pub struct SerializabilityChecker {
    max_committed: usize,
}

impl Default for SerializabilityChecker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMMITTED)
    }
}

impl SerializabilityChecker {
    /// Creates a checker accepting at most `max_committed` committed transactions.
    pub fn new(max_committed: usize) -> Self {
        Self { max_committed }
    }

    /// Returns the bound on committed transactions.
    pub fn max_committed(&self) -> usize {
        self.max_committed
    }

    /// Checks a history with the test its store calls for.
    pub fn check(&self, history: &HistoryLog, store: &StoreSnapshot) -> TesseraResult<Verdict> {
        self.check_with(CheckMode::for_store(store), history, store)
    }

    /// Conflict test: some serial order reproduces every read.
    pub fn check_conflict(
        &self,
        history: &HistoryLog,
        store: &StoreSnapshot,
    ) -> TesseraResult<Verdict> {
        self.check_with(CheckMode::Conflict, history, store)
    }

    /// View test: some serial order reproduces every read and the final store.
    pub fn check_view(&self, history: &HistoryLog, store: &StoreSnapshot) -> TesseraResult<Verdict> {
        self.check_with(CheckMode::View, history, store)
    }

    fn check_with(
        &self,
        mode: CheckMode,
        history: &HistoryLog,
        store: &StoreSnapshot,
    ) -> TesseraResult<Verdict> {
        if mode == CheckMode::View && !store.is_versioned() {
            return Err(TesseraError::StoreMismatch {
                message: "view test needs a versioned store".to_string(),
            });
        }

        let subs = SubHistory::committed(history);
        if subs.len() > self.max_committed {
            return Err(TesseraError::TooManyTransactions {
                committed: subs.len(),
                max: self.max_committed,
            });
        }
        for sub in &subs {
            sub.check_kind(store)?;
        }

        let mut search = Search {
            subs: &subs,
            store,
            mode,
            used: vec![false; subs.len()],
            order: Vec::with_capacity(subs.len()),
            explored: 0,
        };
        let found = search.extend(&ReplayState::initial(store));
        tracing::debug!(mode = ?mode, committed = subs.len(), explored = search.explored, found, "oracle finished");

        if found {
            let order = search.order.iter().map(|i| subs[*i].txn_id).collect();
            Ok(Verdict::Serializable { order })
        } else {
            let committed: Vec<TxnId> = subs.iter().map(|s| s.txn_id).collect();
            tracing::warn!(committed = ?committed, "history is not serializable");
            Ok(Verdict::NotSerializable { committed })
        }
    }
}

/// Depth-first search over serial orders.
struct Search<'a> {
    subs: &'a [SubHistory],
    store: &'a StoreSnapshot,
    mode: CheckMode,
    used: Vec<bool>,
    /// Indices into `subs` of the current prefix.
    order: Vec<usize>,
    /// Prefixes replayed.
    explored: u64,
}

impl Search<'_> {
    fn extend(&mut self, state: &ReplayState) -> bool {
        if self.order.len() == self.subs.len() {
            return self.mode == CheckMode::Conflict || state.matches_final(self.store);
        }
        for i in 0..self.subs.len() {
            if self.used[i] {
                continue;
            }
            self.explored += 1;
            let mut next = state.clone();
            if !next.apply(&self.subs[i]) {
                continue;
            }
            self.used[i] = true;
            self.order.push(i);
            if self.extend(&next) {
                return true;
            }
            self.order.pop();
            self.used[i] = false;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::types::{ObjectId, Timestamp, Value};
    use tessera_mvcc::Version;
    use tessera_txn::Event;

    const A: ObjectId = ObjectId::new(1);
    const B: ObjectId = ObjectId::new(2);

    fn t(n: u64) -> TxnId {
        TxnId::new(n)
    }

    fn read(log: &mut HistoryLog, txn: u64, object: ObjectId, value: Value) {
        log.append(t(txn), Event::Read { object, value });
    }

    fn write(log: &mut HistoryLog, txn: u64, object: ObjectId, value: Value) {
        log.append(t(txn), Event::Write { object, value });
    }

    fn commit(log: &mut HistoryLog, txn: u64) {
        log.append(t(txn), Event::Commit { commit_ts: None });
    }

    fn scalar(a: u64, b: u64) -> StoreSnapshot {
        StoreSnapshot::Scalar([(A, a), (B, b)].into_iter().collect())
    }

    fn versioned(a: &[(u64, u64)], b: &[(u64, u64)]) -> StoreSnapshot {
        let chain = |vs: &[(u64, u64)]| {
            std::iter::once(Version::genesis())
                .chain(vs.iter().map(|(ts, w)| Version::new(Timestamp::new(*ts), t(*w))))
                .collect::<Vec<_>>()
        };
        StoreSnapshot::Versioned([(A, chain(a)), (B, chain(b))].into_iter().collect())
    }

    #[test]
    fn test_empty_history_serializable() {
        let verdict = SerializabilityChecker::default()
            .check(&HistoryLog::new(), &scalar(0, 0))
            .unwrap();
        assert_eq!(verdict, Verdict::Serializable { order: vec![] });
    }

    #[test]
    fn test_conflict_finds_non_commit_order() {
        // T2 commits first but read the value T1 wrote.
        let mut log = HistoryLog::new();
        write(&mut log, 1, A, Value::Counter(1));
        read(&mut log, 2, A, Value::Counter(1));
        commit(&mut log, 2);
        commit(&mut log, 1);

        let verdict = SerializabilityChecker::default().check(&log, &scalar(1, 0)).unwrap();
        assert_eq!(verdict.order(), Some(&[t(1), t(2)][..]));
    }

    #[test]
    fn test_conflict_rejects_lost_read() {
        let mut log = HistoryLog::new();
        read(&mut log, 1, A, Value::Counter(0));
        write(&mut log, 2, A, Value::Counter(1));
        write(&mut log, 2, B, Value::Counter(1));
        commit(&mut log, 2);
        read(&mut log, 1, B, Value::Counter(1));
        commit(&mut log, 1);

        let verdict = SerializabilityChecker::default().check(&log, &scalar(1, 1)).unwrap();
        assert_eq!(verdict, Verdict::NotSerializable { committed: vec![t(2), t(1)] });
    }

    #[test]
    fn test_view_requires_final_writer() {
        // Blind writes of A by T1 then T2; reads alone accept either order.
        let mut log = HistoryLog::new();
        write(&mut log, 1, A, Value::Writer(t(1)));
        commit(&mut log, 1);
        write(&mut log, 2, A, Value::Writer(t(2)));
        commit(&mut log, 2);

        let checker = SerializabilityChecker::default();
        let store = versioned(&[(1, 1), (2, 2)], &[]);
        assert_eq!(checker.check(&log, &store).unwrap().order(), Some(&[t(1), t(2)][..]));

        let reversed = versioned(&[(1, 2), (2, 1)], &[]);
        assert_eq!(checker.check(&log, &reversed).unwrap().order(), Some(&[t(2), t(1)][..]));
    }

    #[test]
    fn test_view_rejects_write_skew() {
        let mut log = HistoryLog::new();
        let init = Value::Writer(TxnId::GENESIS);
        for txn in [1, 2] {
            read(&mut log, txn, A, init);
            read(&mut log, txn, B, init);
        }
        write(&mut log, 1, A, Value::Writer(t(1)));
        write(&mut log, 2, B, Value::Writer(t(2)));
        commit(&mut log, 1);
        commit(&mut log, 2);

        let verdict = SerializabilityChecker::default()
            .check(&log, &versioned(&[(1, 1)], &[(2, 2)]))
            .unwrap();
        assert!(!verdict.is_serializable());
    }

    #[test]
    fn test_bound_and_mismatch_errors() {
        let mut log = HistoryLog::new();
        for txn in 1..=3 {
            commit(&mut log, txn);
        }
        assert_eq!(
            SerializabilityChecker::new(2).check(&log, &scalar(0, 0)),
            Err(TesseraError::TooManyTransactions { committed: 3, max: 2 })
        );
        assert!(matches!(
            SerializabilityChecker::default().check_view(&log, &scalar(0, 0)),
            Err(TesseraError::StoreMismatch { .. })
        ));

        let mut mixed = HistoryLog::new();
        write(&mut mixed, 1, A, Value::Counter(1));
        commit(&mut mixed, 1);
        assert!(matches!(
            SerializabilityChecker::default().check(&mixed, &versioned(&[], &[])),
            Err(TesseraError::StoreMismatch { .. })
        ));
    }

    #[test]
    fn test_verdict_json() {
        let json = serde_json::to_value(Verdict::Serializable { order: vec![t(2)] }).unwrap();
        assert_eq!(json["verdict"], "serializable");
        assert_eq!(json["order"][0], 2);
    }
}
