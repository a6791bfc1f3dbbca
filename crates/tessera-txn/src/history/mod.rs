//! Execution history.
//!
//! The history is the append-only sequence of events the engine produced:
//! reads with the value observed, writes with the value produced, and the
//! terminal commit or abort of each transaction. It is the only input the
//! serializability checker needs besides the final store.

use std::fmt;

use serde::Serialize;
use tessera_common::types::{ObjectId, Timestamp, TxnId, Value};

use crate::manager::AbortReason;

/// A history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    /// A read and the value it observed.
    Read {
        /// Object read.
        object: ObjectId,
        /// Value observed.
        value: Value,
    },
    /// A write and the value it produced.
    Write {
        /// Object written.
        object: ObjectId,
        /// Value produced.
        value: Value,
    },
    /// Commit. Carries the commit timestamp under snapshot isolation.
    Commit {
        /// Commit timestamp.
        commit_ts: Option<Timestamp>,
    },
    /// Abort.
    Abort {
        /// Why the transaction aborted.
        reason: AbortReason,
    },
}

impl Event {
    /// Returns true for commit and abort events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Commit { .. } | Event::Abort { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Read { object, value } => write!(f, "R({}) -> {}", object, value),
            Event::Write { object, value } => write!(f, "W({}) = {}", object, value),
            Event::Commit {
                commit_ts: Some(ts),
            } => write!(f, "Commit {}", ts),
            Event::Commit { commit_ts: None } => write!(f, "Commit"),
            Event::Abort { reason } => write!(f, "Abort ({})", reason),
        }
    }
}

/// One entry of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Position in the history, starting at 0.
    pub seq: usize,
    /// Transaction that produced the event.
    pub txn_id: TxnId,
    /// The event.
    #[serde(flatten)]
    pub event: Event,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  {}: {}", self.seq, self.txn_id, self.event)
    }
}

/// Append-only execution history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn append(&mut self, txn_id: TxnId, event: Event) -> usize {
        let seq = self.entries.len();
        tracing::trace!(seq, txn = %txn_id, event = %event, "history");
        self.entries.push(HistoryEntry { seq, txn_id, event });
        seq
    }

    /// Returns all entries in order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries produced by one transaction, in order.
    pub fn for_txn(&self, txn_id: TxnId) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter().filter(move |e| e.txn_id == txn_id)
    }

    /// Committed transactions in commit order.
    pub fn committed(&self) -> Vec<TxnId> {
        self.entries
            .iter()
            .filter(|e| matches!(e.event, Event::Commit { .. }))
            .map(|e| e.txn_id)
            .collect()
    }

    /// Aborted transactions with their reasons, in abort order.
    pub fn aborted(&self) -> Vec<(TxnId, AbortReason)> {
        self.entries
            .iter()
            .filter_map(|e| match e.event {
                Event::Abort { reason } => Some((e.txn_id, reason)),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for HistoryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ObjectId = ObjectId::new(1);

    #[test]
    fn test_append_and_filter() {
        let (t1, t2) = (TxnId::new(1), TxnId::new(2));
        let mut log = HistoryLog::new();

        assert_eq!(
            log.append(t1, Event::Read { object: A, value: Value::Counter(0) }),
            0
        );
        log.append(t2, Event::Write { object: A, value: Value::Counter(1) });
        log.append(t2, Event::Commit { commit_ts: None });
        log.append(t1, Event::Abort { reason: AbortReason::Voluntary });

        assert_eq!(log.len(), 4);
        assert_eq!(log.for_txn(t1).count(), 2);
        assert_eq!(log.committed(), vec![t2]);
        assert_eq!(log.aborted(), vec![(t1, AbortReason::Voluntary)]);
        assert!(log.for_txn(TxnId::new(3)).next().is_none());
    }

    #[test]
    fn test_display() {
        let mut log = HistoryLog::new();
        log.append(
            TxnId::new(1),
            Event::Read {
                object: A,
                value: Value::Writer(TxnId::GENESIS),
            },
        );
        assert_eq!(log.to_string(), "   0  T1: R(o1) -> init\n");
    }

    #[test]
    fn test_json_shape() {
        let mut log = HistoryLog::new();
        log.append(TxnId::new(2), Event::Commit { commit_ts: Some(Timestamp::new(3)) });
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["event"], "commit");
        assert_eq!(json[0]["txn_id"], 2);
        assert_eq!(json[0]["commit_ts"], 3);
    }
}
