//! Sequential replay of committed sub-histories.

use std::collections::BTreeMap;

use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, TxnId, Value};
use tessera_mvcc::StoreSnapshot;
use tessera_txn::{Event, HistoryLog};

/// A read or write recorded for a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The read observed `value`.
    Read(ObjectId, Value),
    /// The write produced `value`.
    Write(ObjectId, Value),
}

/// The reads and writes of one committed transaction, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubHistory {
    /// The transaction.
    pub txn_id: TxnId,
    /// Its steps.
    pub steps: Vec<Step>,
}

impl SubHistory {
    /// Extracts the sub-history of every committed transaction, in commit order.
    pub fn committed(history: &HistoryLog) -> Vec<SubHistory> {
        history
            .committed()
            .into_iter()
            .map(|txn_id| SubHistory {
                txn_id,
                steps: history
                    .for_txn(txn_id)
                    .filter_map(|entry| match entry.event {
                        Event::Read { object, value } => Some(Step::Read(object, value)),
                        Event::Write { object, value } => Some(Step::Write(object, value)),
                        Event::Commit { .. } | Event::Abort { .. } => None,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Checks that every recorded value has the store's value kind.
    pub fn check_kind(&self, store: &StoreSnapshot) -> TesseraResult<()> {
        let versioned = store.is_versioned();
        for step in &self.steps {
            let (Step::Read(_, value) | Step::Write(_, value)) = step;
            if value.as_writer().is_some() != versioned {
                return Err(TesseraError::StoreMismatch {
                    message: format!("{} recorded {} against a {} store", self.txn_id, value, kind(store)),
                });
            }
        }
        Ok(())
    }
}

fn kind(store: &StoreSnapshot) -> &'static str {
    if store.is_versioned() {
        "versioned"
    } else {
        "scalar"
    }
}

/// Object state during a sequential replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayState {
    values: BTreeMap<ObjectId, Value>,
    initial: Value,
}

impl ReplayState {
    /// Every object of `store` at its initial value.
    pub fn initial(store: &StoreSnapshot) -> Self {
        let initial = store.initial_value();
        Self {
            values: store.objects().into_iter().map(|o| (o, initial)).collect(),
            initial,
        }
    }

    /// Current value of an object.
    pub fn get(&self, object: ObjectId) -> Value {
        self.values.get(&object).copied().unwrap_or(self.initial)
    }

    /// Replays one sub-history. Returns false at the first read whose
    /// recorded value differs from the state; the state is then partial.
    pub fn apply(&mut self, sub: &SubHistory) -> bool {
        for step in &sub.steps {
            match *step {
                Step::Read(object, value) => {
                    if self.get(object) != value {
                        return false;
                    }
                }
                Step::Write(object, value) => {
                    self.values.insert(object, value);
                }
            }
        }
        true
    }

    /// Returns true if every object of `store` ends at the store's value.
    pub fn matches_final(&self, store: &StoreSnapshot) -> bool {
        store
            .objects()
            .into_iter()
            .all(|o| store.final_value(o) == Some(self.get(o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ObjectId = ObjectId::new(1);

    fn scalar_store(a: u64) -> StoreSnapshot {
        StoreSnapshot::Scalar([(A, a)].into_iter().collect())
    }

    #[test]
    fn test_committed_sub_histories() {
        let (t1, t2) = (TxnId::new(1), TxnId::new(2));
        let mut log = HistoryLog::new();
        log.append(t1, Event::Read { object: A, value: Value::Counter(0) });
        log.append(t2, Event::Write { object: A, value: Value::Counter(1) });
        log.append(t2, Event::Commit { commit_ts: None });
        log.append(t1, Event::Commit { commit_ts: None });

        let subs = SubHistory::committed(&log);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].txn_id, t2);
        assert_eq!(subs[1].steps, vec![Step::Read(A, Value::Counter(0))]);
    }

    #[test]
    fn test_replay_reads_and_writes() {
        let store = scalar_store(1);
        let mut state = ReplayState::initial(&store);
        let writer = SubHistory {
            txn_id: TxnId::new(1),
            steps: vec![Step::Write(A, Value::Counter(1))],
        };
        let reader = SubHistory {
            txn_id: TxnId::new(2),
            steps: vec![Step::Read(A, Value::Counter(0))],
        };

        assert!(state.clone().apply(&reader));
        assert!(state.apply(&writer));
        assert!(!state.apply(&reader));
        assert!(state.matches_final(&store));
    }

    #[test]
    fn test_kind_mismatch() {
        let sub = SubHistory {
            txn_id: TxnId::new(1),
            steps: vec![Step::Write(A, Value::Writer(TxnId::new(1)))],
        };
        assert!(matches!(
            sub.check_kind(&scalar_store(0)),
            Err(TesseraError::StoreMismatch { .. })
        ));
    }
}
