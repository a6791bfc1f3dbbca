//! Per-transaction state.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tessera_common::types::{ObjectId, Timestamp, TxnId, Value};

use crate::script::{NextAction, Script};

/// Why a transaction aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    /// SSI pivot rejection.
    DangerousStructure,
    /// A newer version was committed after the snapshot was taken.
    FirstUpdaterWins,
    /// Chosen as victim of a wait-for cycle.
    Deadlock,
    /// Cancelled from outside.
    Voluntary,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::DangerousStructure => write!(f, "dangerous structure"),
            AbortReason::FirstUpdaterWins => write!(f, "FUW"),
            AbortReason::Deadlock => write!(f, "deadlock"),
            AbortReason::Voluntary => write!(f, "voluntary"),
        }
    }
}

/// The lifecycle state of a transaction.
///
/// ```text
/// ┌──────┐  first action  ┌─────────┐   commit   ┌───────────┐
/// │ Init │───────────────▶│ Running │───────────▶│ Committed │
/// └──────┘                └─────────┘            └───────────┘
///                              │ abort (SI only)
///                              ▼
///                         ┌─────────┐
///                         │ Aborted │
///                         └─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Admitted, no action taken yet.
    Init,
    /// Executing its script.
    Running,
    /// Committed.
    Committed,
    /// Aborted.
    Aborted(AbortReason),
}

impl TransactionState {
    /// Returns true once the transaction committed or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted(_)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Init => write!(f, "Init"),
            TransactionState::Running => write!(f, "Running"),
            TransactionState::Committed => write!(f, "Committed"),
            TransactionState::Aborted(reason) => write!(f, "Aborted ({})", reason),
        }
    }
}

/// Observable status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum TxnOutcome {
    /// Not started; its first action can proceed.
    Pending,
    /// Started; its next action can proceed.
    Running,
    /// Waiting for a lock held by a transaction that can still progress.
    Blocked,
    /// On a wait-for cycle.
    Deadlocked,
    /// Committed.
    Committed,
    /// Aborted.
    Aborted(AbortReason),
}

impl TxnOutcome {
    /// Returns true for committed and aborted transactions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnOutcome::Committed | TxnOutcome::Aborted(_))
    }
}

impl fmt::Display for TxnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnOutcome::Pending => write!(f, "pending"),
            TxnOutcome::Running => write!(f, "running"),
            TxnOutcome::Blocked => write!(f, "blocked"),
            TxnOutcome::Deadlocked => write!(f, "deadlocked"),
            TxnOutcome::Committed => write!(f, "committed"),
            TxnOutcome::Aborted(reason) => write!(f, "aborted ({})", reason),
        }
    }
}

/// A transaction owned by the engine.
pub(crate) struct Transaction {
    pub(crate) id: TxnId,
    pub(crate) script: Script,
    /// Index of the next scripted operation.
    pub(crate) pc: usize,
    pub(crate) state: TransactionState,
    pub(crate) start_ts: Option<Timestamp>,
    pub(crate) commit_ts: Option<Timestamp>,
    /// Engine transition counter at begin and at commit (SI only).
    pub(crate) begin_seq: Option<u64>,
    pub(crate) commit_seq: Option<u64>,
    /// One buffered write per object (SI only).
    pub(crate) write_buffer: BTreeMap<ObjectId, Value>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, script: Script) -> Self {
        Self {
            id,
            script,
            pc: 0,
            state: TransactionState::Init,
            start_ts: None,
            commit_ts: None,
            begin_seq: None,
            commit_seq: None,
            write_buffer: BTreeMap::new(),
        }
    }

    pub(crate) fn next_action(&self) -> NextAction {
        self.script.action_at(self.pc)
    }

    /// True if this transaction is running, or committed after a transaction
    /// that began at `begin_seq`.
    ///
    /// For writers this is `commit_ts > start_ts`. Read-only commits do not
    /// advance the clock, so the transition order decides.
    pub(crate) fn overlaps(&self, begin_seq: u64) -> bool {
        match self.state {
            TransactionState::Running => true,
            TransactionState::Committed => self.commit_seq.map_or(false, |c| c > begin_seq),
            TransactionState::Init | TransactionState::Aborted(_) => false,
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("script_len", &self.script.len())
            .field("start_ts", &self.start_ts)
            .field("commit_ts", &self.commit_ts)
            .field("buffered", &self.write_buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Operation;

    #[test]
    fn test_state_terminal() {
        assert!(!TransactionState::Init.is_terminal());
        assert!(!TransactionState::Running.is_terminal());
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted(AbortReason::Deadlock).is_terminal());
    }

    #[test]
    fn test_overlaps() {
        let mut txn = Transaction::new(TxnId::new(1), Script::default());
        assert!(!txn.overlaps(0));

        txn.state = TransactionState::Running;
        assert!(txn.overlaps(5));

        txn.state = TransactionState::Committed;
        txn.commit_seq = Some(3);
        assert!(txn.overlaps(2));
        assert!(!txn.overlaps(3));
    }

    #[test]
    fn test_next_action_follows_pc() {
        let a = ObjectId::new(1);
        let mut txn = Transaction::new(TxnId::new(1), Script::new(vec![Operation::Read(a)]));
        assert_eq!(txn.next_action(), NextAction::Op(Operation::Read(a)));
        txn.pc += 1;
        assert_eq!(txn.next_action(), NextAction::Commit);
    }

    #[test]
    fn test_display() {
        assert_eq!(AbortReason::FirstUpdaterWins.to_string(), "FUW");
        assert_eq!(
            TransactionState::Aborted(AbortReason::DangerousStructure).to_string(),
            "Aborted (dangerous structure)"
        );
        assert_eq!(TxnOutcome::Deadlocked.to_string(), "deadlocked");
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(TxnOutcome::Aborted(AbortReason::Voluntary)).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["reason"], "voluntary");
    }
}
