//! Transaction engine.
//!
//! The engine owns one state machine per admitted transaction and drives
//! them through their scripts under either two-phase locking or snapshot
//! isolation (optionally serializable). Every transition happens with the
//! shared-state mutex held, so transitions are atomic with respect to each
//! other no matter how many threads drive the engine.
//!
//! # Driving the engine
//!
//! - [`TransactionEngine::step`] lets the selection strategy pick one
//!   schedulable transaction and applies one transition for it
//! - [`TransactionEngine::advance`] applies one transition for a specific
//!   transaction, which suits one-thread-per-transaction drivers
//! - [`TransactionEngine::run_to_quiescence`] steps until nothing can move
//!
//! # Transitions
//!
//! ```text
//!  2PL:  Init ─▶ Running ─▶ Committed          (blocked forever on deadlock)
//!  SI:   Init ─begin─▶ Running ─▶ Committed
//!                         └──────▶ Aborted(dangerous structure | FUW |
//!                                          deadlock | voluntary)
//! ```
//!
//! Under SI the first transition of a transaction takes its snapshot and
//! touches nothing else, so a transaction can hold a snapshot while its
//! first write waits for a lock.

mod state;
mod transaction;

pub use transaction::{AbortReason, TransactionState, TxnOutcome};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use serde::Serialize;
use tessera_common::config::{EngineConfig, Protocol};
use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, Timestamp, TxnId, Value};
use tessera_mvcc::StoreSnapshot;

use crate::conflict::ConflictFlags;
use crate::deadlock::{DeadlockDetector, WaitForGraph};
use crate::history::HistoryLog;
use crate::lock::LockHolders;
use crate::scheduler::SelectionStrategy;
use crate::script::Script;

use state::EngineState;
use transaction::Transaction;

/// One transition applied to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Snapshot taken (SI only).
    Begin {
        /// Snapshot timestamp.
        start_ts: Timestamp,
    },
    /// A read and its value.
    Read {
        /// Object read.
        object: ObjectId,
        /// Value observed.
        value: Value,
    },
    /// A write and its value.
    Write {
        /// Object written.
        object: ObjectId,
        /// Value produced.
        value: Value,
    },
    /// WRITE lock taken, but foreign readers still hold READ locks (2PL only).
    LockAcquired {
        /// Locked object.
        object: ObjectId,
    },
    /// Commit.
    Commit {
        /// Commit timestamp (SI only).
        commit_ts: Option<Timestamp>,
    },
    /// Abort.
    Abort {
        /// Why.
        reason: AbortReason,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Begin { start_ts } => write!(f, "begin {}", start_ts),
            Action::Read { object, value } => write!(f, "R({}) -> {}", object, value),
            Action::Write { object, value } => write!(f, "W({}) = {}", object, value),
            Action::LockAcquired { object } => write!(f, "lock W({})", object),
            Action::Commit {
                commit_ts: Some(ts),
            } => write!(f, "commit {}", ts),
            Action::Commit { commit_ts: None } => write!(f, "commit"),
            Action::Abort { reason } => write!(f, "abort ({})", reason),
        }
    }
}

/// Result of [`TransactionEngine::step`] or [`TransactionEngine::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A transition was applied.
    Applied {
        /// Transaction that moved.
        txn_id: TxnId,
        /// What it did.
        action: Action,
    },
    /// A deadlock cycle was broken by aborting `victim` (SI only).
    DeadlockResolved {
        /// Aborted transaction.
        victim: TxnId,
        /// The cycle.
        cycle: Vec<TxnId>,
    },
    /// The transaction waits for a lock.
    Blocked {
        /// Waiting transaction.
        txn_id: TxnId,
    },
    /// The transaction is on a wait-for cycle that is never resolved (2PL).
    Deadlocked {
        /// Deadlocked transaction.
        txn_id: TxnId,
        /// The cycle.
        cycle: Vec<TxnId>,
    },
    /// The transaction already committed or aborted.
    Terminal {
        /// Finished transaction.
        txn_id: TxnId,
    },
    /// Nothing can move.
    Idle,
}

/// Statistics about the engine.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Transactions that took their first action.
    pub started: AtomicU64,
    /// Transactions committed.
    pub committed: AtomicU64,
    /// Aborts for dangerous structures.
    pub aborted_dangerous_structure: AtomicU64,
    /// Aborts for first-updater-wins conflicts.
    pub aborted_fuw: AtomicU64,
    /// Aborts of deadlock victims.
    pub aborted_deadlock: AtomicU64,
    /// Voluntary aborts.
    pub aborted_voluntary: AtomicU64,
    /// Attempts to advance a transaction that could not move.
    pub blocked: AtomicU64,
    /// Deadlocks detected.
    pub deadlocks: AtomicU64,
}

impl TransactionStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an abort.
    pub fn record_abort(&self, reason: AbortReason) {
        let counter = match reason {
            AbortReason::DangerousStructure => &self.aborted_dangerous_structure,
            AbortReason::FirstUpdaterWins => &self.aborted_fuw,
            AbortReason::Deadlock => &self.aborted_deadlock,
            AbortReason::Voluntary => &self.aborted_voluntary,
        };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Total aborts.
    pub fn aborted(&self) -> u64 {
        [
            &self.aborted_dangerous_structure,
            &self.aborted_fuw,
            &self.aborted_deadlock,
            &self.aborted_voluntary,
        ]
        .iter()
        .map(|c| c.load(AtomicOrdering::Relaxed))
        .sum()
    }
}

/// Where a run ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Steps taken.
    pub steps: usize,
    /// Committed transactions, in commit order.
    pub committed: Vec<TxnId>,
    /// Aborted transactions, in abort order.
    pub aborted: Vec<(TxnId, AbortReason)>,
    /// Transactions left on a wait-for cycle.
    pub deadlocked: Vec<TxnId>,
    /// Transactions left waiting behind a deadlocked one.
    pub blocked: Vec<TxnId>,
}

impl RunSummary {
    /// Returns true if every transaction committed or aborted.
    pub fn is_complete(&self) -> bool {
        self.deadlocked.is_empty() && self.blocked.is_empty()
    }
}

/// The transaction engine.
pub struct TransactionEngine {
    config: EngineConfig,
    /// Every shared table lives behind this one mutex.
    state: Mutex<EngineState>,
    /// Locked after `state` whenever both are needed.
    strategy: Mutex<Box<dyn SelectionStrategy>>,
    detector: DeadlockDetector,
    stats: TransactionStats,
}

impl TransactionEngine {
    /// Creates an engine for a validated configuration.
    pub fn new<S>(config: EngineConfig, strategy: S) -> TesseraResult<Self>
    where
        S: SelectionStrategy + 'static,
    {
        config.validate()?;
        tracing::debug!(protocol = config.label(), txns = config.transactions.len(), "engine created");
        Ok(Self {
            state: Mutex::new(EngineState::new(config.clone())),
            strategy: Mutex::new(Box::new(strategy)),
            detector: DeadlockDetector::new(),
            stats: TransactionStats::new(),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn check_configured(&self, txn_id: TxnId) -> TesseraResult<()> {
        if self.config.transactions.contains(&txn_id) {
            Ok(())
        } else {
            Err(TesseraError::UnknownTransaction { txn_id })
        }
    }

    /// Admits a transaction with its script. Only allowed before the first step.
    pub fn admit(&self, txn_id: TxnId, script: Script) -> TesseraResult<()> {
        self.check_configured(txn_id)?;
        let mut state = self.state.lock();
        if state.started {
            return Err(TesseraError::AlreadyStarted { txn_id });
        }
        if state.txns.contains_key(&txn_id) {
            return Err(TesseraError::DuplicateTransaction { txn_id });
        }
        script.validate(txn_id, &self.config.objects, self.config.max_ops_per_script)?;
        tracing::debug!(txn = %txn_id, script = %script, "admitted");
        state.txns.insert(txn_id, Transaction::new(txn_id, script));
        Ok(())
    }

    /// Lets the strategy pick one schedulable transaction and advances it.
    pub fn step(&self) -> TesseraResult<StepOutcome> {
        let mut state = self.state.lock();
        state.started = true;
        let graph = state.wait_for_graph()?;
        let candidates = state.candidates(&graph)?;
        if candidates.is_empty() {
            return Ok(StepOutcome::Idle);
        }

        let mut strategy = self.strategy.lock();
        let txn_id = match strategy.select_txn(&candidates) {
            Some(id) if candidates.contains(&id) => id,
            Some(id) => {
                return Err(TesseraError::internal(format!(
                    "strategy selected {} outside the candidate set",
                    id
                )))
            }
            None => return Ok(StepOutcome::Idle),
        };
        self.advance_locked(&mut state, &mut **strategy, &graph, txn_id)
    }

    /// Applies one transition for `txn_id`, if it can move.
    ///
    /// Under SI a deadlocked transaction breaks its own cycle by having the
    /// strategy pick a victim.
    pub fn advance(&self, txn_id: TxnId) -> TesseraResult<StepOutcome> {
        self.check_configured(txn_id)?;
        let mut state = self.state.lock();
        state.txn(txn_id)?;
        state.started = true;
        let graph = state.wait_for_graph()?;
        let mut strategy = self.strategy.lock();
        self.advance_locked(&mut state, &mut **strategy, &graph, txn_id)
    }

    fn advance_locked(
        &self,
        state: &mut EngineState,
        strategy: &mut dyn SelectionStrategy,
        graph: &WaitForGraph,
        txn_id: TxnId,
    ) -> TesseraResult<StepOutcome> {
        let txn_state = state.txn(txn_id)?.state;
        if txn_state.is_terminal() {
            return Ok(StepOutcome::Terminal { txn_id });
        }

        if state.is_enabled(txn_id)? {
            let cancel = self.config.protocol == Protocol::SnapshotIsolation
                && txn_state == TransactionState::Running
                && strategy.should_cancel(txn_id);
            let action = if cancel {
                state.abort(txn_id, AbortReason::Voluntary, &self.stats)?
            } else {
                state.apply(txn_id, &self.stats)?
            };
            return Ok(StepOutcome::Applied { txn_id, action });
        }

        let Some(mut info) = self.detector.detect(graph, txn_id) else {
            self.stats.blocked.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(StepOutcome::Blocked { txn_id });
        };
        self.stats.deadlocks.fetch_add(1, AtomicOrdering::Relaxed);

        match self.config.protocol {
            Protocol::TwoPhaseLocking => Ok(StepOutcome::Deadlocked {
                txn_id,
                cycle: info.cycle,
            }),
            Protocol::SnapshotIsolation => {
                let victim = strategy
                    .select_victim(&info.cycle)
                    .filter(|v| info.cycle.contains(v))
                    .unwrap_or(txn_id);
                state.abort(victim, AbortReason::Deadlock, &self.stats)?;
                self.detector.record_victim(&mut info, victim);
                tracing::info!(victim = %victim, cycle = ?info.cycle, "deadlock resolved");
                Ok(StepOutcome::DeadlockResolved {
                    victim,
                    cycle: info.cycle,
                })
            }
        }
    }

    /// Aborts a live SI transaction with reason `voluntary`.
    pub fn cancel(&self, txn_id: TxnId) -> TesseraResult<()> {
        self.check_configured(txn_id)?;
        if self.config.protocol == Protocol::TwoPhaseLocking {
            return Err(TesseraError::invalid_argument(
                "two-phase locking transactions cannot abort",
            ));
        }
        let mut state = self.state.lock();
        state.started = true;
        state.abort(txn_id, AbortReason::Voluntary, &self.stats)?;
        Ok(())
    }

    /// Steps until nothing can move.
    pub fn run_to_quiescence(&self) -> TesseraResult<RunSummary> {
        let mut steps = 0;
        while self.step()? != StepOutcome::Idle {
            steps += 1;
        }

        let state = self.state.lock();
        let graph = state.wait_for_graph()?;
        let (deadlocked, blocked): (Vec<TxnId>, Vec<TxnId>) = state
            .blocked()?
            .into_iter()
            .partition(|id| graph.is_deadlocked(*id));
        if !deadlocked.is_empty() {
            tracing::warn!(txns = ?deadlocked, "run ended with deadlocked transactions");
        }

        Ok(RunSummary {
            steps,
            committed: state.history.committed(),
            aborted: state.history.aborted(),
            deadlocked,
            blocked,
        })
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns the current status of a transaction.
    pub fn outcome(&self, txn_id: TxnId) -> TesseraResult<TxnOutcome> {
        self.check_configured(txn_id)?;
        let state = self.state.lock();
        let outcome = match state.txn(txn_id)?.state {
            TransactionState::Committed => TxnOutcome::Committed,
            TransactionState::Aborted(reason) => TxnOutcome::Aborted(reason),
            TransactionState::Init if state.is_enabled(txn_id)? => TxnOutcome::Pending,
            TransactionState::Running if state.is_enabled(txn_id)? => TxnOutcome::Running,
            _ if state.wait_for_graph()?.is_deadlocked(txn_id) => TxnOutcome::Deadlocked,
            _ => TxnOutcome::Blocked,
        };
        Ok(outcome)
    }

    /// Returns a copy of the history.
    pub fn history(&self) -> HistoryLog {
        self.state.lock().history.clone()
    }

    /// Returns a copy of the store.
    pub fn store_snapshot(&self) -> StoreSnapshot {
        self.state.lock().storage.snapshot()
    }

    /// Returns the conflict flags of a transaction.
    pub fn conflict_flags(&self, txn_id: TxnId) -> TesseraResult<ConflictFlags> {
        self.check_configured(txn_id)?;
        Ok(self.state.lock().conflicts.flags(txn_id))
    }

    /// Returns the lock holders of an object.
    pub fn lock_holders(&self, object: ObjectId) -> TesseraResult<LockHolders> {
        self.state.lock().locks.holders(object).cloned()
    }

    /// Returns the buffered writes of a transaction.
    pub fn write_buffer(&self, txn_id: TxnId) -> TesseraResult<Vec<(ObjectId, Value)>> {
        self.check_configured(txn_id)?;
        let state = self.state.lock();
        Ok(state
            .txn(txn_id)?
            .write_buffer
            .iter()
            .map(|(o, v)| (*o, *v))
            .collect())
    }

    /// Returns the snapshot timestamp of an SI transaction that has begun.
    pub fn start_ts(&self, txn_id: TxnId) -> TesseraResult<Option<Timestamp>> {
        self.check_configured(txn_id)?;
        Ok(self.state.lock().txn(txn_id)?.start_ts)
    }

    /// Returns statistics.
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// Returns deadlock detection statistics.
    pub fn deadlock_detector(&self) -> &DeadlockDetector {
        &self.detector
    }
}

impl fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionEngine")
            .field("protocol", &self.config.label())
            .field("txn_count", &state.txns.len())
            .field("lock_count", &state.locks.lock_count())
            .field("history_len", &state.history.len())
            .finish()
    }
}
