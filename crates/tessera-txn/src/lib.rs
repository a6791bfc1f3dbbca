//! # tessera-txn
//!
//! Concurrency control for Tessera.
//!
//! This crate drives scripted transactions under one of two protocols:
//!
//! - **Two-Phase Locking**: long-duration READ and WRITE locks, eager
//!   counter updates, deadlocks reported but never resolved. A
//!   short-duration read policy is available for comparison.
//!
//! - **Snapshot Isolation**: snapshot reads over version chains, buffered
//!   writes, first-updater-wins, and deadlock victims aborted. With
//!   serializable mode enabled, rw-antidependency flags reject dangerous
//!   structures (SSI).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     TransactionEngine                          │
//! │       (one mutex over every table, strategy picks next)        │
//! │                           │                                    │
//! │    ┌──────────────┬───────┴───────┬──────────────────┐         │
//! │    ▼              ▼               ▼                  ▼         │
//! │ ┌──────────┐ ┌───────────┐ ┌─────────────────┐ ┌────────────┐  │
//! │ │LockTable │ │ Store     │ │ ConflictTracker │ │ HistoryLog │  │
//! │ │          │ │ (mvcc)    │ │  (SSI flags)    │ │            │  │
//! │ └──────────┘ └───────────┘ └─────────────────┘ └────────────┘  │
//! │      │                                                         │
//! │      ▼                                                         │
//! │ ┌──────────────────┐                                           │
//! │ │ DeadlockDetector │                                           │
//! │ └──────────────────┘                                           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```
//! use tessera_common::{EngineConfig, ObjectId, TxnId};
//! use tessera_txn::{Operation, RoundRobin, Script, TransactionEngine, TxnOutcome};
//!
//! let (t1, t2) = (TxnId::new(1), TxnId::new(2));
//! let a = ObjectId::new(1);
//! let config = EngineConfig::serializable(vec![t1, t2], vec![a]);
//!
//! let engine = TransactionEngine::new(config, RoundRobin::new()).unwrap();
//! engine.admit(t1, Script::new(vec![Operation::Write(a)])).unwrap();
//! engine.admit(t2, Script::new(vec![Operation::Write(a)])).unwrap();
//!
//! let summary = engine.run_to_quiescence().unwrap();
//! assert_eq!(summary.committed, vec![t1]);
//! assert!(matches!(engine.outcome(t2).unwrap(), TxnOutcome::Aborted(_)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Rw-antidependency flags and SIREAD sets.
pub mod conflict;

/// Deadlock detection.
///
/// This module provides:
/// - [`deadlock::WaitForGraph`]: wait-for relation derived from the lock table
/// - [`deadlock::DeadlockDetector`]: cycle detection with statistics
pub mod deadlock;

/// Append-only execution history.
pub mod history;

/// Lock table.
pub mod lock;

/// The transaction engine.
///
/// This module provides:
/// - [`manager::TransactionEngine`]: drives transactions under a protocol
/// - [`manager::TxnOutcome`]: observable transaction status
/// - [`manager::AbortReason`]: why an SI transaction aborted
pub mod manager;

/// Scheduling strategies.
pub mod scheduler;

/// Transaction scripts.
pub mod script;

pub use conflict::{ConflictFlags, ConflictTracker};
pub use deadlock::{DeadlockDetector, DeadlockInfo, DeadlockStats, WaitForGraph};
pub use history::{Event, HistoryEntry, HistoryLog};
pub use lock::{LockHolders, LockMode, LockRequest, LockResult, LockStats, LockTable};
pub use manager::{
    AbortReason, Action, RunSummary, StepOutcome, TransactionEngine, TransactionState,
    TransactionStats, TxnOutcome,
};
pub use scheduler::{Randomized, RoundRobin, Scripted, SelectionStrategy};
pub use script::{NextAction, Operation, Script};
