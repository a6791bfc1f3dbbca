//! # tessera-checker
//!
//! Offline serializability oracle for Tessera.
//!
//! Given a finished [`tessera_txn::HistoryLog`] and the final store, the
//! checker searches for a serial order of the committed transactions that
//! reproduces the recorded execution. It is a test oracle: the search is
//! factorial and bounded by [`SerializabilityChecker::new`].
//!
//! ```
//! use tessera_checker::SerializabilityChecker;
//! use tessera_common::{EngineConfig, ObjectId, TxnId};
//! use tessera_txn::{Operation, RoundRobin, Script, TransactionEngine};
//!
//! let (t1, t2, a) = (TxnId::new(1), TxnId::new(2), ObjectId::new(1));
//! let config = EngineConfig::two_phase_locking(vec![t1, t2], vec![a]);
//! let engine = TransactionEngine::new(config, RoundRobin::new()).unwrap();
//! engine.admit(t1, Script::new(vec![Operation::Read(a)])).unwrap();
//! engine.admit(t2, Script::new(vec![Operation::Write(a)])).unwrap();
//! engine.run_to_quiescence().unwrap();
//!
//! let verdict = SerializabilityChecker::default()
//!     .check(&engine.history(), &engine.store_snapshot())
//!     .unwrap();
//! assert!(verdict.is_serializable());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod oracle;
pub mod replay;

pub use oracle::{CheckMode, SerializabilityChecker, Verdict, DEFAULT_MAX_COMMITTED};
pub use replay::{ReplayState, Step, SubHistory};
