//! # tessera-common
//!
//! Common types, errors, and configuration for Tessera.
//!
//! This crate provides the foundational types shared by every Tessera
//! component:
//!
//! - **Types**: transaction and object identifiers, logical timestamps,
//!   and the abstract values observed by reads and produced by writes
//! - **Errors**: unified error handling with `TesseraError`
//! - **Config**: engine configuration (`EngineConfig`)
//!
//! ## Example
//!
//! ```rust
//! use tessera_common::config::EngineConfig;
//! use tessera_common::types::{ObjectId, TxnId};
//!
//! let config = EngineConfig::serializable(
//!     vec![TxnId::new(1), TxnId::new(2)],
//!     vec![ObjectId::new(1)],
//! );
//! assert!(config.validate().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{EngineConfig, Protocol, ReadLockDuration};
pub use error::{ErrorCode, TesseraError, TesseraResult};
pub use types::{ObjectId, Timestamp, TxnId, Value};
