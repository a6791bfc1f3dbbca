//! # tessera-mvcc
//!
//! Object storage for Tessera's two concurrency-control protocols.
//!
//! This crate implements:
//! - Append-only version chains (snapshot isolation)
//! - Scalar counter cells (two-phase locking)
//! - The global logical clock
//! - Snapshot visibility
//! - Point-in-time copies of the store for inspection

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Scalar counter cells
pub mod cell;

/// Global logical clock
pub mod clock;

/// Snapshot visibility
pub mod snapshot;

/// Store inspection
pub mod store;

/// Version chain storage
pub mod version;

pub use cell::ScalarStore;
pub use clock::LogicalClock;
pub use snapshot::Snapshot;
pub use store::StoreSnapshot;
pub use version::{Version, VersionChain, VersionStore};
