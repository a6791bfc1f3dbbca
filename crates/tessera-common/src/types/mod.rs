//! Type definitions for Tessera.
//!
//! This module contains the core type definitions used across the engine.

mod ids;
mod timestamps;
mod value;

pub use ids::{ObjectId, TxnId};
pub use timestamps::Timestamp;
pub use value::Value;
