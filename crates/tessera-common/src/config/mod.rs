//! Configuration for Tessera.
//!
//! This module contains the engine configuration that fixes the protocol,
//! the finite transaction-identity and object sets, and script limits.

mod engine;

pub use engine::{EngineConfig, Protocol, ReadLockDuration, DEFAULT_MAX_OPS_PER_SCRIPT};
