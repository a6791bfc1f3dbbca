//! # tessera-test
//!
//! Integration tests for Tessera.
//!
//! This crate contains:
//! - Fixture helpers for building engines from literal scripts
//! - Seeded random workloads checked against the serializability oracle
//! - Checks of properties every history must satisfy

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;

/// Workload generators
pub mod workload;
