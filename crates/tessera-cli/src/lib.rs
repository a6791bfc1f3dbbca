//! Harness library behind the `tessera` binary: scenario files, randomized
//! batches, and report formatting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod report;
pub mod scenario;

pub use commands::{random_engine, run_random, run_scenario, RandomBatch, StrategyChoice};
pub use report::{BatchReport, OutputFormat, RunReport};
pub use scenario::{Scenario, ScenarioTxn};
