//! Tessera command-line harness.
//!
//! Runs concurrency-control scenarios and checks the resulting histories
//! with the serializability oracle.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scenario file
//! tessera run scenarios/write_skew.toml
//!
//! # Same scenario, random interleaving, JSON output
//! tessera -o json run scenarios/write_skew.toml --strategy random --seed 7
//!
//! # 500 random SSI workloads of 4 transactions over 2 objects
//! tessera random --protocol ssi --txns 4 --objects 2 --runs 500
//! ```
//!
//! The exit code is 2 when a protocol that promises serializability
//! (2PL with long read locks, SSI) produced a non-serializable history.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tessera_checker::{SerializabilityChecker, DEFAULT_MAX_COMMITTED};
use tessera_cli::{run_random, run_scenario, OutputFormat, RandomBatch, StrategyChoice};
use tessera_common::config::{EngineConfig, ReadLockDuration, DEFAULT_MAX_OPS_PER_SCRIPT};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tessera concurrency-control harness
#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    author = "Tessera Team",
    version,
    about = "Run and check concurrency-control scenarios",
    long_about = "Drives scripted transactions under two-phase locking or (serializable)\n\
                  snapshot isolation and checks every history with a permutation-based\n\
                  serializability oracle."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table", global = true)]
    output: OutputFormatArg,

    /// Largest number of committed transactions the oracle accepts
    #[arg(long, default_value_t = DEFAULT_MAX_COMMITTED, global = true)]
    max_committed: usize,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario file to quiescence
    Run {
        /// Scenario file (TOML)
        #[arg(value_name = "FILE")]
        scenario: PathBuf,

        /// Scheduling strategy (default: the scenario's order, else round-robin)
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Seed for the random strategy
        #[arg(long, default_value_t = 0, env = "TESSERA_SEED")]
        seed: u64,
    },
    /// Run randomly generated workloads
    Random(RandomArgs),
}

#[derive(ClapArgs, Debug)]
struct RandomArgs {
    /// Protocol
    #[arg(short, long, value_enum, default_value = "ssi")]
    protocol: ProtocolArg,

    /// Number of transactions per run
    #[arg(long, default_value_t = 3)]
    txns: u64,

    /// Number of objects
    #[arg(long, default_value_t = 2)]
    objects: u32,

    /// Maximum operations per script
    #[arg(long, default_value_t = DEFAULT_MAX_OPS_PER_SCRIPT)]
    max_ops: usize,

    /// Number of runs
    #[arg(short, long, default_value_t = 100)]
    runs: usize,

    /// Seed of the first run
    #[arg(long, default_value_t = 0, env = "TESSERA_SEED")]
    seed: u64,

    /// Probability that a running SI transaction cancels at a step
    #[arg(long, default_value_t = 0.0)]
    cancel_probability: f64,
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in formatted tables
    Table,
    /// Display results as JSON
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Cycle through transactions in identity order
    RoundRobin,
    /// Seeded uniform random choice
    Random,
}

/// Protocol argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    /// Two-phase locking with long read locks
    #[value(name = "2pl")]
    TwoPl,
    /// Two-phase locking with short read locks
    #[value(name = "2pl-short")]
    TwoPlShort,
    /// Snapshot isolation
    Si,
    /// Serializable snapshot isolation
    Ssi,
}

impl ProtocolArg {
    fn config(self) -> EngineConfig {
        let (txns, objects) = (Vec::new(), Vec::new());
        match self {
            ProtocolArg::TwoPl => EngineConfig::two_phase_locking(txns, objects),
            ProtocolArg::TwoPlShort => EngineConfig::two_phase_locking(txns, objects)
                .with_read_locks(ReadLockDuration::Short),
            ProtocolArg::Si => EngineConfig::snapshot_isolation(txns, objects),
            ProtocolArg::Ssi => EngineConfig::serializable(txns, objects),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns false when a serializability promise was broken.
fn run(args: &Args) -> Result<bool> {
    let checker = SerializabilityChecker::new(args.max_committed);
    let format = args.output.into();

    match &args.command {
        Command::Run {
            scenario,
            strategy,
            seed,
        } => {
            let choice = match strategy {
                None => StrategyChoice::Auto,
                Some(StrategyArg::RoundRobin) => StrategyChoice::RoundRobin,
                Some(StrategyArg::Random) => StrategyChoice::Random { seed: *seed },
            };
            let report = run_scenario(scenario, choice, &checker)?;
            print!("{}", report.render(format)?);
            Ok(!report.violation)
        }
        Command::Random(random) => {
            let mut batch = RandomBatch::new(
                random.protocol.config(),
                random.txns,
                random.objects,
                random.max_ops,
            );
            batch.runs = random.runs;
            batch.seed = random.seed;
            batch.cancel_probability = random.cancel_probability;
            info!(protocol = batch.config.label(), runs = batch.runs, "running random batch");

            let report = run_random(&batch, &checker)?;
            print!("{}", report.render(format)?);
            Ok(report.violations == 0)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tessera=debug,tessera_cli=debug,tessera_txn=debug,tessera_checker=debug,tessera_mvcc=debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
