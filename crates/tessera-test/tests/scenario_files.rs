//! Scenario files loaded from disk and run through the CLI harness.

use std::fs;

use tempfile::TempDir;
use tessera_checker::SerializabilityChecker;
use tessera_cli::{run_scenario, OutputFormat, Scenario, StrategyChoice};
use tessera_common::types::TxnId;
use tessera_txn::{AbortReason, TxnOutcome};

const PIVOT: &str = r#"
protocol = "snapshot-isolation"
serialize_mode = true
objects = [1, 2]
order = [1, 2, 3, 1, 2, 3, 3, 1, 1]

[[txn]]
id = 1
ops = [{ read = 1 }, { write = 2 }]

[[txn]]
id = 2
ops = [{ read = 2 }, { write = 1 }]

[[txn]]
id = 3
ops = [{ write = 1 }]
"#;

const WRITE_SKEW: &str = r#"
protocol = "snapshot-isolation"
objects = [1, 2]

[[txn]]
id = 1
ops = [{ read = 1 }, { read = 2 }, { write = 1 }]

[[txn]]
id = 2
ops = [{ read = 1 }, { read = 2 }, { write = 2 }]
"#;

fn write_scenario(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// The scenario's order is replayed and the pivot aborts.
#[test]
fn test_pivot_scenario_file() {
    let dir = TempDir::new().unwrap();
    let path = write_scenario(&dir, "pivot.toml", PIVOT);

    let scenario = Scenario::from_file(&path).unwrap();
    assert_eq!(scenario.txns.len(), 3);
    assert_eq!(scenario.config().label(), "SSI");

    let report = run_scenario(&path, StrategyChoice::Auto, &SerializabilityChecker::default())
        .unwrap();
    assert_eq!(report.summary.committed, vec![TxnId::new(3)]);
    assert_eq!(
        report.transactions[0].outcome,
        TxnOutcome::Aborted(AbortReason::DangerousStructure)
    );
    assert!(report.verdict.is_serializable());
    assert!(!report.violation);
}

/// Plain SI write skew is not serializable, but SI never promised it was.
#[test]
fn test_write_skew_is_not_a_violation_under_si() {
    let dir = TempDir::new().unwrap();
    let path = write_scenario(&dir, "skew.toml", WRITE_SKEW);

    let report = run_scenario(
        &path,
        StrategyChoice::RoundRobin,
        &SerializabilityChecker::default(),
    )
    .unwrap();
    assert_eq!(report.summary.committed.len(), 2);
    assert!(!report.verdict.is_serializable());
    assert!(!report.violation);

    let json: serde_json::Value =
        serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["protocol"], "SI");
    assert_eq!(json["verdict"]["verdict"], "not-serializable");

    let table = report.render(OutputFormat::Table).unwrap();
    assert!(table.contains("T1"));
}

/// A missing file reports its path.
#[test]
fn test_missing_scenario_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = run_scenario(&path, StrategyChoice::Auto, &SerializabilityChecker::default())
        .unwrap_err();
    assert!(format!("{:#}", err).contains("absent.toml"));
}

/// Every scenario shipped with the repository runs without breaking a
/// serializability promise.
#[test]
fn test_shipped_scenarios() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
    let mut ran = 0;
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().map_or(true, |ext| ext != "toml") {
            continue;
        }
        let report = run_scenario(&path, StrategyChoice::Auto, &SerializabilityChecker::default())
            .unwrap();
        assert!(!report.violation, "{}", path.display());
        ran += 1;
    }
    assert!(ran >= 7);
}
