//! Output formatting for run results.
//!
//! Supports table and JSON output formats.

use anyhow::Result;
use comfy_table::{Cell, ContentArrangement, Table};
use serde::Serialize;
use tessera_checker::{SerializabilityChecker, Verdict};
use tessera_common::types::TxnId;
use tessera_txn::{ConflictFlags, HistoryLog, RunSummary, TransactionEngine, TxnOutcome};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

/// Final status of one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TxnReport {
    /// Transaction.
    pub txn_id: TxnId,
    /// Final status.
    pub outcome: TxnOutcome,
    /// SSI conflict flags.
    pub flags: ConflictFlags,
}

/// Everything a single run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Protocol label.
    pub protocol: &'static str,
    /// Per-transaction status.
    pub transactions: Vec<TxnReport>,
    /// Run summary.
    pub summary: RunSummary,
    /// Full history.
    pub history: HistoryLog,
    /// Oracle verdict.
    pub verdict: Verdict,
    /// The protocol promised serializability and the verdict says otherwise.
    pub violation: bool,
}

impl RunReport {
    /// Gathers the report of a finished run and checks its history.
    pub fn collect(
        engine: &TransactionEngine,
        summary: RunSummary,
        checker: &SerializabilityChecker,
    ) -> Result<Self> {
        let config = engine.config();
        let transactions = config
            .transactions
            .iter()
            .map(|id| {
                Ok(TxnReport {
                    txn_id: *id,
                    outcome: engine.outcome(*id)?,
                    flags: engine.conflict_flags(*id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let history = engine.history();
        let verdict = checker.check(&history, &engine.store_snapshot())?;
        let violation = config.promises_serializability() && !verdict.is_serializable();
        Ok(Self {
            protocol: config.label(),
            transactions,
            summary,
            history,
            verdict,
            violation,
        })
    }

    /// Renders the report.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Table => Ok(self.render_table()),
        }
    }

    fn render_table(&self) -> String {
        let mut table = new_table();
        table.set_header(vec!["txn", "outcome", "in", "out"]);
        for txn in &self.transactions {
            table.add_row(vec![
                Cell::new(txn.txn_id),
                Cell::new(txn.outcome),
                Cell::new(txn.flags.in_conflict),
                Cell::new(txn.flags.out_conflict),
            ]);
        }

        let mut out = format!("protocol: {}\n{}\n\nhistory:\n{}", self.protocol, table, self.history);
        out.push_str(&format!("\n{}\n", verdict_line(&self.verdict)));
        if self.violation {
            out.push_str("VIOLATION: protocol promised serializability\n");
        }
        out
    }
}

fn verdict_line(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Serializable { order } => format!("serializable, witness order {}", join(order)),
        Verdict::NotSerializable { committed } => {
            format!("NOT serializable, committed {}", join(committed))
        }
    }
}

fn join(ids: &[TxnId]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// One line of a randomized batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchLine {
    /// Run index.
    pub run: usize,
    /// Seed of the run.
    pub seed: u64,
    /// Committed transactions.
    pub committed: usize,
    /// Aborted transactions.
    pub aborted: usize,
    /// Deadlocked transactions.
    pub deadlocked: usize,
    /// Whether the oracle accepted the history.
    pub serializable: bool,
}

/// Results of a randomized batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Protocol label.
    pub protocol: &'static str,
    /// One line per run.
    pub runs: Vec<BatchLine>,
    /// Runs that broke a serializability promise.
    pub violations: usize,
}

impl BatchReport {
    /// Renders the report.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        if format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        let mut table = new_table();
        table.set_header(vec!["run", "seed", "committed", "aborted", "deadlocked", "serializable"]);
        for line in &self.runs {
            table.add_row(vec![
                Cell::new(line.run),
                Cell::new(line.seed),
                Cell::new(line.committed),
                Cell::new(line.aborted),
                Cell::new(line.deadlocked),
                Cell::new(if line.serializable { "yes" } else { "NO" }),
            ]);
        }
        let serializable = self.runs.iter().filter(|l| l.serializable).count();
        Ok(format!(
            "protocol: {}\n{}\n{}/{} runs serializable, {} violations\n",
            self.protocol,
            table,
            serializable,
            self.runs.len(),
            self.violations
        ))
    }
}
