// 🗄️ Run history - one row per pipeline run, in SQLite
// Written by the scheduled/CLI collaborator after `run_once`; the analysis
// core itself never touches the database.

use crate::aggregator::AggregatedReport;
use crate::diagnostics::{DiagnosticLevel, Diagnostics};
use crate::error::AnalysisError;
use crate::record::RecordTable;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// SHA-256 over the whole record table.
    pub table_fingerprint: String,
    pub record_count: usize,
    /// "completed", or "aborted" when the run hit a fatal error.
    pub outcome: String,
    pub error: Option<String>,
    /// Stage name → completed / skipped / failed.
    pub stage_status: BTreeMap<String, String>,
    pub warnings: usize,
    pub report: Option<serde_json::Value>,
}

impl RunRecord {
    pub fn summary(&self) -> String {
        let stages: Vec<String> = self
            .stage_status
            .iter()
            .map(|(stage, status)| format!("{}={}", stage, status))
            .collect();
        format!(
            "{} {} {} records [{}] {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.run_id,
            self.record_count,
            if stages.is_empty() {
                self.error.clone().unwrap_or_default()
            } else {
                stages.join(" ")
            },
            self.outcome
        )
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            table_fingerprint TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            error TEXT,
            stage_status TEXT NOT NULL,
            warnings INTEGER NOT NULL,
            report TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_fingerprint ON runs(table_fingerprint)",
        [],
    )?;

    Ok(())
}

/// Persist the outcome of one run.
pub fn record_run(
    conn: &Connection,
    diag: &Diagnostics,
    table: &RecordTable,
    outcome: &std::result::Result<AggregatedReport, AnalysisError>,
) -> Result<RunRecord> {
    let (outcome_name, error, stage_status, report) = match outcome {
        Ok(report) => (
            "completed",
            None,
            report
                .stage_statuses()
                .into_iter()
                .map(|(stage, status, _)| (stage.to_string(), status.to_string()))
                .collect(),
            Some(serde_json::to_value(report).context("Failed to serialize report")?),
        ),
        Err(e) => ("aborted", Some(e.to_string()), BTreeMap::new(), None),
    };

    let run = RunRecord {
        run_id: diag.run_id.clone(),
        started_at: diag.started_at,
        table_fingerprint: table.fingerprint(),
        record_count: table.len(),
        outcome: outcome_name.to_string(),
        error,
        stage_status,
        warnings: diag.count(DiagnosticLevel::Warn),
        report,
    };

    conn.execute(
        "INSERT INTO runs (run_id, started_at, table_fingerprint, record_count,
                           outcome, error, stage_status, warnings, report)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.run_id,
            run.started_at.to_rfc3339(),
            run.table_fingerprint,
            run.record_count as i64,
            run.outcome,
            run.error,
            serde_json::to_string(&run.stage_status)?,
            run.warnings as i64,
            run.report.as_ref().map(|r| r.to_string()),
        ],
    )
    .with_context(|| format!("Failed to record run {}", run.run_id))?;

    tracing::info!(run_id = %run.run_id, outcome = %run.outcome, "run recorded");
    Ok(run)
}

const SELECT_RUNS: &str = "SELECT run_id, started_at, table_fingerprint, record_count,
                                  outcome, error, stage_status, warnings, report
                           FROM runs";

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
    let started_at: String = row.get(1)?;
    let stage_status: String = row.get(6)?;
    let report: Option<String> = row.get(8)?;
    let record_count: i64 = row.get(3)?;
    let warnings: i64 = row.get(7)?;

    Ok(RunRecord {
        run_id: row.get(0)?,
        started_at: DateTime::parse_from_rfc3339(&started_at)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
        table_fingerprint: row.get(2)?,
        record_count: record_count as usize,
        outcome: row.get(4)?,
        error: row.get(5)?,
        stage_status: serde_json::from_str(&stage_status).map_err(|_| rusqlite::Error::InvalidQuery)?,
        warnings: warnings as usize,
        report: report
            .map(|r| serde_json::from_str(&r))
            .transpose()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

/// Most recent runs first.
pub fn get_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY started_at DESC, id DESC LIMIT ?1", SELECT_RUNS))?;

    let runs = stmt
        .query_map(params![limit as i64], row_to_run)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Runs made over an identical table, most recent first.
pub fn find_by_fingerprint(conn: &Connection, fingerprint: &str) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE table_fingerprint = ?1 ORDER BY started_at DESC, id DESC",
        SELECT_RUNS
    ))?;

    let runs = stmt
        .query_map(params![fingerprint], row_to_run)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

pub fn get_run(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
    let run = conn
        .query_row(
            &format!("{} WHERE run_id = ?1", SELECT_RUNS),
            params![run_id],
            row_to_run,
        )
        .optional()?;
    Ok(run)
}
