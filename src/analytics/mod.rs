//! Durable run history and windowed test metrics.
//!
//! The store is an append-only SQLite log of `(run, outcome)` pairs. Rows
//! are never updated or deleted by normal operation; aggregate metrics are
//! recomputed on demand from the raw rows, never cached across window
//! parameters. Single-writer access is assumed: one orchestrator process
//! writes at a time.
//!
//! # Tables
//!
//! - `executions`: one row per orchestrator run (aggregate counts,
//!   duration, worker count, parallel flag)
//! - `test_results`: one row per per-test outcome, FK to its run
//!
//! Timestamps are RFC 3339 UTC text, so lexicographic comparison matches
//! chronological order and the timestamp index serves windowed queries.

pub mod insights;

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::model::RunSummary;

pub use insights::{ParallelizationPlan, PerformanceAnalyzer};

/// Persistence failures. Surfaced to the store's caller; never corrupts
/// an in-memory summary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    duration REAL NOT NULL,
    total INTEGER NOT NULL,
    passed INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    errors INTEGER NOT NULL,
    success_rate REAL NOT NULL,
    parallel INTEGER NOT NULL,
    workers INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_timestamp
    ON executions(timestamp);

CREATE TABLE IF NOT EXISTS test_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id INTEGER NOT NULL REFERENCES executions(id),
    test_id TEXT NOT NULL,
    status TEXT NOT NULL,
    duration REAL NOT NULL,
    error TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_results_test
    ON test_results(test_id, timestamp);
"#;

/// Aggregate metrics for one test over a trailing window.
///
/// Computed on demand; a test with no history in the window yields the
/// zero value rather than an error. All rates are division-by-zero
/// guarded.
#[derive(Debug, Clone, Serialize)]
pub struct TestMetrics {
    pub test_id: String,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub total_runs: u64,
    pub failures: u64,
    /// failures / total_runs, in [0, 1].
    pub flakiness_score: f64,
    /// (total_runs - failures) / total_runs * 100, in [0, 100].
    pub success_rate: f64,
    pub last_run: Option<DateTime<Utc>>,
}

impl TestMetrics {
    /// The zero value for a test with no recorded history.
    pub fn empty(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            avg_duration: 0.0,
            min_duration: 0.0,
            max_duration: 0.0,
            total_runs: 0,
            failures: 0,
            flakiness_score: 0.0,
            success_rate: 0.0,
            last_run: None,
        }
    }

    fn from_aggregates(
        test_id: String,
        avg: f64,
        min: f64,
        max: f64,
        total: u64,
        failures: u64,
        last_run: Option<DateTime<Utc>>,
    ) -> Self {
        let (flakiness_score, success_rate) = if total > 0 {
            (
                failures as f64 / total as f64,
                (total - failures) as f64 / total as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            test_id,
            avg_duration: avg,
            min_duration: min,
            max_duration: max,
            total_runs: total,
            failures,
            flakiness_score,
            success_rate,
            last_run,
        }
    }
}

/// Aggregate statistics over all runs in a window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub total_executions: u64,
    pub avg_duration: f64,
    pub avg_success_rate: f64,
    pub total_passed: u64,
    pub total_failed: u64,
    pub total_errors: u64,
}

/// Append-only store of execution history.
pub struct AnalyticsStore {
    conn: Connection,
}

impl AnalyticsStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Persist one completed run and all of its outcomes, atomically.
    ///
    /// Call exactly once per run; the store does not deduplicate.
    /// Returns the new run row id.
    pub fn record_execution(
        &mut self,
        summary: &RunSummary,
        parallel: bool,
        workers: usize,
    ) -> StoreResult<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO executions
             (timestamp, duration, total, passed, failed, errors, success_rate, parallel, workers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                summary.start_time.to_rfc3339(),
                summary.duration_secs(),
                summary.total as i64,
                summary.passed as i64,
                summary.failed as i64,
                summary.errored as i64,
                summary.success_rate(),
                parallel as i64,
                workers as i64,
            ],
        )?;
        let execution_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO test_results
                 (execution_id, test_id, status, duration, error, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for outcome in &summary.outcomes {
                stmt.execute(params![
                    execution_id,
                    outcome.test_id,
                    outcome.status.as_str(),
                    outcome.duration_secs,
                    if outcome.error_detail.is_empty() {
                        None
                    } else {
                        Some(outcome.error_detail.as_str())
                    },
                    outcome.timestamp.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(execution_id)
    }

    /// Metrics for one test over the trailing `days` window.
    pub fn test_metrics(&self, test_id: &str, days: i64) -> StoreResult<TestMetrics> {
        let cutoff = window_cutoff(days);

        let mut stmt = self.conn.prepare(
            "SELECT AVG(duration), MIN(duration), MAX(duration), COUNT(*),
                    SUM(CASE WHEN status != 'passed' THEN 1 ELSE 0 END),
                    MAX(timestamp)
             FROM test_results
             WHERE test_id = ?1 AND timestamp > ?2",
        )?;

        let row = stmt.query_row(params![test_id, cutoff], |row| {
            Ok((
                row.get::<_, Option<f64>>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, Option<u64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let (avg, min, max, total, failures, last_run) = row;
        if total == 0 {
            return Ok(TestMetrics::empty(test_id));
        }

        Ok(TestMetrics::from_aggregates(
            test_id.to_string(),
            avg.unwrap_or(0.0),
            min.unwrap_or(0.0),
            max.unwrap_or(0.0),
            total,
            failures.unwrap_or(0),
            last_run.and_then(|t| parse_timestamp(&t)),
        ))
    }

    /// Tests whose flakiness score strictly exceeds `threshold`, ordered
    /// by failure count descending. A score exactly at the threshold is
    /// excluded.
    pub fn flaky_tests(&self, threshold: f64, days: i64) -> StoreResult<Vec<TestMetrics>> {
        let cutoff = window_cutoff(days);

        let mut stmt = self.conn.prepare(
            "SELECT test_id, AVG(duration), MIN(duration), MAX(duration), COUNT(*),
                    SUM(CASE WHEN status != 'passed' THEN 1 ELSE 0 END),
                    MAX(timestamp)
             FROM test_results
             WHERE timestamp > ?1
             GROUP BY test_id
             HAVING (CAST(SUM(CASE WHEN status != 'passed' THEN 1 ELSE 0 END) AS REAL)
                     / COUNT(*)) > ?2
             ORDER BY SUM(CASE WHEN status != 'passed' THEN 1 ELSE 0 END) DESC",
        )?;

        let rows = stmt.query_map(params![cutoff, threshold], metrics_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Tests whose average duration strictly exceeds `threshold_secs`,
    /// ordered by average duration descending.
    pub fn slow_tests(&self, threshold_secs: f64, days: i64) -> StoreResult<Vec<TestMetrics>> {
        let cutoff = window_cutoff(days);

        let mut stmt = self.conn.prepare(
            "SELECT test_id, AVG(duration), MIN(duration), MAX(duration), COUNT(*),
                    SUM(CASE WHEN status != 'passed' THEN 1 ELSE 0 END),
                    MAX(timestamp)
             FROM test_results
             WHERE timestamp > ?1
             GROUP BY test_id
             HAVING AVG(duration) > ?2
             ORDER BY AVG(duration) DESC",
        )?;

        let rows = stmt.query_map(params![cutoff, threshold_secs], metrics_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Aggregate run statistics over the trailing window.
    pub fn window_stats(&self, days: i64) -> StoreResult<WindowStats> {
        let cutoff = window_cutoff(days);

        let mut stmt = self.conn.prepare(
            "SELECT COUNT(*),
                    COALESCE(AVG(duration), 0),
                    COALESCE(AVG(success_rate), 0),
                    COALESCE(SUM(passed), 0),
                    COALESCE(SUM(failed), 0),
                    COALESCE(SUM(errors), 0)
             FROM executions
             WHERE timestamp > ?1",
        )?;

        stmt.query_row(params![cutoff], |row| {
            Ok(WindowStats {
                total_executions: row.get(0)?,
                avg_duration: row.get(1)?,
                avg_success_rate: row.get(2)?,
                total_passed: row.get(3)?,
                total_failed: row.get(4)?,
                total_errors: row.get(5)?,
            })
        })
        .map_err(Into::into)
    }
}

fn metrics_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestMetrics> {
    let test_id: String = row.get(0)?;
    let last_run: Option<String> = row.get(6)?;
    Ok(TestMetrics::from_aggregates(
        test_id,
        row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
        row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        row.get(4)?,
        row.get::<_, Option<u64>>(5)?.unwrap_or(0),
        last_run.and_then(|t| parse_timestamp(&t)),
    ))
}

fn window_cutoff(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunOutcome, RunStatus};

    fn outcome(id: &str, status: RunStatus, duration: f64) -> RunOutcome {
        RunOutcome {
            test_id: id.to_string(),
            status,
            duration_secs: duration,
            captured_output: String::new(),
            error_detail: String::new(),
            retry_count: 0,
            timestamp: Utc::now(),
        }
    }

    fn summary_of(outcomes: Vec<RunOutcome>) -> RunSummary {
        let mut summary = RunSummary::new();
        summary.total = outcomes.len();
        for o in outcomes {
            summary.record(o);
        }
        summary.finish();
        summary
    }

    /// Ten runs of test X, three of them failing.
    fn store_with_history() -> AnalyticsStore {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        for i in 0..10 {
            let status = if i < 3 {
                RunStatus::Failed
            } else {
                RunStatus::Passed
            };
            let summary = summary_of(vec![outcome("X", status, 0.5)]);
            store.record_execution(&summary, false, 1).unwrap();
        }
        store
    }

    #[test]
    fn empty_store_yields_zero_metrics() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let metrics = store.test_metrics("ghost", 30).unwrap();
        assert_eq!(metrics.total_runs, 0);
        assert_eq!(metrics.flakiness_score, 0.0);
        assert_eq!(metrics.success_rate, 0.0);
        assert!(metrics.last_run.is_none());
    }

    #[test]
    fn flakiness_score_from_history() {
        let store = store_with_history();
        let metrics = store.test_metrics("X", 7).unwrap();
        assert_eq!(metrics.total_runs, 10);
        assert_eq!(metrics.failures, 3);
        assert!((metrics.flakiness_score - 0.3).abs() < 1e-9);
        assert!((metrics.success_rate - 70.0).abs() < 1e-9);
        assert!(metrics.last_run.is_some());
    }

    #[test]
    fn flaky_threshold_is_strictly_exclusive() {
        let store = store_with_history();

        let over = store.flaky_tests(0.2, 7).unwrap();
        assert!(over.iter().any(|m| m.test_id == "X"));

        let under = store.flaky_tests(0.5, 7).unwrap();
        assert!(!under.iter().any(|m| m.test_id == "X"));

        // Boundary: score exactly at the threshold is excluded.
        let boundary = store.flaky_tests(0.3, 7).unwrap();
        assert!(!boundary.iter().any(|m| m.test_id == "X"));
    }

    #[test]
    fn flaky_tests_ordered_by_failures_desc() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        for _ in 0..5 {
            let summary = summary_of(vec![
                outcome("often", RunStatus::Failed, 0.1),
                outcome("rarely", RunStatus::Passed, 0.1),
            ]);
            store.record_execution(&summary, false, 1).unwrap();
        }
        let summary = summary_of(vec![
            outcome("often", RunStatus::Failed, 0.1),
            outcome("rarely", RunStatus::Failed, 0.1),
        ]);
        store.record_execution(&summary, false, 1).unwrap();

        let flaky = store.flaky_tests(0.1, 7).unwrap();
        assert_eq!(flaky[0].test_id, "often");
        assert_eq!(flaky[0].failures, 6);
    }

    #[test]
    fn slow_tests_ordered_by_avg_desc() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        let summary = summary_of(vec![
            outcome("fast", RunStatus::Passed, 0.1),
            outcome("slow", RunStatus::Passed, 6.0),
            outcome("medium", RunStatus::Passed, 2.0),
        ]);
        store.record_execution(&summary, true, 4).unwrap();

        let slow = store.slow_tests(1.0, 7).unwrap();
        let ids: Vec<&str> = slow.iter().map(|m| m.test_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "medium"]);
    }

    #[test]
    fn record_execution_is_atomic_and_returns_id() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        let summary = summary_of(vec![outcome("a", RunStatus::Passed, 0.1)]);
        let first = store.record_execution(&summary, true, 2).unwrap();
        let second = store.record_execution(&summary, true, 2).unwrap();
        assert!(second > first);

        let stats = store.window_stats(7).unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.total_passed, 2);
    }

    #[test]
    fn window_excludes_old_rows() {
        let store = store_with_history();
        // A window of zero days has its cutoff at "now"; rows written just
        // before it fall outside.
        let metrics = store.test_metrics("X", -1).unwrap();
        assert_eq!(metrics.total_runs, 0);
    }
}
