//! JSON report generation.
//!
//! Writes a machine-readable run artifact for CI pipelines and later
//! diffing. One file per run, created or overwritten at the configured
//! path.
//!
//! # Format
//!
//! ```json
//! {
//!   "timestamp": "2026-08-26T12:00:00Z",
//!   "duration": 1.234,
//!   "total": 3,
//!   "passed": 2,
//!   "failed": 1,
//!   "errors": 0,
//!   "skipped": 0,
//!   "success_rate": 66.7,
//!   "results": [
//!     { "test_id": "TestMath.test_add", "status": "passed",
//!       "duration": 0.1, "error": null }
//!   ]
//! }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::Reporter;
use crate::model::{RunOutcome, RunStatus, RunSummary, TestRecord};

/// Reporter that writes a JSON artifact when the run completes.
///
/// Parent directories are created automatically. A write failure is
/// logged and never affects the run's exit status.
pub struct JsonReporter {
    output_path: PathBuf,
}

#[derive(Serialize)]
struct Artifact<'a> {
    timestamp: String,
    duration: f64,
    total: usize,
    passed: usize,
    failed: usize,
    errors: usize,
    skipped: usize,
    success_rate: f64,
    results: Vec<ResultRow<'a>>,
}

#[derive(Serialize)]
struct ResultRow<'a> {
    test_id: &'a str,
    status: RunStatus,
    duration: f64,
    error: Option<&'a str>,
}

impl JsonReporter {
    /// Creates a JSON reporter that writes to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    fn write_artifact(&self, summary: &RunSummary) -> std::io::Result<()> {
        let artifact = Artifact {
            timestamp: summary.start_time.to_rfc3339(),
            duration: summary.duration_secs(),
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            errors: summary.errored,
            skipped: summary.skipped,
            success_rate: summary.success_rate(),
            results: summary.outcomes.iter().map(row).collect(),
        };

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&artifact)?;
        std::fs::write(&self.output_path, json)
    }
}

fn row(outcome: &RunOutcome) -> ResultRow<'_> {
    ResultRow {
        test_id: &outcome.test_id,
        status: outcome.status,
        duration: outcome.duration_secs,
        error: if outcome.error_detail.is_empty() {
            None
        } else {
            Some(&outcome.error_detail)
        },
    }
}

#[async_trait]
impl Reporter for JsonReporter {
    async fn on_discovery_complete(&self, _tests: &[TestRecord]) {}

    async fn on_test_start(&self, _test: &TestRecord) {}

    async fn on_test_complete(&self, _index: usize, _planned: usize, _outcome: &RunOutcome) {}

    async fn on_run_complete(&self, summary: &RunSummary) {
        if let Err(err) = self.write_artifact(summary) {
            warn!(
                "failed to write JSON report to {}: {err}",
                self.output_path.display()
            );
        }
    }
}
