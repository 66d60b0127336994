//! The execution engine: runs one test in isolation and produces an outcome.
//!
//! `execute` never fails past its boundary. Assertion failures, panics,
//! spawn failures, and infrastructure faults all become a [`RunOutcome`]
//! with an appropriate status and bounded error text.

pub mod runner;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use crate::model::{RunOutcome, TestRecord};

pub use runner::{FnRunner, Invocation, ProcessRunner, TestFn, TestRunner, Verdict};

/// Error text stored on an outcome is cut to this many characters.
pub const MAX_ERROR_LEN: usize = 200;

/// Executes single tests with timing, flaky-retry, and fault conversion.
#[derive(Clone)]
pub struct ExecutionEngine {
    runner: Arc<dyn TestRunner>,
    retry_flaky: u32,
}

impl ExecutionEngine {
    /// Create an engine over the given invocation backend.
    ///
    /// `retry_flaky` is the maximum number of extra attempts granted to
    /// tests classified as flaky; other tests always run exactly once.
    pub fn new(runner: Arc<dyn TestRunner>, retry_flaky: u32) -> Self {
        Self {
            runner,
            retry_flaky,
        }
    }

    /// Run one test to completion.
    ///
    /// Flaky tests failing or erroring are re-invoked up to the retry
    /// budget; the recorded outcome is the last attempt, with
    /// `retry_count` set to the number of extra attempts made.
    pub async fn execute(&self, test: &TestRecord) -> RunOutcome {
        let budget = if test.is_flaky { self.retry_flaky } else { 0 };

        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let invocation = self.runner.invoke(test).await;
            let duration_secs = start.elapsed().as_secs_f64();

            if invocation.status.is_failure() && attempt < budget {
                attempt += 1;
                debug!(
                    "retrying flaky test {} (attempt {}/{})",
                    test.name,
                    attempt + 1,
                    budget + 1
                );
                continue;
            }

            return RunOutcome {
                test_id: test.name.clone(),
                status: invocation.status,
                duration_secs,
                captured_output: invocation.output,
                error_detail: truncate(&invocation.detail, MAX_ERROR_LEN),
                retry_count: attempt,
                timestamp: Utc::now(),
            };
        }
    }
}

/// Cut `text` to at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn execute_times_and_stamps() {
        let runner = FnRunner::new().bind("T.test_ok", || Verdict::Pass);
        let engine = ExecutionEngine::new(Arc::new(runner), 3);

        let outcome = engine.execute(&TestRecord::new("T.test_ok")).await;
        assert_eq!(outcome.status, RunStatus::Passed);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.duration_secs >= 0.0);
    }

    #[tokio::test]
    async fn flaky_test_retries_until_pass() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let runner = FnRunner::new().bind("T.test_flaky_x", move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Verdict::Fail("not yet".into())
            } else {
                Verdict::Pass
            }
        });
        let engine = ExecutionEngine::new(Arc::new(runner), 3);

        let outcome = engine
            .execute(&TestRecord::new("T.test_flaky_x").flaky())
            .await;
        assert_eq!(outcome.status, RunStatus::Passed);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn flaky_budget_exhausted_keeps_last_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let runner = FnRunner::new().bind("T.test_flaky_y", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Verdict::Fail("always".into())
        });
        let engine = ExecutionEngine::new(Arc::new(runner), 2);

        let outcome = engine
            .execute(&TestRecord::new("T.test_flaky_y").flaky())
            .await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_flaky_test_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let runner = FnRunner::new().bind("T.test_once", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Verdict::Fail("nope".into())
        });
        let engine = ExecutionEngine::new(Arc::new(runner), 5);

        let outcome = engine.execute(&TestRecord::new("T.test_once")).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.retry_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_detail_is_truncated() {
        let long = "x".repeat(500);
        let runner = {
            let long = long.clone();
            FnRunner::new().bind("T.test_long", move || Verdict::Error(long.clone()))
        };
        let engine = ExecutionEngine::new(Arc::new(runner), 0);

        let outcome = engine.execute(&TestRecord::new("T.test_long")).await;
        assert_eq!(outcome.status, RunStatus::Errored);
        assert_eq!(outcome.error_detail.len(), MAX_ERROR_LEN);
    }
}
