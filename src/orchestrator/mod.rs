//! Run orchestration: drive an execution plan through the engine.
//!
//! The orchestrator consumes discovered tests plus an [`ExecutionConfig`]
//! and produces one [`RunSummary`]. Parallel-safe tests go through a
//! bounded worker pool; auth-holding and flaky tests run strictly
//! sequentially afterwards. The summary is the only shared mutable state
//! and is guarded by a single mutex; every worker appends outcomes in
//! completion order.
//!
//! # Execution Flow
//!
//! 1. Filter by configured categories
//! 2. Order by (priority, estimated cost) and partition by parallel safety
//! 3. Dispatch the parallel front through `max_workers` permits
//! 4. Run the sequential tail in plan order
//! 5. Seal and return the summary
//!
//! Cancellation is cooperative: fail-fast (or an external caller) cancels
//! the token, which stops new dispatch but lets in-flight work finish.

pub mod scheduler;

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExecutionConfig;
use crate::executor::{ExecutionEngine, TestRunner};
use crate::model::{RunOutcome, RunSummary, TestRecord};
use crate::report::Reporter;

pub use scheduler::{ExecutionPlan, Scheduler};

/// Coordinates one test run end to end.
pub struct Orchestrator {
    config: ExecutionConfig,
    engine: ExecutionEngine,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over an invocation backend and a reporter.
    pub fn new(
        config: ExecutionConfig,
        runner: Arc<dyn TestRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let engine = ExecutionEngine::new(runner, config.retry_flaky);
        Self {
            config,
            engine,
            reporter,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops new dispatch when cancelled. In-flight tests are
    /// never force-killed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the given tests and return the sealed summary.
    ///
    /// `total` on the summary counts dispatched tests; under fail-fast a
    /// never-dispatched test contributes neither an outcome nor a count.
    pub async fn run(&self, tests: Vec<TestRecord>) -> RunSummary {
        let tests: Vec<TestRecord> = tests
            .into_iter()
            .filter(|t| self.config.category_enabled(t.category))
            .collect();

        let scheduler = Scheduler::new(self.config.parallel);
        let plan = scheduler.plan(tests);
        let planned = plan.len();

        info!(
            "running {} tests ({} parallel-safe, {} sequential, {} workers)",
            planned,
            plan.parallel.len(),
            plan.sequential.len(),
            self.config.max_workers
        );

        let summary = Arc::new(Mutex::new(RunSummary::new()));

        self.run_parallel(plan.parallel, planned, &summary).await;
        self.run_sequential(plan.sequential, planned, &summary).await;

        let mut summary = summary.lock().await;
        summary.finish();
        self.reporter.on_run_complete(&summary).await;
        summary.clone()
    }

    /// Dispatch the parallel-safe front through the bounded worker pool.
    async fn run_parallel(
        &self,
        tests: Vec<TestRecord>,
        planned: usize,
        summary: &Arc<Mutex<RunSummary>>,
    ) {
        if tests.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut workers: JoinSet<()> = JoinSet::new();

        for test in tests {
            if self.cancel.is_cancelled() {
                debug!("stop requested, not dispatching {}", test.name);
                break;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            // A failure may have landed while we waited for a permit.
            if self.cancel.is_cancelled() {
                break;
            }

            summary.lock().await.total += 1;
            self.reporter.on_test_start(&test).await;

            let engine = self.engine.clone();
            let reporter = self.reporter.clone();
            let summary = summary.clone();
            let cancel = self.cancel.clone();
            let fail_fast = self.config.fail_fast;

            workers.spawn(async move {
                let outcome = engine.execute(&test).await;
                let _permit = permit;

                let index = {
                    let mut summary = summary.lock().await;
                    summary.record(outcome.clone());
                    summary.outcomes.len()
                };
                reporter.on_test_complete(index, planned, &outcome).await;

                if fail_fast && outcome.status.is_failure() {
                    info!("fail-fast: stopping new dispatch after {}", outcome.test_id);
                    cancel.cancel();
                }
            });
        }

        // Let in-flight work finish; cancellation never kills workers.
        while workers.join_next().await.is_some() {}
    }

    /// Run the sequential tail strictly in plan order.
    async fn run_sequential(
        &self,
        tests: Vec<TestRecord>,
        planned: usize,
        summary: &Arc<Mutex<RunSummary>>,
    ) {
        for test in tests {
            if self.cancel.is_cancelled() {
                debug!("stop requested, skipping {}", test.name);
                break;
            }

            summary.lock().await.total += 1;
            self.reporter.on_test_start(&test).await;

            let outcome = self.engine.execute(&test).await;

            let index = {
                let mut summary = summary.lock().await;
                summary.record(outcome.clone());
                summary.outcomes.len()
            };
            self.reporter.on_test_complete(index, planned, &outcome).await;

            if self.config.fail_fast && outcome.status.is_failure() {
                info!("fail-fast: stopping after {}", outcome.test_id);
                self.cancel.cancel();
                break;
            }
        }
    }
}

/// Convenience: outcomes as (test_id, status) pairs for order-insensitive
/// comparison.
pub fn outcome_multiset(summary: &RunSummary) -> Vec<(String, crate::model::RunStatus)> {
    let mut pairs: Vec<_> = summary
        .outcomes
        .iter()
        .map(|o: &RunOutcome| (o.test_id.clone(), o.status))
        .collect();
    pairs.sort();
    pairs
}
