//! Test ordering and partitioning.
//!
//! The scheduler turns a discovered test set into an [`ExecutionPlan`]:
//! a priority/cost ordering split into a parallel-safe front and a
//! must-run-sequential tail. It knows nothing about workers; the
//! orchestrator decides how the plan is driven.

use crate::model::TestRecord;

/// An ordered, partitioned set of tests ready to dispatch.
///
/// `parallel` and `sequential` each preserve the global ordering:
/// ascending by (priority, estimated cost), so cheap and critical tests
/// surface failures first.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    /// Tests safe to run through the worker pool.
    pub parallel: Vec<TestRecord>,
    /// Tests that must never run concurrently with anything.
    pub sequential: Vec<TestRecord>,
}

impl ExecutionPlan {
    /// Total number of planned tests.
    pub fn len(&self) -> usize {
        self.parallel.len() + self.sequential.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parallel.is_empty() && self.sequential.is_empty()
    }
}

/// Builds execution plans from test sets.
pub struct Scheduler {
    parallel_enabled: bool,
}

impl Scheduler {
    pub fn new(parallel_enabled: bool) -> Self {
        Self { parallel_enabled }
    }

    /// Sort tests ascending by (priority, estimated cost).
    ///
    /// The sort is stable, so equal-priority equal-cost tests keep their
    /// discovery order.
    pub fn order(&self, mut tests: Vec<TestRecord>) -> Vec<TestRecord> {
        tests.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.estimated_cost_secs.total_cmp(&b.estimated_cost_secs))
        });
        tests
    }

    /// Order and partition tests into an execution plan.
    ///
    /// The parallel split only happens when parallel execution is enabled
    /// and more than one test is eligible; otherwise everything runs
    /// sequentially in sorted order.
    pub fn plan(&self, tests: Vec<TestRecord>) -> ExecutionPlan {
        let ordered = self.order(tests);

        if !self.parallel_enabled || ordered.len() < 2 {
            return ExecutionPlan {
                parallel: Vec::new(),
                sequential: ordered,
            };
        }

        let (parallel, sequential): (Vec<_>, Vec<_>) =
            ordered.into_iter().partition(|t| t.parallel_safe());

        ExecutionPlan {
            parallel,
            sequential,
        }
    }
}
