//! Derived recommendations over stored history.
//!
//! The analyzer reads the store; it never writes. Recommendations are
//! heuristic and recomputed from scratch each call.

use serde::Serialize;

use super::{AnalyticsStore, StoreResult};

/// Trailing window used for recommendations, in days.
const INSIGHT_WINDOW_DAYS: i64 = 7;

/// Tests averaging at or below this many seconds are not worth
/// parallelizing and are left out of the suggestion entirely.
const CANDIDATE_THRESHOLD_SECS: f64 = 0.5;

/// Tests averaging below this many seconds count as fast.
const FAST_CUTOFF_SECS: f64 = 1.0;
/// Tests averaging at or above this many seconds count as slow.
const SLOW_CUTOFF_SECS: f64 = 5.0;

/// Suggested worker count and the estimated effect of using it.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelizationPlan {
    pub fast_tests: usize,
    pub medium_tests: usize,
    pub slow_tests: usize,
    pub suggested_workers: usize,
    pub estimated_speedup: f64,
}

/// Read-only analysis over an [`AnalyticsStore`].
pub struct PerformanceAnalyzer<'a> {
    store: &'a AnalyticsStore,
}

impl<'a> PerformanceAnalyzer<'a> {
    pub fn new(store: &'a AnalyticsStore) -> Self {
        Self { store }
    }

    /// Suggest a worker count from the recent duration profile.
    ///
    /// Only tests averaging over half a second are considered. Candidates
    /// are bucketed by average duration; the suggestion is the number of
    /// medium and slow tests, clamped to [2, 8]. With no candidates the
    /// suggestion is the floor with a speedup of 1.0.
    pub fn suggest_parallelization(&self) -> StoreResult<ParallelizationPlan> {
        let candidates = self
            .store
            .slow_tests(CANDIDATE_THRESHOLD_SECS, INSIGHT_WINDOW_DAYS)?;

        let mut fast = 0;
        let mut medium = 0;
        let mut slow = 0;
        let mut sequential_secs = 0.0;
        for m in &candidates {
            if m.avg_duration < FAST_CUTOFF_SECS {
                fast += 1;
            } else if m.avg_duration < SLOW_CUTOFF_SECS {
                medium += 1;
            } else {
                slow += 1;
            }
            sequential_secs += m.avg_duration;
        }

        let suggested_workers = (medium + slow).clamp(2, 8);
        let estimated_speedup = if sequential_secs > 0.0 {
            sequential_secs / (sequential_secs / suggested_workers as f64)
        } else {
            1.0
        };

        Ok(ParallelizationPlan {
            fast_tests: fast,
            medium_tests: medium,
            slow_tests: slow,
            suggested_workers,
            estimated_speedup,
        })
    }

    /// Test ids ordered to surface likely failures first: most failures,
    /// then longest average duration.
    pub fn optimize_execution_order(&self) -> StoreResult<Vec<String>> {
        let mut metrics = self.store.slow_tests(0.0, INSIGHT_WINDOW_DAYS)?;
        metrics.sort_by(|a, b| {
            b.failures
                .cmp(&a.failures)
                .then(b.avg_duration.total_cmp(&a.avg_duration))
        });
        Ok(metrics.into_iter().map(|m| m.test_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunOutcome, RunStatus, RunSummary};
    use chrono::Utc;

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

    fn record(store: &mut AnalyticsStore, outcomes: Vec<RunOutcome>) {
        let mut summary = RunSummary::new();
        summary.total = outcomes.len();
        for o in outcomes {
            summary.record(o);
        }
        summary.finish();
        store.record_execution(&summary, false, 1).unwrap();
    }

    #[test]
    fn empty_history_suggests_the_floor() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let plan = PerformanceAnalyzer::new(&store)
            .suggest_parallelization()
            .unwrap();
        assert_eq!(plan.suggested_workers, 2);
        assert_eq!(plan.estimated_speedup, 1.0);
        assert_eq!(plan.fast_tests + plan.medium_tests + plan.slow_tests, 0);
    }

    #[test]
    fn buckets_follow_average_duration() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        record(
            &mut store,
            vec![
                outcome("fast", RunStatus::Passed, 0.7),
                outcome("medium_a", RunStatus::Passed, 2.0),
                outcome("medium_b", RunStatus::Passed, 3.0),
                outcome("slow", RunStatus::Passed, 7.0),
            ],
        );

        let plan = PerformanceAnalyzer::new(&store)
            .suggest_parallelization()
            .unwrap();
        assert_eq!(plan.fast_tests, 1);
        assert_eq!(plan.medium_tests, 2);
        assert_eq!(plan.slow_tests, 1);
        assert_eq!(plan.suggested_workers, 3);
        assert!(plan.estimated_speedup > 1.0);
    }

    #[test]
    fn sub_threshold_tests_are_not_candidates() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        record(
            &mut store,
            vec![
                outcome("quick_a", RunStatus::Passed, 0.2),
                outcome("quick_b", RunStatus::Passed, 0.4),
            ],
        );

        // Nothing averages over half a second, so the plan is the floor.
        let plan = PerformanceAnalyzer::new(&store)
            .suggest_parallelization()
            .unwrap();
        assert_eq!(plan.fast_tests, 0);
        assert_eq!(plan.medium_tests, 0);
        assert_eq!(plan.slow_tests, 0);
        assert_eq!(plan.suggested_workers, 2);
        assert_eq!(plan.estimated_speedup, 1.0);
    }

    #[test]
    fn worker_suggestion_is_clamped() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        let outcomes: Vec<_> = (0..12)
            .map(|i| outcome(&format!("slow_{i}"), RunStatus::Passed, 6.0))
            .collect();
        record(&mut store, outcomes);

        let plan = PerformanceAnalyzer::new(&store)
            .suggest_parallelization()
            .unwrap();
        assert_eq!(plan.suggested_workers, 8);
    }

    #[test]
    fn execution_order_puts_failing_tests_first() {
        let mut store = AnalyticsStore::open_in_memory().unwrap();
        for _ in 0..3 {
            record(
                &mut store,
                vec![
                    outcome("steady", RunStatus::Passed, 4.0),
                    outcome("shaky", RunStatus::Failed, 0.5),
                    outcome("quick", RunStatus::Passed, 0.1),
                ],
            );
        }

        let order = PerformanceAnalyzer::new(&store)
            .optimize_execution_order()
            .unwrap();
        assert_eq!(order[0], "shaky");
        assert_eq!(order[1], "steady");
        assert_eq!(order[2], "quick");
    }
}
