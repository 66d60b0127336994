//! Core data model: discovered tests, execution outcomes, and run summaries.
//!
//! Everything in this module is plain data. `TestRecord`s are created once
//! per discovery pass and never mutated afterwards; `RunOutcome`s are created
//! by the execution engine at completion; `RunSummary` is the only piece of
//! state shared between workers during a run and is guarded by a single
//! mutex in the orchestrator.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Behavioral category of a test, assigned by the classifier.
///
/// Categories are mutually exclusive; the first matching heuristic wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    /// Fast, isolated unit tests.
    Unit,
    /// Medium-weight tests touching multiple components.
    Integration,
    /// Tests that exercise a remote API.
    #[serde(rename = "api")]
    ApiCall,
    /// Tests built around mocks.
    Mock,
    /// Property-based tests.
    Property,
    /// Tests known to be unstable.
    Flaky,
}

impl TestCategory {
    /// All categories, in declaration order.
    pub const ALL: [TestCategory; 6] = [
        TestCategory::Unit,
        TestCategory::Integration,
        TestCategory::ApiCall,
        TestCategory::Mock,
        TestCategory::Property,
        TestCategory::Flaky,
    ];

    /// Default cost estimate in seconds for a test of this category.
    pub fn default_cost_secs(&self) -> f64 {
        match self {
            TestCategory::Unit => 0.1,
            TestCategory::Mock => 0.05,
            TestCategory::Integration => 2.0,
            TestCategory::ApiCall => 5.0,
            TestCategory::Property => 1.0,
            TestCategory::Flaky => 1.0,
        }
    }

    /// Stable lowercase name used in config files and CLI flags.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::Unit => "unit",
            TestCategory::Integration => "integration",
            TestCategory::ApiCall => "api",
            TestCategory::Mock => "mock",
            TestCategory::Property => "property",
            TestCategory::Flaky => "flaky",
        }
    }

    /// Parse a category from its lowercase name.
    pub fn parse(s: &str) -> Option<TestCategory> {
        match s {
            "unit" => Some(TestCategory::Unit),
            "integration" => Some(TestCategory::Integration),
            "api" => Some(TestCategory::ApiCall),
            "mock" => Some(TestCategory::Mock),
            "property" => Some(TestCategory::Property),
            "flaky" => Some(TestCategory::Flaky),
            _ => None,
        }
    }
}

/// Execution priority. Lower values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPriority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

/// A discovered test and its scheduling metadata.
///
/// The qualified name is `<unit>.<method>` (e.g. `TestAuth.test_login`)
/// and serves as the test id everywhere else in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    /// Qualified name, `<unit>.<method>`.
    pub name: String,

    /// Module the test was found in (file stem).
    pub module: String,

    /// Source file the test was found in.
    pub source_path: PathBuf,

    /// 1-based line of the test method. 0 when the regex fallback matched
    /// and line precision was lost.
    pub source_line: u32,

    /// Behavioral category.
    pub category: TestCategory,

    /// Execution priority.
    pub priority: TestPriority,

    /// Heuristic cost estimate in seconds, refined by history on request.
    pub estimated_cost_secs: f64,

    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Known to be unstable.
    #[serde(default)]
    pub is_flaky: bool,

    /// Needs network access.
    #[serde(default)]
    pub requires_network: bool,

    /// Needs an authenticated session.
    #[serde(default)]
    pub requires_auth: bool,
}

impl TestRecord {
    /// Create a record with neutral defaults (Unit / Medium / 0.1s).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: String::new(),
            source_path: PathBuf::new(),
            source_line: 0,
            category: TestCategory::Unit,
            priority: TestPriority::Medium,
            estimated_cost_secs: TestCategory::Unit.default_cost_secs(),
            tags: BTreeSet::new(),
            is_flaky: false,
            requires_network: false,
            requires_auth: false,
        }
    }

    /// Set the category and reset the cost estimate to its default.
    pub fn with_category(mut self, category: TestCategory) -> Self {
        self.category = category;
        self.estimated_cost_secs = category.default_cost_secs();
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the cost estimate.
    pub fn with_cost(mut self, secs: f64) -> Self {
        self.estimated_cost_secs = secs;
        self
    }

    /// Mark as flaky.
    pub fn flaky(mut self) -> Self {
        self.is_flaky = true;
        self
    }

    /// Mark as requiring an authenticated session.
    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Whether this test may run concurrently with others.
    ///
    /// Tests holding an auth session or known to be flaky are isolated to
    /// the sequential tail.
    pub fn parallel_safe(&self) -> bool {
        !(self.requires_auth || self.is_flaky)
    }
}

/// Outcome status of a single test execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Test passed.
    Passed,
    /// Assertion-level failure.
    Failed,
    /// Unexpected fault (setup, load, panic, infrastructure).
    #[serde(rename = "error")]
    Errored,
    /// Test declined to run.
    Skipped,
}

impl RunStatus {
    /// `true` for Failed or Errored.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Errored => "error",
            RunStatus::Skipped => "skipped",
        }
    }

    /// Parse a status from its stored name.
    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "passed" => Some(RunStatus::Passed),
            "failed" => Some(RunStatus::Failed),
            "error" => Some(RunStatus::Errored),
            "skipped" => Some(RunStatus::Skipped),
            _ => None,
        }
    }
}

/// Result of one test execution attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Qualified test name.
    pub test_id: String,

    /// Final status of the (possibly retried) execution.
    pub status: RunStatus,

    /// Wall-clock duration including setup/teardown, in seconds.
    pub duration_secs: f64,

    /// Output captured during execution.
    #[serde(default)]
    pub captured_output: String,

    /// Error text, truncated for storage/display.
    #[serde(default)]
    pub error_detail: String,

    /// Number of extra attempts beyond the first.
    #[serde(default)]
    pub retry_count: u32,

    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

/// Aggregated result of one orchestrator invocation.
///
/// Outcomes are kept in completion order, which for parallel tests is not
/// the dispatch order. Mutated only through [`record`](Self::record) under
/// the orchestrator's mutex, and frozen once [`finish`](Self::finish) sets
/// the end time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub outcomes: Vec<RunOutcome>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Create an empty summary starting now.
    pub fn new() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            skipped: 0,
            outcomes: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Append an outcome and bump the matching counter.
    pub fn record(&mut self, outcome: RunOutcome) {
        match outcome.status {
            RunStatus::Passed => self.passed += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Errored => self.errored += 1,
            RunStatus::Skipped => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Seal the summary. No mutation is valid after this.
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Whether the run has completed.
    pub fn finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Percentage of passed tests in [0, 100]; 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.passed as f64 / self.total as f64) * 100.0
    }

    /// Wall-clock duration in seconds; measured against now while running.
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// `true` iff no test failed or errored.
    pub fn success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Process exit code for the CLI: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: RunStatus) -> RunOutcome {
        RunOutcome {
            test_id: id.to_string(),
            status,
            duration_secs: 0.01,
            captured_output: String::new(),
            error_detail: String::new(),
            retry_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn parallel_safe_derivation() {
        assert!(TestRecord::new("T.test_a").parallel_safe());
        assert!(!TestRecord::new("T.test_a").flaky().parallel_safe());
        assert!(!TestRecord::new("T.test_a").requires_auth().parallel_safe());
    }

    #[test]
    fn success_rate_zero_when_empty() {
        let summary = RunSummary::new();
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn success_rate_bounds() {
        let mut summary = RunSummary::new();
        summary.total = 4;
        summary.record(outcome("a", RunStatus::Passed));
        summary.record(outcome("b", RunStatus::Passed));
        summary.record(outcome("c", RunStatus::Failed));
        summary.record(outcome("d", RunStatus::Skipped));
        assert_eq!(summary.success_rate(), 50.0);
        assert_eq!(
            summary.passed + summary.failed + summary.errored + summary.skipped,
            summary.total
        );
        assert!(!summary.success());
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn finish_seals_summary() {
        let mut summary = RunSummary::new();
        assert!(!summary.finished());
        summary.finish();
        assert!(summary.finished());
    }

    #[test]
    fn category_roundtrip() {
        for cat in TestCategory::ALL {
            assert_eq!(TestCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(TestCategory::parse("nope"), None);
    }

    #[test]
    fn priority_order_runs_critical_first() {
        assert!(TestPriority::Critical < TestPriority::High);
        assert!(TestPriority::High < TestPriority::Medium);
        assert!(TestPriority::Medium < TestPriority::Low);
    }
}
