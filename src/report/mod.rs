//! Run reporting and output generation.

pub mod json;

use async_trait::async_trait;
use console::style;

use crate::analytics::{ParallelizationPlan, TestMetrics, WindowStats};
use crate::model::{RunOutcome, RunStatus, RunSummary, TestRecord};

pub use json::JsonReporter;

/// A reporter receives events during a test run.
///
/// `index` on completion events is the number of outcomes recorded so
/// far; with parallel workers completion order is not plan order.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called when test discovery is complete.
    async fn on_discovery_complete(&self, tests: &[TestRecord]);

    /// Called when a test is dispatched.
    async fn on_test_start(&self, test: &TestRecord);

    /// Called when a test completes.
    async fn on_test_complete(&self, index: usize, planned: usize, outcome: &RunOutcome);

    /// Called once after the summary is sealed.
    async fn on_run_complete(&self, summary: &RunSummary);
}

/// A reporter that does nothing (for testing or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_discovery_complete(&self, _tests: &[TestRecord]) {}
    async fn on_test_start(&self, _test: &TestRecord) {}
    async fn on_test_complete(&self, _index: usize, _planned: usize, _outcome: &RunOutcome) {}
    async fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// A reporter that fans events out to multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Add a reporter to the multi-reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_discovery_complete(&self, tests: &[TestRecord]) {
        for reporter in &self.reporters {
            reporter.on_discovery_complete(tests).await;
        }
    }

    async fn on_test_start(&self, test: &TestRecord) {
        for reporter in &self.reporters {
            reporter.on_test_start(test).await;
        }
    }

    async fn on_test_complete(&self, index: usize, planned: usize, outcome: &RunOutcome) {
        for reporter in &self.reporters {
            reporter.on_test_complete(index, planned, outcome).await;
        }
    }

    async fn on_run_complete(&self, summary: &RunSummary) {
        for reporter in &self.reporters {
            reporter.on_run_complete(summary).await;
        }
    }
}

/// Console reporter that shows progress in the terminal.
pub struct ConsoleReporter {
    progress: std::sync::Mutex<Option<indicatif::ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: std::sync::Mutex::new(None),
            verbose,
        }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_discovery_complete(&self, tests: &[TestRecord]) {
        println!("Discovered {} tests", tests.len());

        let pb = indicatif::ProgressBar::new(tests.len() as u64);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        *self.progress.lock().unwrap() = Some(pb);
    }

    async fn on_test_start(&self, test: &TestRecord) {
        if self.verbose {
            println!("Running: {}", test.name);
        }
    }

    async fn on_test_complete(&self, index: usize, planned: usize, outcome: &RunOutcome) {
        let line = completion_line(outcome);

        let guard = self.progress.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.inc(1);
            if self.verbose || outcome.status != RunStatus::Passed {
                pb.println(line);
            }
        } else if self.verbose || outcome.status != RunStatus::Passed {
            println!("[{index}/{planned}] {line}");
        }
    }

    async fn on_run_complete(&self, summary: &RunSummary) {
        if let Some(pb) = self.progress.lock().unwrap().take() {
            pb.finish_and_clear();
        }

        println!();
        println!("Test Results:");
        println!("  Total:   {}", summary.total);
        println!("  Passed:  {}", style(summary.passed).green());
        println!("  Failed:  {}", style(summary.failed).red());
        println!("  Errors:  {}", style(summary.errored).red());
        println!("  Skipped: {}", style(summary.skipped).yellow());
        println!("  Success: {:.1}%", summary.success_rate());
        println!("  Duration: {:.2}s", summary.duration_secs());

        if summary.success() {
            println!();
            println!("{}", style("All tests passed!").green().bold());
            return;
        }

        println!();
        println!("{}", style("Some tests failed.").red().bold());
        println!();
        println!("Failed tests:");
        for outcome in &summary.outcomes {
            if !outcome.status.is_failure() {
                continue;
            }
            println!("  - {}", outcome.test_id);
            if !outcome.error_detail.is_empty() {
                println!("    {}", style(&outcome.error_detail).dim());
            }
            if self.verbose && !outcome.captured_output.is_empty() {
                println!("    {}", style("output:").dim());
                for line in outcome.captured_output.lines() {
                    println!("      {line}");
                }
            }
        }
    }
}

/// One line per completed test: status, name, duration, retries.
fn completion_line(outcome: &RunOutcome) -> String {
    let status = match outcome.status {
        RunStatus::Passed => style("PASS").green(),
        RunStatus::Failed => style("FAIL").red(),
        RunStatus::Skipped => style("SKIP").yellow(),
        RunStatus::Errored => style("ERR ").red().bold(),
    };

    let mut line = format!(
        "{} {} ({:.3}s)",
        status, outcome.test_id, outcome.duration_secs
    );
    if outcome.retry_count > 0 {
        line.push_str(&format!(" (retried {}x)", outcome.retry_count));
    }
    line
}

/// Print a windowed metrics table, one row per test.
pub fn print_metrics(title: &str, metrics: &[TestMetrics]) {
    println!("{}", style(title).bold());
    if metrics.is_empty() {
        println!("  (none)");
        return;
    }
    for m in metrics {
        println!(
            "  {:<50} runs {:>4}  fail {:>3}  avg {:>7.2}s  flakiness {:.2}",
            m.test_id, m.total_runs, m.failures, m.avg_duration, m.flakiness_score
        );
    }
}

/// Print aggregate statistics for recent runs.
pub fn print_window_stats(days: i64, stats: &WindowStats) {
    println!("{}", style(format!("Last {days} days")).bold());
    println!("  Executions:   {}", stats.total_executions);
    println!("  Avg duration: {:.2}s", stats.avg_duration);
    println!("  Avg success:  {:.1}%", stats.avg_success_rate);
    println!(
        "  Outcomes:     {} passed, {} failed, {} errors",
        style(stats.total_passed).green(),
        style(stats.total_failed).red(),
        style(stats.total_errors).red()
    );
}

/// Print a parallelization suggestion.
pub fn print_parallelization(plan: &ParallelizationPlan) {
    println!("{}", style("Parallelization").bold());
    println!(
        "  Profile:   {} fast, {} medium, {} slow",
        plan.fast_tests, plan.medium_tests, plan.slow_tests
    );
    println!("  Suggested workers: {}", plan.suggested_workers);
    println!("  Estimated speedup: {:.1}x", plan.estimated_speedup);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn outcome(status: RunStatus, duration: f64, retries: u32) -> RunOutcome {
        RunOutcome {
            test_id: "TestAuth.test_login".into(),
            status,
            duration_secs: duration,
            captured_output: String::new(),
            error_detail: String::new(),
            retry_count: retries,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn completion_line_carries_name_duration_and_status() {
        let line = completion_line(&outcome(RunStatus::Passed, 0.1234, 0));
        assert!(line.contains("TestAuth.test_login"));
        assert!(line.contains("(0.123s)"));
        assert!(line.contains("PASS"));
        assert!(!line.contains("retried"));
    }

    #[test]
    fn completion_line_notes_retries() {
        let line = completion_line(&outcome(RunStatus::Failed, 2.5, 2));
        assert!(line.contains("(2.500s)"));
        assert!(line.contains("(retried 2x)"));
        assert!(line.contains("FAIL"));
    }
}
