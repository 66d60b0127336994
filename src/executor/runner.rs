//! Test invocation backends.
//!
//! The engine does not know how a test actually runs; it delegates to a
//! [`TestRunner`]. Two backends are provided:
//!
//! - [`ProcessRunner`] shells out once per test and maps the exit code to
//!   an outcome, capturing stdout/stderr.
//! - [`FnRunner`] holds an explicit map from test id to an in-process
//!   closure returning a [`Verdict`]. The map is caller-owned; there is no
//!   ambient registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{RunStatus, TestRecord};

/// What a callable test unit reports back.
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass,
    Fail(String),
    Error(String),
    Skip(String),
}

/// A single invocation result before the engine adds timing and retries.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub status: RunStatus,
    /// Combined stdout/stderr captured during the invocation.
    pub output: String,
    /// Failure or error text, untruncated.
    pub detail: String,
}

impl Invocation {
    fn passed() -> Self {
        Self {
            status: RunStatus::Passed,
            output: String::new(),
            detail: String::new(),
        }
    }

    fn errored(detail: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Errored,
            output: String::new(),
            detail: detail.into(),
        }
    }
}

impl From<Verdict> for Invocation {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Pass => Invocation::passed(),
            Verdict::Fail(detail) => Invocation {
                status: RunStatus::Failed,
                output: String::new(),
                detail,
            },
            Verdict::Error(detail) => Invocation::errored(detail),
            Verdict::Skip(detail) => Invocation {
                status: RunStatus::Skipped,
                output: String::new(),
                detail,
            },
        }
    }
}

/// Invokes a single test in isolation.
///
/// Implementations must never fail past this boundary: every fault becomes
/// an [`Invocation`] with `Errored` status.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run one test to completion.
    async fn invoke(&self, test: &TestRecord) -> Invocation;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Runs each test as a child process.
///
/// The command is built from the record's own fields (`<module>.<name>` is
/// appended as the target argument); nothing is looked up by name at
/// execution time.
///
/// Exit code mapping: 0 passed, 77 skipped (automake convention),
/// 1 failed, anything else errored. A process that cannot be spawned or
/// dies to a signal is errored.
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Runner for Python unittest targets: `python -m unittest -q <target>`.
    pub fn unittest() -> Self {
        Self::new(
            "python",
            vec!["-m".to_string(), "unittest".to_string(), "-q".to_string()],
        )
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn target(test: &TestRecord) -> String {
        if test.module.is_empty() {
            test.name.clone()
        } else {
            format!("{}.{}", test.module, test.name)
        }
    }
}

#[async_trait]
impl TestRunner for ProcessRunner {
    async fn invoke(&self, test: &TestRecord) -> Invocation {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).arg(Self::target(test));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => return Invocation::errored(format!("failed to spawn {}: {}", self.program, e)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut captured = stdout.into_owned();
        if !stderr.is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(&stderr);
        }

        let status = match output.status.code() {
            Some(0) => RunStatus::Passed,
            Some(77) => RunStatus::Skipped,
            Some(1) => RunStatus::Failed,
            Some(_) | None => RunStatus::Errored,
        };

        let detail = if status.is_failure() {
            captured.lines().last().unwrap_or_default().to_string()
        } else {
            String::new()
        };

        Invocation {
            status,
            output: captured,
            detail,
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// A caller-owned closure returning a [`Verdict`].
pub type TestFn = Arc<dyn Fn() -> Verdict + Send + Sync>;

/// Runs tests as in-process closures.
///
/// Useful when the unit under test is a library callable rather than an
/// external process, and for exercising the orchestrator deterministically.
/// Panics inside a closure are caught and reported as errored outcomes.
#[derive(Default, Clone)]
pub struct FnRunner {
    runnables: HashMap<String, TestFn>,
}

impl FnRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a closure to a test id.
    pub fn bind<F>(mut self, test_id: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Verdict + Send + Sync + 'static,
    {
        self.runnables.insert(test_id.into(), Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.runnables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnables.is_empty()
    }
}

#[async_trait]
impl TestRunner for FnRunner {
    async fn invoke(&self, test: &TestRecord) -> Invocation {
        let Some(runnable) = self.runnables.get(&test.name).cloned() else {
            return Invocation::errored(format!("no runnable bound for {}", test.name));
        };

        // Closures may block; run them off the async workers and catch
        // panics so a misbehaving test cannot take the pool down.
        let result = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runnable()))
        })
        .await;

        match result {
            Ok(Ok(verdict)) => verdict.into(),
            Ok(Err(panic)) => Invocation::errored(panic_message(&panic)),
            Err(join) => Invocation::errored(format!("test task failed: {}", join)),
        }
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: <non-string payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_runner_maps_verdicts() {
        let runner = FnRunner::new()
            .bind("T.test_pass", || Verdict::Pass)
            .bind("T.test_fail", || Verdict::Fail("boom".into()))
            .bind("T.test_skip", || Verdict::Skip("not today".into()));

        let pass = runner.invoke(&TestRecord::new("T.test_pass")).await;
        assert_eq!(pass.status, RunStatus::Passed);

        let fail = runner.invoke(&TestRecord::new("T.test_fail")).await;
        assert_eq!(fail.status, RunStatus::Failed);
        assert_eq!(fail.detail, "boom");

        let skip = runner.invoke(&TestRecord::new("T.test_skip")).await;
        assert_eq!(skip.status, RunStatus::Skipped);
    }

    #[tokio::test]
    async fn unbound_test_is_errored() {
        let runner = FnRunner::new();
        let inv = runner.invoke(&TestRecord::new("T.test_missing")).await;
        assert_eq!(inv.status, RunStatus::Errored);
        assert!(inv.detail.contains("no runnable bound"));
    }

    #[tokio::test]
    async fn panic_is_caught_and_errored() {
        let runner = FnRunner::new().bind("T.test_panic", || panic!("kaboom"));
        let inv = runner.invoke(&TestRecord::new("T.test_panic")).await;
        assert_eq!(inv.status, RunStatus::Errored);
        assert!(inv.detail.contains("kaboom"));
    }

    #[test]
    fn process_target_includes_module() {
        let mut test = TestRecord::new("TestX.test_a");
        test.module = "test_mod".to_string();
        assert_eq!(ProcessRunner::target(&test), "test_mod.TestX.test_a");
    }
}
