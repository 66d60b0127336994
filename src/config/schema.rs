//! Configuration schema definitions for conductor.
//!
//! All types deserialize from a TOML file. The schema mirrors the runtime
//! split of the engine:
//!
//! ```text
//! Config (root)
//! ├── ExecutionConfig   - worker count, parallel/fail-fast policy, retries
//! ├── DiscoveryConfig   - roots, file pattern, type/method markers
//! ├── AnalyticsConfig   - history database location and window defaults
//! └── ReportConfig      - JSON report artifact settings
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::TestCategory;

/// Root configuration loaded from `conductor.toml`.
///
/// # Example
///
/// ```
/// use conductor::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [run]
///     max_workers = 2
///     parallel = true
///
///     [discovery]
///     roots = ["tests"]
/// "#).unwrap();
/// assert_eq!(config.run.max_workers, 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Execution policy (worker count, fail-fast, retries).
    #[serde(default)]
    pub run: ExecutionConfig,

    /// Where and how tests are discovered.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Historical metrics store.
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Report artifact output.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Execution policy for a single orchestrator run.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `max_workers` | 4 |
/// | `parallel` | true |
/// | `fail_fast` | false |
/// | `retry_flaky` | 3 |
/// | `verbose` | false |
/// | `categories` | empty (no filter) |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Size of the bounded worker pool for parallel-safe tests.
    ///
    /// Must be at least 1; validated before any test runs.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Run parallel-safe tests through the worker pool. When false, every
    /// test runs sequentially in scheduling order.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Stop dispatching new tests after the first failure or error.
    /// In-flight parallel work is allowed to finish.
    #[serde(default)]
    pub fail_fast: bool,

    /// Maximum extra attempts for tests classified as flaky. The recorded
    /// outcome is always the last attempt.
    #[serde(default = "default_retry_flaky")]
    pub retry_flaky: u32,

    /// Echo captured test output and failure detail to the console.
    #[serde(default)]
    pub verbose: bool,

    /// Restrict the run to these categories. Empty (or listing every
    /// category) means no filter.
    #[serde(default)]
    pub categories: BTreeSet<TestCategory>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            parallel: default_parallel(),
            fail_fast: false,
            retry_flaky: default_retry_flaky(),
            verbose: false,
            categories: BTreeSet::new(),
        }
    }
}

impl ExecutionConfig {
    /// Whether `category` passes the configured filter.
    pub fn category_enabled(&self, category: TestCategory) -> bool {
        self.categories.is_empty()
            || self.categories.len() == TestCategory::ALL.len()
            || self.categories.contains(&category)
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_parallel() -> bool {
    true
}

fn default_retry_flaky() -> u32 {
    3
}

/// Test discovery settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `roots` | `["tests"]` |
/// | `file_pattern` | `test_*.py` |
/// | `base_marker` | `TestCase` |
/// | `method_prefix` | `test_` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Root directories to scan recursively.
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// Glob-style file name pattern for test files (`*` matches any run
    /// of characters).
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    /// Substring that a type's base must contain for the type to be
    /// treated as a test case container.
    #[serde(default = "default_base_marker")]
    pub base_marker: String,

    /// Prefix that marks a method as a test.
    #[serde(default = "default_method_prefix")]
    pub method_prefix: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            file_pattern: default_file_pattern(),
            base_marker: default_base_marker(),
            method_prefix: default_method_prefix(),
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("tests")]
}

fn default_file_pattern() -> String {
    "test_*.py".to_string()
}

fn default_base_marker() -> String {
    "TestCase".to_string()
}

fn default_method_prefix() -> String {
    "test_".to_string()
}

/// Historical metrics store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// SQLite database path. Created on first use.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Trailing window in days for metric queries.
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Merge historical average durations into discovered cost estimates.
    #[serde(default)]
    pub refine_estimates: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            window_days: default_window_days(),
            refine_estimates: false,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("test_analytics.db")
}

fn default_window_days() -> i64 {
    30
}

/// JSON report artifact settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Write the structured JSON report after each run.
    #[serde(default)]
    pub json: bool,

    /// Path of the JSON report artifact.
    #[serde(default = "default_json_file")]
    pub json_file: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            json: false,
            json_file: default_json_file(),
        }
    }
}

fn default_json_file() -> PathBuf {
    PathBuf::from("test-results.json")
}
