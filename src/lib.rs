//! conductor: a test orchestration engine.
//!
//! Discovers unittest-style tests by static analysis, classifies them by
//! heuristic, schedules them by priority and cost, and runs them through a
//! bounded worker pool while recording history into a SQLite store.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Discovery**: scan source trees and classify test records
//! - **Orchestrator**: order, partition, and dispatch a run
//! - **Executor**: invoke single tests (process or in-process closures)
//! - **Analytics**: append-only run history, flakiness and timing metrics
//! - **Report**: console progress, JSON artifacts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conductor::config::load_config;
//! use conductor::discovery::Discovery;
//! use conductor::executor::ProcessRunner;
//! use conductor::orchestrator::Orchestrator;
//! use conductor::report::NullReporter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("conductor.toml"))?;
//!     let discovery = Discovery::new(config.discovery.clone())?;
//!     let tests = discovery.discover(&config.discovery.roots);
//!
//!     let orchestrator = Orchestrator::new(
//!         config.run.clone(),
//!         Arc::new(ProcessRunner::unittest()),
//!         Arc::new(NullReporter),
//!     );
//!     let summary = orchestrator.run(tests.into_values().collect()).await;
//!     std::process::exit(summary.exit_code());
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod report;

// Re-export commonly used types
pub use analytics::{AnalyticsStore, PerformanceAnalyzer, TestMetrics};
pub use config::{load_config, Config};
pub use discovery::Discovery;
pub use executor::{ExecutionEngine, FnRunner, ProcessRunner, TestRunner, Verdict};
pub use model::{RunOutcome, RunStatus, RunSummary, TestCategory, TestPriority, TestRecord};
pub use orchestrator::Orchestrator;
pub use report::Reporter;
