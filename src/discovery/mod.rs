//! Test discovery: scan a source tree and produce classified test records.
//!
//! Discovery is pure static analysis; nothing is executed. Given one or
//! more root directories it yields a deterministic mapping from qualified
//! test name to [`TestRecord`]. Per-file failures (unreadable or
//! unparseable source) are isolated: the file is skipped with a warning
//! and the pass continues.

pub mod classify;
pub mod parser;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::analytics::AnalyticsStore;
use crate::config::DiscoveryConfig;
use crate::model::TestRecord;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur during test discovery.
///
/// Structural parse failures never surface here; they are absorbed by the
/// regex fallback inside the pass.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Scans directories for test files and classifies what it finds.
pub struct Discovery {
    config: DiscoveryConfig,
    file_regex: Regex,
}

impl Discovery {
    /// Create a discoverer for the given settings.
    pub fn new(config: DiscoveryConfig) -> DiscoveryResult<Self> {
        let file_regex = glob_to_regex(&config.file_pattern)?;
        Ok(Self { config, file_regex })
    }

    /// Discover all tests under `roots`, keyed by qualified name.
    ///
    /// Missing roots and unreadable files are skipped. An empty mapping is
    /// a valid result, not an error.
    pub fn discover(&self, roots: &[PathBuf]) -> BTreeMap<String, TestRecord> {
        let mut tests = BTreeMap::new();

        for root in roots {
            if !root.exists() {
                warn!("discovery root {} does not exist, skipping", root.display());
                continue;
            }
            self.walk(root, &mut tests);
        }

        debug!("discovered {} tests", tests.len());
        tests
    }

    fn walk(&self, dir: &Path, tests: &mut BTreeMap<String, TestRecord>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read directory {}: {}", dir.display(), e);
                return;
            }
        };

        // Sort for a deterministic result regardless of readdir order.
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.walk(&path, tests);
            } else if self.matches_pattern(&path) {
                if let Err(e) = self.analyze_file(&path, tests) {
                    warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    fn matches_pattern(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.file_regex.is_match(n))
            .unwrap_or(false)
    }

    /// Extract test records from one file.
    ///
    /// The structural scanner runs first; if it rejects the source, the
    /// regex fallback is used with the same matching rules (losing line
    /// precision). Only an unreadable file surfaces an error.
    fn analyze_file(
        &self,
        path: &Path,
        tests: &mut BTreeMap<String, TestRecord>,
    ) -> DiscoveryResult<()> {
        let content = std::fs::read_to_string(path)?;

        let raw = match parser::scan_structural(
            &content,
            &self.config.base_marker,
            &self.config.method_prefix,
        ) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(
                    "structural parse of {} failed ({}), using regex fallback",
                    path.display(),
                    e
                );
                parser::scan_fallback(
                    &content,
                    &self.config.base_marker,
                    &self.config.method_prefix,
                )
            }
        };

        let module = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        for test in &raw {
            let record = classify::build_record(test, path, module);
            tests.insert(record.name.clone(), record);
        }

        Ok(())
    }
}

/// Merge historical average durations into discovered cost estimates.
///
/// This is an explicit caller decision, never an automatic side effect of
/// discovery. Tests without history keep their heuristic default.
pub fn apply_history(
    tests: &mut BTreeMap<String, TestRecord>,
    store: &AnalyticsStore,
    days: i64,
) {
    for record in tests.values_mut() {
        match store.test_metrics(&record.name, days) {
            Ok(metrics) if metrics.total_runs > 0 => {
                record.estimated_cost_secs = metrics.avg_duration;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("history lookup failed for {}: {}", record.name, e);
                return;
            }
        }
    }
}

/// Translate a `*`-only glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> DiscoveryResult<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(|p| regex::escape(p)).collect();
    let source = format!("^{}$", escaped.join(".*"));
    Regex::new(&source).map_err(|source| DiscoveryError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
