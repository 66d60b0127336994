//! Classification heuristics for discovered tests.
//!
//! Heuristics look at the qualified name and the docstring, lowercased.
//! Category rules are evaluated in a fixed order; first match wins.

use std::path::Path;

use crate::model::{TestCategory, TestPriority, TestRecord};

use super::parser::RawTest;

/// Build a full [`TestRecord`] from a raw match.
pub fn build_record(raw: &RawTest, source_path: &Path, module: &str) -> TestRecord {
    let name = format!("{}.{}", raw.class, raw.method);
    let haystack = format!("{} {}", name.to_lowercase(), raw.doc.to_lowercase());

    let category = detect_category(&haystack);
    let priority = detect_priority(&haystack);

    TestRecord {
        name,
        module: module.to_string(),
        source_path: source_path.to_path_buf(),
        source_line: raw.line,
        category,
        priority,
        estimated_cost_secs: category.default_cost_secs(),
        tags: Default::default(),
        is_flaky: haystack.contains("flaky") || haystack.contains("unstable"),
        requires_network: haystack.contains("api") || haystack.contains("network"),
        requires_auth: haystack.contains("auth") || haystack.contains("login"),
    }
}

fn detect_category(haystack: &str) -> TestCategory {
    if haystack.contains("mock") {
        TestCategory::Mock
    } else if haystack.contains("integration") {
        TestCategory::Integration
    } else if haystack.contains("api") || haystack.contains("request") {
        TestCategory::ApiCall
    } else if haystack.contains("property") {
        TestCategory::Property
    } else {
        TestCategory::Unit
    }
}

fn detect_priority(haystack: &str) -> TestPriority {
    if haystack.contains("critical") {
        TestPriority::Critical
    } else if haystack.contains("important") {
        TestPriority::High
    } else if haystack.contains("flaky") || haystack.contains("slow") {
        TestPriority::Low
    } else {
        TestPriority::Medium
    }
}
