//! Source scanning strategies for test discovery.
//!
//! Two independent strategies produce the same [`RawTest`] shape, so
//! callers are agnostic to which path matched:
//!
//! - [`scan_structural`]: an indentation-aware scanner that recovers class
//!   headers (with their base lists), method definitions, line numbers, and
//!   docstrings. Fails with [`ParseError`] on malformed source.
//! - [`scan_fallback`]: a regex pass over raw text with the same matching
//!   rules. Correctness-preserving, but line numbers are lost (reported
//!   as 0).

use regex::Regex;

/// A matched test method before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTest {
    /// Containing type name.
    pub class: String,
    /// Method name (includes the configured prefix).
    pub method: String,
    /// 1-based source line of the method; 0 when unknown.
    pub line: u32,
    /// Docstring attached to the method, if any.
    pub doc: String,
}

/// Structural parsing failures. These are per-file and non-fatal to a
/// discovery pass; the caller falls back to the regex scan.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated string literal starting on line {0}")]
    UnterminatedString(u32),

    #[error("malformed block header on line {0}: missing ':'")]
    MalformedHeader(u32),
}

/// State for the class currently being scanned.
struct ClassFrame {
    name: String,
    is_test_case: bool,
    indent: usize,
}

/// Scan source structurally, recovering line numbers and docstrings.
///
/// A type is a test container when any base in its header contains
/// `base_marker`; a method is a test when its name starts with
/// `method_prefix` and it is defined one level inside such a type.
pub fn scan_structural(
    source: &str,
    base_marker: &str,
    method_prefix: &str,
) -> Result<Vec<RawTest>, ParseError> {
    let mut tests: Vec<RawTest> = Vec::new();
    let mut class: Option<ClassFrame> = None;
    // Index into `tests` of a method still waiting for its docstring.
    let mut pending_doc: Option<usize> = None;

    let mut lines = source.lines().enumerate().peekable();
    while let Some((idx, raw_line)) = lines.next() {
        let lineno = (idx + 1) as u32;
        let line = strip_comment(raw_line);
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let indent = indent_width(&line);

        // A docstring must be the first statement after a def header.
        if let Some(target) = pending_doc.take() {
            if let Some(delim) = string_delimiter(trimmed) {
                let doc = collect_string(trimmed, delim, lineno, &mut lines)?;
                tests[target].doc = doc;
                continue;
            }
        } else if let Some(delim) = string_delimiter(trimmed) {
            // Bare string expression (module or class docstring): consume it
            // so its contents are not mistaken for structure.
            collect_string(trimmed, delim, lineno, &mut lines)?;
            continue;
        }

        // Leaving the class body ends the class.
        if let Some(frame) = &class {
            if indent <= frame.indent {
                class = None;
            }
        }

        if let Some(rest) = trimmed.strip_prefix("class ") {
            let header = rest.trim();
            let Some(body) = header.strip_suffix(':') else {
                return Err(ParseError::MalformedHeader(lineno));
            };
            let (name, bases) = match body.split_once('(') {
                Some((name, bases)) => (name.trim(), bases.trim_end_matches(')')),
                None => (body.trim(), ""),
            };
            class = Some(ClassFrame {
                name: name.to_string(),
                is_test_case: bases.contains(base_marker) || name.contains(base_marker),
                indent,
            });
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("def ") {
            if !rest.contains(':') {
                return Err(ParseError::MalformedHeader(lineno));
            }
            let name = rest
                .split('(')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();

            if let Some(frame) = &class {
                if frame.is_test_case && indent > frame.indent && name.starts_with(method_prefix) {
                    tests.push(RawTest {
                        class: frame.name.clone(),
                        method: name,
                        line: lineno,
                        doc: String::new(),
                    });
                    pending_doc = Some(tests.len() - 1);
                }
            }
        }
    }

    Ok(tests)
}

/// Regex fallback with the same matching rules as the structural scan.
///
/// Line precision is lost (all matches report line 0). Docstrings are
/// recovered opportunistically when they directly follow the def header.
pub fn scan_fallback(source: &str, base_marker: &str, method_prefix: &str) -> Vec<RawTest> {
    let class_re = Regex::new(&format!(
        r"class\s+(\w*{marker}\w*|\w+)\s*\(([^)]*)\)\s*:",
        marker = regex::escape(base_marker)
    ))
    .expect("static class pattern");
    let method_re = Regex::new(&format!(
        r#"def\s+({prefix}\w+)\s*\([^)]*\)\s*:\s*\n(?:\s*(?:"""|''')(?s)(.*?)(?:"""|'''))?"#,
        prefix = regex::escape(method_prefix)
    ))
    .expect("static method pattern");

    let mut tests = Vec::new();

    for class_match in class_re.captures_iter(source) {
        let name = &class_match[1];
        let bases = &class_match[2];
        if !bases.contains(base_marker) && !name.contains(base_marker) {
            continue;
        }

        // Limit the method scan to this class's span of the file.
        let start = class_match.get(0).map(|m| m.end()).unwrap_or(0);
        let end = source[start..]
            .find("\nclass ")
            .map(|i| start + i)
            .unwrap_or(source.len());

        for method_match in method_re.captures_iter(&source[start..end]) {
            tests.push(RawTest {
                class: name.to_string(),
                method: method_match[1].to_string(),
                line: 0,
                doc: method_match
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        }
    }

    tests
}

/// Width of leading whitespace; tabs advance to the next multiple of 8.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

/// Strip a trailing `#` comment, ignoring `#` inside quoted text.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' => break,
            _ => {}
        }
        out.push(c);
    }
    out
}

/// The delimiter if `trimmed` opens a string expression, else None.
fn string_delimiter(trimmed: &str) -> Option<&'static str> {
    for delim in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.starts_with(delim) {
            return Some(delim);
        }
    }
    None
}

/// Consume a (possibly multi-line) string expression and return its text.
fn collect_string<'a, I>(
    first: &str,
    delim: &str,
    start_line: u32,
    lines: &mut std::iter::Peekable<I>,
) -> Result<String, ParseError>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let body = &first[delim.len()..];

    // Closed on the same line.
    if let Some(end) = body.find(delim) {
        return Ok(body[..end].trim().to_string());
    }

    // Single-quoted strings may not span lines.
    if delim.len() == 1 {
        return Err(ParseError::UnterminatedString(start_line));
    }

    let mut doc = body.trim_end().to_string();
    for (_, raw_line) in lines.by_ref() {
        if let Some(end) = raw_line.find(delim) {
            let tail = raw_line[..end].trim();
            if !tail.is_empty() {
                doc.push('\n');
                doc.push_str(tail);
            }
            return Ok(doc.trim().to_string());
        }
        doc.push('\n');
        doc.push_str(raw_line.trim());
    }

    Err(ParseError::UnterminatedString(start_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"
import unittest


class TestAuth(unittest.TestCase):
    """Auth suite."""

    def setUp(self):
        self.session = None

    def test_login(self):
        """Critical auth check."""
        assert True

    def test_api_request(self):
        assert True


class Helper:
    def test_not_collected(self):
        pass


class TestOrders(unittest.TestCase):
    def test_mock_checkout(self):
        '''Uses a mock gateway.'''
        assert True
"#;

    #[test]
    fn structural_finds_tests_with_lines_and_docs() {
        let tests = scan_structural(WELL_FORMED, "TestCase", "test_").unwrap();
        let names: Vec<String> = tests
            .iter()
            .map(|t| format!("{}.{}", t.class, t.method))
            .collect();
        assert_eq!(
            names,
            vec![
                "TestAuth.test_login",
                "TestAuth.test_api_request",
                "TestOrders.test_mock_checkout",
            ]
        );
        assert_eq!(tests[0].doc, "Critical auth check.");
        assert_eq!(tests[0].line, 11);
        assert!(tests[1].doc.is_empty());
        assert_eq!(tests[2].doc, "Uses a mock gateway.");
    }

    #[test]
    fn non_test_class_ignored() {
        let tests = scan_structural(WELL_FORMED, "TestCase", "test_").unwrap();
        assert!(!tests.iter().any(|t| t.class == "Helper"));
    }

    #[test]
    fn fallback_agrees_on_count_for_well_formed_input() {
        let structural = scan_structural(WELL_FORMED, "TestCase", "test_").unwrap();
        let fallback = scan_fallback(WELL_FORMED, "TestCase", "test_");
        assert_eq!(structural.len(), fallback.len());

        let a: Vec<(String, String)> = structural
            .iter()
            .map(|t| (t.class.clone(), t.method.clone()))
            .collect();
        let b: Vec<(String, String)> = fallback
            .iter()
            .map(|t| (t.class.clone(), t.method.clone()))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_loses_line_precision() {
        let fallback = scan_fallback(WELL_FORMED, "TestCase", "test_");
        assert!(fallback.iter().all(|t| t.line == 0));
    }

    #[test]
    fn malformed_header_is_a_parse_error() {
        let source = "class TestX(unittest.TestCase)\n    def test_a(self):\n        pass\n";
        let err = scan_structural(source, "TestCase", "test_").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeader(1)));
    }

    #[test]
    fn unterminated_docstring_is_a_parse_error() {
        let source =
            "class TestX(unittest.TestCase):\n    def test_a(self):\n        \"\"\"never closed\n";
        let err = scan_structural(source, "TestCase", "test_").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedString(_)));
    }

    #[test]
    fn comments_do_not_hide_structure() {
        let source = "class TestX(unittest.TestCase):  # suite\n    def test_a(self):  # one\n        pass\n";
        let tests = scan_structural(source, "TestCase", "test_").unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].line, 2);
    }

    #[test]
    fn custom_markers_respected() {
        let source = "class SuiteX(CheckSuite):\n    def check_a(self):\n        pass\n";
        let tests = scan_structural(source, "CheckSuite", "check_").unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].method, "check_a");
    }
}
