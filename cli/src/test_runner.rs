use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use compiler::{CollectingLogger, Compiler, CompilerOptions, Error, OutputStyle, Warning};

const TEST_SUFFIX: &str = ".test.scss";

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning must be raised on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,

    /// If set, the warning must (or must not) be a deprecation notice.
    #[serde(default)]
    pub deprecation: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Output style used for the compile. Defaults to expanded.
    #[serde(default)]
    pub style: OutputStyle,

    /// Expected CSS (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected compile error: its Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If true, the test expects parsing to fail.
    #[serde(default)]
    pub expect_parse_error: bool,

    /// Expected warnings. If present (even empty), warning count and content are checked.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

/// Split a `.test.scss` file into its TOML config and SCSS source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };
    let description = config.description.clone();

    let logger = Arc::new(CollectingLogger::new());
    let mut compiler = Compiler::new(CompilerOptions {
        style: config.style,
        logger: logger.clone(),
        ..CompilerOptions::default()
    });
    let result = compiler.compile_string(source, Some(path));

    if config.expect_parse_error {
        let outcome = match result {
            Err(Error::Parse(_)) => TestOutcome::Pass,
            Err(Error::Compile(err)) => {
                TestOutcome::Fail(format!("expected parse error, got compile error: {}", err))
            }
            Ok(_) => TestOutcome::Fail("expected parse error, but parsing succeeded".into()),
        };
        return TestResult {
            path: path.to_path_buf(),
            description,
            outcome,
        };
    }

    let failure = match (&config.expect_error, &config.expect_output, result) {
        (_, _, Err(Error::Parse(err))) => Some(format!(
            "unexpected parse error on line {}: {}",
            err.line, err.message
        )),
        (Some(expected), _, Err(Error::Compile(err))) => {
            let message = err.to_string();
            if message.contains(expected.as_str()) {
                None
            } else {
                Some(format!("expected error containing \"{}\", got: {}", expected, message))
            }
        }
        (Some(expected), _, Ok(_)) => Some(format!(
            "expected error containing \"{}\", but compilation succeeded",
            expected
        )),
        (None, _, Err(Error::Compile(err))) => Some(format!("unexpected compile error: {}", err)),
        (None, Some(expected), Ok(result)) => {
            let actual = result.css.trim();
            let expected = expected.trim();
            if actual == expected {
                None
            } else {
                Some(format!("output mismatch\n  expected:\n{}\n  actual:\n{}", expected, actual))
            }
        }
        (None, None, Ok(_)) => None,
    };
    if let Some(reason) = failure {
        return fail(description, reason);
    }

    if let Some(expected) = &config.expect_warnings {
        if let Some(reason) = check_warnings(&logger.warnings(), expected) {
            return fail(description, reason);
        }
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

/// Check that actual warnings match expectations. Returns `Some(reason)` on mismatch.
fn check_warnings(actual: &[Warning], expected: &[ExpectedWarning]) -> Option<String> {
    if actual.len() != expected.len() {
        let actual_msgs: Vec<String> = actual.iter().map(|w| format!("  - {}", w.message)).collect();
        return Some(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            actual.len(),
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual.iter().zip(expected).enumerate() {
        if !actual.message.contains(&expected.contains) {
            return Some(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, actual.message
            ));
        }
        if let Some(line) = expected.line {
            if actual.line != line {
                return Some(format!(
                    "warning[{}]: expected on line {}, but raised on line {}",
                    i, line, actual.line
                ));
            }
        }
        if let Some(deprecation) = expected.deprecation {
            if actual.deprecation != deprecation {
                return Some(format!(
                    "warning[{}]: expected deprecation = {}, got {}",
                    i, deprecation, actual.deprecation
                ));
            }
        }
    }

    None
}

/// Discover `.test.scss` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(TEST_SUFFIX))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

fn label(result: &TestResult) -> &str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(TEST_SUFFIX))
            .unwrap_or("?")
    })
}

fn print_summary(passed: usize, failures: &[TestResult], no_color: bool) -> i32 {
    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        let ok = if no_color { "ok" } else { "\x1b[32mok\x1b[0m" };
        eprintln!("test result: {}. {} passed, 0 failed", ok, passed);
        0
    } else {
        let failed = if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" };
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            failed,
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

/// Run all `.test.scss` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    if path.is_file() {
        let result = run_single_test(path);
        return match result.outcome {
            TestOutcome::Pass => {
                eprintln!("  {}  {}", pass_label(no_color), label(&result));
                print_summary(1, &[], no_color)
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", fail_label(no_color), label(&result));
                print_summary(0, &[result], no_color)
            }
        };
    }

    let all_categories = discover_categorized(path);
    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let run_categories: BTreeMap<&str, &Vec<PathBuf>> = if categories.is_empty() {
        all_categories.iter().map(|(k, v)| (k.as_str(), v)).collect()
    } else {
        let mut filtered = BTreeMap::new();
        for requested in categories {
            let req = requested.trim_matches('/');
            let mut found = false;
            for (cat, files) in &all_categories {
                if cat == req || cat.starts_with(&format!("{}/", req)) {
                    filtered.insert(cat.as_str(), files);
                    found = true;
                }
            }
            if !found {
                eprintln!(
                    "warning: category '{}' not found (available: {})",
                    req,
                    all_categories
                        .keys()
                        .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        filtered
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        let header = if cat.is_empty() { "(root)" } else { cat };
        eprintln!();
        eprintln!("{}", bold(header, no_color));

        for file in *files {
            let result = run_single_test(file);
            match result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), label(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", fail_label(no_color), label(&result));
                    failures.push(result);
                }
            }
        }
    }

    print_summary(passed, &failures, no_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn passes(result: &TestResult) -> bool {
        matches!(result.outcome, TestOutcome::Pass)
    }

    #[test]
    fn front_matter_is_split_from_source() {
        let (config, source) =
            parse_test_file("---\nstyle = \"compact\"\nexpect_output = \"a { b: c; }\"\n---\na { b: c; }\n").unwrap();
        assert_eq!(config.style, OutputStyle::Compact);
        assert_eq!(config.expect_output.as_deref(), Some("a { b: c; }"));
        assert_eq!(source, "a { b: c; }\n");
        assert!(parse_test_file("a { b: c; }").is_err());
    }

    #[test]
    fn output_expectations() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_test(
            dir.path(),
            "good.test.scss",
            "---\nstyle = \"compact\"\nexpect_output = \".a .b { c: d; }\"\n---\n.a { .b { c: d; } }\n",
        );
        assert!(passes(&run_single_test(&good)));

        let bad = write_test(
            dir.path(),
            "bad.test.scss",
            "---\nstyle = \"compact\"\nexpect_output = \".a { c: d; }\"\n---\n.b { c: d; }\n",
        );
        assert!(!passes(&run_single_test(&bad)));
    }

    #[test]
    fn error_and_warning_expectations() {
        let dir = tempfile::tempdir().unwrap();
        let error = write_test(
            dir.path(),
            "error.test.scss",
            "---\nexpect_error = \"Undefined variable\"\n---\n.a { b: $missing; }\n",
        );
        assert!(passes(&run_single_test(&error)));

        let parse = write_test(dir.path(), "parse.test.scss", "---\nexpect_parse_error = true\n---\n.a { b: c\n");
        assert!(passes(&run_single_test(&parse)));

        let warn = write_test(
            dir.path(),
            "warn.test.scss",
            "---\n[[expect_warnings]]\ncontains = \"careful\"\nline = 1\n---\n@warn \"careful\";\n",
        );
        assert!(passes(&run_single_test(&warn)));
    }

    #[test]
    fn tests_are_grouped_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("colors")).unwrap();
        write_test(dir.path(), "root.test.scss", "---\ndescription = \"root\"\n---\n");
        write_test(&dir.path().join("colors"), "mix.test.scss", "---\ndescription = \"mix\"\n---\n");
        write_test(dir.path(), "notes.scss", "");

        let categories = discover_categorized(dir.path());
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[""].len(), 1);
        assert_eq!(categories["colors"].len(), 1);
        assert_eq!(run_tests(dir.path(), true, &["colors".to_string()]), 0);
    }
}
