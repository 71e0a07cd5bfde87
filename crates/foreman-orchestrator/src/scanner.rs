//! The repository scanner (spec §6.3), driven by the Autonomous loop's
//! Discovery phase. Grounded in
//! `examples/original_source/ai/autonomous/monitor.py`'s regex-family
//! scan, adapted from Python source patterns to their idiomatic Rust
//! equivalents (spec §1 Non-goals: this is a regex scanner, not a
//! semantic analyzer).

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One issue the scanner found in a single file/line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedIssue {
    pub family: IssueFamily,
    pub severity: Severity,
    pub file: String,
    pub line: usize,
    pub description: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueFamily {
    Security,
    Quality,
    Performance,
    Todo,
    TestCoverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Best-effort repository-wide counters (spec §6.3 `metrics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMetrics {
    pub total_lines: u64,
    pub code_lines: u64,
    pub test_coverage: f64,
    pub complexity_average: f64,
    pub files_count: u64,
}

struct PatternFamily {
    family: IssueFamily,
    severity: Severity,
    patterns: Vec<(Regex, &'static str)>,
}

fn security_family() -> PatternFamily {
    PatternFamily {
        family: IssueFamily::Security,
        severity: Severity::High,
        patterns: vec![
            (Regex::new(r"Md5|Sha1::new|md5::compute").unwrap(), "weak cryptographic hash function"),
            (Regex::new(r"rand::random::<u\d+>\(\)\s*%").unwrap(), "insecure randomness used where a CSPRNG is expected"),
            (Regex::new(r#"Command::new\([^)]*\)\s*\.arg\("-c"\)"#).unwrap(), "shell invocation shaped like a command injection sink"),
            (Regex::new(r"serde_json::from_str::<serde_json::Value>\(\s*&?request").unwrap(), "deserializing untrusted request data without a schema"),
        ],
    }
}

fn quality_family() -> PatternFamily {
    PatternFamily {
        family: IssueFamily::Quality,
        severity: Severity::Medium,
        patterns: vec![
            (Regex::new(r"^.{121,}$").unwrap(), "line too long (>120 characters)"),
            (Regex::new(r"\t").unwrap(), "tab character used instead of spaces"),
            (Regex::new(r"println!\(|dbg!\(").unwrap(), "debug print statement left in code"),
            (Regex::new(r"//\s*TODO:?\s*$").unwrap(), "empty TODO comment"),
            (Regex::new(r"fn\s+\w+\([^)]*\)(\s*->\s*\S+)?\s*\{\s*\}\s*$").unwrap(), "empty function body"),
        ],
    }
}

fn performance_family() -> PatternFamily {
    PatternFamily {
        family: IssueFamily::Performance,
        severity: Severity::Medium,
        patterns: vec![
            (Regex::new(r"for\s+\w+\s+in\s+0\.\.\w+\.len\(\)").unwrap(), "inefficient index-based loop where an iterator would do"),
            (Regex::new(r"\.clone\(\)[^;]*\.clone\(\)").unwrap(), "repeated cloning inside what looks like a loop body"),
            (Regex::new(r"(thread::sleep|tokio::time::sleep)\([^)]*Duration::from_secs\((?:[1-9]\d|\d{3,})\)").unwrap(), "long sleep call"),
        ],
    }
}

fn todo_family() -> PatternFamily {
    PatternFamily {
        family: IssueFamily::Todo,
        severity: Severity::Low,
        patterns: vec![
            (Regex::new(r"//\s*TODO").unwrap(), "TODO marker"),
            (Regex::new(r"//\s*FIXME").unwrap(), "FIXME marker"),
        ],
    }
}

/// Files and directories the scanner never descends into or reports
/// on: build output and vendored/dependency trees.
fn should_ignore(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("target") | Some(".git") | Some("node_modules")
        )
    })
}

/// Scan every `*.rs` file under `root` against all per-line pattern
/// families, plus the repo-wide test-to-source ratio check.
pub fn scan_repository(root: &Path) -> Vec<ScannedIssue> {
    let families = vec![security_family(), quality_family(), performance_family(), todo_family()];
    let mut issues = Vec::new();

    for entry in walk_rust_files(root) {
        let Ok(content) = std::fs::read_to_string(&entry) else {
            continue;
        };
        let relative = entry.strip_prefix(root).unwrap_or(&entry);
        for (line_no, line) in content.lines().enumerate() {
            for family in &families {
                for (pattern, description) in &family.patterns {
                    if pattern.is_match(line) {
                        issues.push(ScannedIssue {
                            family: family.family,
                            severity: family.severity,
                            file: relative.display().to_string(),
                            line: line_no + 1,
                            description: description.to_string(),
                            code: line.trim().to_string(),
                        });
                    }
                }
            }
        }
    }

    if let Some(issue) = scan_test_coverage(root) {
        issues.push(issue);
    }

    issues
}

/// `_scan_test_issues`: a file is "test" by name (`*test*.rs`), not by
/// `#[test]` content — counts a dedicated `tests/` module file even if
/// it hasn't been written yet. Below a 0.5 test-to-source file ratio,
/// reports one repo-wide issue rather than a per-file one.
fn scan_test_coverage(root: &Path) -> Option<ScannedIssue> {
    let mut source_files = 0u64;
    let mut test_files = 0u64;
    for entry in walk_rust_files(root) {
        let name = entry.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.to_lowercase().contains("test") {
            test_files += 1;
        } else {
            source_files += 1;
        }
    }
    if source_files == 0 {
        return None;
    }
    let ratio = test_files as f64 / source_files as f64;
    if ratio >= 0.5 {
        return None;
    }
    Some(ScannedIssue {
        family: IssueFamily::TestCoverage,
        severity: Severity::Medium,
        file: String::new(),
        line: 0,
        description: format!("low test-to-source ratio: {ratio:.2}"),
        code: String::new(),
    })
}

/// `collect_metrics` equivalent: naive line counting, test-to-source
/// file ratio as a coverage proxy, and a crude complexity heuristic
/// (branch-keyword density per line) since no real complexity analyzer
/// is in scope.
pub fn collect_metrics(root: &Path) -> RepoMetrics {
    let mut total_lines = 0u64;
    let mut code_lines = 0u64;
    let mut files_count = 0u64;
    let mut test_files = 0u64;
    let mut branch_keywords = 0u64;

    for entry in walk_rust_files(root) {
        let Ok(content) = std::fs::read_to_string(&entry) else {
            continue;
        };
        files_count += 1;
        if content.contains("#[test]") || content.contains("#[tokio::test]") {
            test_files += 1;
        }
        for line in content.lines() {
            total_lines += 1;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with("//") {
                code_lines += 1;
            }
            branch_keywords += count_branch_keywords(trimmed);
        }
    }

    let test_coverage = if files_count == 0 {
        0.0
    } else {
        (test_files as f64 / files_count as f64) * 100.0
    };
    let complexity_average = if code_lines == 0 {
        0.0
    } else {
        branch_keywords as f64 / code_lines as f64 * 100.0
    };

    RepoMetrics {
        total_lines,
        code_lines,
        test_coverage,
        complexity_average,
        files_count,
    }
}

fn count_branch_keywords(line: &str) -> u64 {
    ["if ", "match ", "while ", "for ", "else "]
        .iter()
        .filter(|kw| line.contains(*kw))
        .count() as u64
}

fn walk_rust_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            if dir != root {
                warn!(path = %dir.display(), "scanner could not read directory");
            }
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if should_ignore(&path) {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn detects_debug_print_and_todo() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "lib.rs", "fn main() {\n    println!(\"hi\");\n    // TODO\n}\n");
        let issues = scan_repository(dir.path());
        assert!(issues.iter().any(|i| i.family == IssueFamily::Quality));
        assert!(issues.iter().any(|i| i.family == IssueFamily::Todo));
    }

    #[test]
    fn ignores_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        write_file(&dir.path().join("target"), "debug.rs", "println!(\"noise\");\n");
        let issues = scan_repository(dir.path());
        assert!(issues.is_empty());
    }

    #[test]
    fn low_test_ratio_reports_test_coverage_issue() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "lib.rs", "fn add(a: i32, b: i32) -> i32 { a + b }\n");
        write_file(dir.path(), "util.rs", "fn sub(a: i32, b: i32) -> i32 { a - b }\n");
        let issues = scan_repository(dir.path());
        assert!(issues.iter().any(|i| i.family == IssueFamily::TestCoverage));
    }

    #[test]
    fn healthy_test_ratio_reports_no_coverage_issue() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "lib.rs", "fn add(a: i32, b: i32) -> i32 { a + b }\n");
        write_file(dir.path(), "lib_test.rs", "#[test]\nfn test_add() {}\n");
        let issues = scan_repository(dir.path());
        assert!(!issues.iter().any(|i| i.family == IssueFamily::TestCoverage));
    }

    #[test]
    fn metrics_count_lines_and_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "lib.rs", "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n");
        write_file(dir.path(), "lib_test.rs", "#[test]\nfn test_add() {}\n");
        let metrics = collect_metrics(dir.path());
        assert_eq!(metrics.files_count, 2);
        assert!(metrics.test_coverage > 0.0);
    }
}
