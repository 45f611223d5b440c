use crate::config::QualityConfig;
use crate::error::Result;
use crate::proc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// QualityReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub tests_total: u64,
    pub coverage_percent: f64,
    pub low_coverage_files: Vec<LowCoverageFile>,
    /// 0-100; penalized by static analysis findings.
    pub quality_score: u32,
}

/// A file below the coverage floor, with the lines the suite never reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowCoverageFile {
    pub file: String,
    pub percent: f64,
    pub missing_lines: Vec<u64>,
}

// ---------------------------------------------------------------------------
// QualityGate
// ---------------------------------------------------------------------------

/// Validates a candidate workspace: runs the test suite, reads coverage and
/// applies best-effort static analysis. A failing suite or a broken tool is
/// reflected in the report, not raised — only environmental problems (the
/// shell itself missing) surface as errors.
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub async fn validate(&self, dir: &Path) -> Result<QualityReport> {
        let (tests_passed, tests_failed) = self.run_tests(dir).await?;
        let (coverage_percent, low_coverage_files) = self.read_coverage(dir);
        let analysis = self.run_static_analysis(dir).await;
        let quality_score = quality_score(
            analysis.type_issues,
            analysis.lint_issues,
            analysis.security_high,
            analysis.security_medium,
        );
        Ok(QualityReport {
            tests_passed,
            tests_failed,
            tests_total: tests_passed + tests_failed,
            coverage_percent,
            low_coverage_files,
            quality_score,
        })
    }

    /// Acceptance policy: a green suite at or above the coverage floor.
    pub fn acceptable(&self, report: &QualityReport) -> bool {
        report.tests_failed == 0 && report.coverage_percent >= self.config.min_coverage
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    async fn run_tests(&self, dir: &Path) -> Result<(u64, u64)> {
        let timeout = Duration::from_secs(self.config.test_timeout_secs);
        let run = proc::run_shell(&self.config.test_command, dir);
        let out = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.test_timeout_secs,
                    "test command timed out"
                );
                return Ok((0, 1));
            }
        };
        let combined = format!("{}\n{}", out.stdout, out.stderr);
        match parse_test_summary(&combined) {
            Some(counts) => Ok(counts),
            // No recognizable summary: trust the exit code.
            None if out.success() => Ok((0, 0)),
            None => Ok((0, 1)),
        }
    }

    // -----------------------------------------------------------------------
    // Coverage
    // -----------------------------------------------------------------------

    fn read_coverage(&self, dir: &Path) -> (f64, Vec<LowCoverageFile>) {
        let path = dir.join(&self.config.coverage_file);
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "no coverage report");
                return (0.0, Vec::new());
            }
        };
        match serde_json::from_str::<serde_json::Value>(&data) {
            Ok(value) => parse_coverage(&value, self.config.min_coverage),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "malformed coverage report");
                (0.0, Vec::new())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Static analysis
    // -----------------------------------------------------------------------

    async fn run_static_analysis(&self, dir: &Path) -> StaticAnalysis {
        let mut analysis = StaticAnalysis::default();
        if let Some(out) = self.run_tool(self.config.type_checker.as_deref(), dir).await {
            analysis.type_issues = count_diagnostics(&out, error_diag_re());
        }
        if let Some(out) = self.run_tool(self.config.linter.as_deref(), dir).await {
            analysis.lint_issues = count_diagnostics(&out, warning_diag_re());
        }
        if let Some(out) = self.run_tool(self.config.security_scanner.as_deref(), dir).await {
            let (high, medium) = parse_security_findings(&out);
            analysis.security_high = high;
            analysis.security_medium = medium;
        }
        analysis
    }

    /// Run an optional analysis tool. Unset, not installed, or failed to
    /// spawn all mean "no findings".
    async fn run_tool(&self, command: Option<&str>, dir: &Path) -> Option<String> {
        let command = command?;
        let program = command.split_whitespace().next()?;
        if which::which(program).is_err() {
            debug!(tool = program, "analysis tool not installed, skipping");
            return None;
        }
        match proc::run_shell(command, dir).await {
            Ok(out) => Some(format!("{}\n{}", out.stdout, out.stderr)),
            Err(e) => {
                debug!(tool = program, error = %e, "analysis tool failed to run");
                None
            }
        }
    }
}

#[derive(Debug, Default)]
struct StaticAnalysis {
    type_issues: u32,
    lint_issues: u32,
    security_high: u32,
    security_medium: u32,
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

static PASSED_RE: OnceLock<Regex> = OnceLock::new();
static FAILED_RE: OnceLock<Regex> = OnceLock::new();

fn passed_re() -> &'static Regex {
    PASSED_RE.get_or_init(|| Regex::new(r"(\d+) passed").unwrap())
}

fn failed_re() -> &'static Regex {
    FAILED_RE.get_or_init(|| Regex::new(r"(\d+) failed").unwrap())
}

/// Sum `N passed` / `N failed` counts across the whole output (cargo prints
/// one summary per test binary). Returns None when neither appears.
fn parse_test_summary(output: &str) -> Option<(u64, u64)> {
    let mut passed = 0u64;
    let mut failed = 0u64;
    let mut matched = false;
    for caps in passed_re().captures_iter(output) {
        if let Ok(n) = caps[1].parse::<u64>() {
            passed += n;
            matched = true;
        }
    }
    for caps in failed_re().captures_iter(output) {
        if let Ok(n) = caps[1].parse::<u64>() {
            failed += n;
            matched = true;
        }
    }
    matched.then_some((passed, failed))
}

/// Total coverage percentage plus files below `min_coverage`.
///
/// Expects the common JSON report shape: `totals.num_statements`,
/// `totals.covered_lines`, and a `files` map whose entries carry
/// `summary.percent_covered` and `missing_lines`.
fn parse_coverage(value: &serde_json::Value, min_coverage: f64) -> (f64, Vec<LowCoverageFile>) {
    let total = value
        .pointer("/totals/num_statements")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let covered = value
        .pointer("/totals/covered_lines")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let percent = if total > 0.0 {
        covered / total * 100.0
    } else {
        0.0
    };

    let mut low = Vec::new();
    if let Some(files) = value.get("files").and_then(|f| f.as_object()) {
        for (name, entry) in files {
            let file_percent = entry
                .pointer("/summary/percent_covered")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            if file_percent < min_coverage {
                let missing_lines = entry
                    .get("missing_lines")
                    .and_then(|m| m.as_array())
                    .map(|lines| lines.iter().filter_map(|l| l.as_u64()).collect())
                    .unwrap_or_default();
                low.push(LowCoverageFile {
                    file: name.clone(),
                    percent: file_percent,
                    missing_lines,
                });
            }
        }
    }
    low.sort_by(|a, b| a.file.cmp(&b.file));
    (percent, low)
}

static ERROR_DIAG_RE: OnceLock<Regex> = OnceLock::new();
static WARNING_DIAG_RE: OnceLock<Regex> = OnceLock::new();

/// Matches `error[E0308]:` / `error:` at line start, and the
/// `path:line: error:` form location-prefixed checkers print.
fn error_diag_re() -> &'static Regex {
    ERROR_DIAG_RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:\S+:\d+(?::\d+)?:\s*)?error(?:\[\w+\])?:").unwrap()
    })
}

fn warning_diag_re() -> &'static Regex {
    WARNING_DIAG_RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:\S+:\d+(?::\d+)?:\s*)?warning(?:\[\w+\])?:").unwrap()
    })
}

/// Count diagnostic headers, not every line mentioning the word — help and
/// note lines citing "error" must not inflate the tally.
fn count_diagnostics(output: &str, re: &Regex) -> u32 {
    re.find_iter(output).count() as u32
}

/// HIGH/MEDIUM finding counts from a scanner's JSON output; zero when the
/// output isn't the expected shape.
fn parse_security_findings(output: &str) -> (u32, u32) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(output.trim()) else {
        return (0, 0);
    };
    let Some(results) = value.get("results").and_then(|r| r.as_array()) else {
        return (0, 0);
    };
    let mut high = 0;
    let mut medium = 0;
    for finding in results {
        match finding
            .get("issue_severity")
            .and_then(|s| s.as_str())
            .unwrap_or("")
        {
            "HIGH" => high += 1,
            "MEDIUM" => medium += 1,
            _ => {}
        }
    }
    (high, medium)
}

/// `100 - 2·type - 1·lint - 10·high - 5·medium`, clamped to [0, 100].
pub fn quality_score(
    type_issues: u32,
    lint_issues: u32,
    security_high: u32,
    security_medium: u32,
) -> u32 {
    let penalty = 2 * type_issues as i64
        + lint_issues as i64
        + 10 * security_high as i64
        + 5 * security_medium as i64;
    (100 - penalty).clamp(0, 100) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn score_is_clamped_to_bounds() {
        assert_eq!(quality_score(0, 0, 0, 0), 100);
        assert_eq!(quality_score(1000, 0, 0, 0), 0);
        assert_eq!(quality_score(0, 0, 50, 50), 0);
    }

    #[test]
    fn score_applies_weighted_penalties() {
        assert_eq!(quality_score(2, 3, 1, 1), 100 - 4 - 3 - 10 - 5);
        assert_eq!(quality_score(0, 10, 0, 0), 90);
    }

    #[test]
    fn test_summary_parsing() {
        let out = "test result: ok. 12 passed; 0 failed; 0 ignored";
        assert_eq!(parse_test_summary(out), Some((12, 0)));

        let out = "test result: FAILED. 3 passed; 2 failed";
        assert_eq!(parse_test_summary(out), Some((3, 2)));

        // Multiple binaries sum up
        let out = "4 passed; 0 failed\n6 passed; 1 failed";
        assert_eq!(parse_test_summary(out), Some((10, 1)));

        assert_eq!(parse_test_summary("no summary here"), None);
    }

    #[test]
    fn coverage_parsing() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{
                "totals": {"num_statements": 200, "covered_lines": 150},
                "files": {
                    "src/a.rs": {"summary": {"percent_covered": 95.0}, "missing_lines": []},
                    "src/b.rs": {"summary": {"percent_covered": 40.0}, "missing_lines": [3, 4]}
                }
            }"#,
        )
        .unwrap();
        let (percent, low) = parse_coverage(&value, 80.0);
        assert!((percent - 75.0).abs() < f64::EPSILON);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].file, "src/b.rs");
        assert!((low[0].percent - 40.0).abs() < f64::EPSILON);
        assert_eq!(low[0].missing_lines, vec![3, 4]);
    }

    #[test]
    fn coverage_with_zero_statements_is_zero() {
        let value: serde_json::Value =
            serde_json::from_str(r#"{"totals": {"num_statements": 0, "covered_lines": 0}}"#)
                .unwrap();
        let (percent, low) = parse_coverage(&value, 80.0);
        assert_eq!(percent, 0.0);
        assert!(low.is_empty());
    }

    #[test]
    fn diagnostic_counting_ignores_follow_up_lines() {
        let out = "\
error[E0308]: mismatched types
  --> src/lib.rs:4:5
   = note: expected `u32`, found `&str`
help: the error above can be fixed with a cast
";
        assert_eq!(count_diagnostics(out, error_diag_re()), 1);
        assert_eq!(count_diagnostics("3 errors found in 1 file", error_diag_re()), 0);
    }

    #[test]
    fn diagnostic_counting_accepts_location_prefixes() {
        let out = "src/app.py:10: error: Incompatible return value\nsrc/app.py:22:5: error: Name not defined\n";
        assert_eq!(count_diagnostics(out, error_diag_re()), 2);

        let lint = "warning: unused variable `x`\n --> src/lib.rs:9:9\n   = note: this warning repeats\n";
        assert_eq!(count_diagnostics(lint, warning_diag_re()), 1);
    }

    #[test]
    fn security_findings_parsing() {
        let out = r#"{"results": [
            {"issue_severity": "HIGH"},
            {"issue_severity": "MEDIUM"},
            {"issue_severity": "MEDIUM"},
            {"issue_severity": "LOW"}
        ]}"#;
        assert_eq!(parse_security_findings(out), (1, 2));
        assert_eq!(parse_security_findings("not json"), (0, 0));
    }

    #[test]
    fn acceptance_requires_green_suite_and_coverage() {
        let gate = QualityGate::new(QualityConfig::default());
        let mut report = QualityReport {
            tests_passed: 10,
            tests_failed: 0,
            tests_total: 10,
            coverage_percent: 85.0,
            low_coverage_files: vec![],
            quality_score: 100,
        };
        assert!(gate.acceptable(&report));

        report.coverage_percent = 79.9;
        assert!(!gate.acceptable(&report));

        report.coverage_percent = 90.0;
        report.tests_failed = 1;
        assert!(!gate.acceptable(&report));
    }

    #[tokio::test]
    async fn failing_command_counts_as_failed_tests() {
        let dir = TempDir::new().unwrap();
        let config = QualityConfig {
            test_command: "exit 1".to_string(),
            ..QualityConfig::default()
        };
        let gate = QualityGate::new(config);
        let report = gate.validate(dir.path()).await.unwrap();
        assert!(report.tests_failed > 0);
        assert!(!gate.acceptable(&report));
    }

    #[tokio::test]
    async fn summary_in_output_wins_over_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = QualityConfig {
            test_command: "echo '7 passed; 0 failed'".to_string(),
            ..QualityConfig::default()
        };
        let gate = QualityGate::new(config);
        let report = gate.validate(dir.path()).await.unwrap();
        assert_eq!(report.tests_passed, 7);
        assert_eq!(report.tests_failed, 0);
        assert_eq!(report.tests_total, 7);
    }

    #[tokio::test]
    async fn timeout_is_a_failure_not_an_error() {
        let dir = TempDir::new().unwrap();
        let config = QualityConfig {
            test_command: "sleep 5".to_string(),
            test_timeout_secs: 1,
            ..QualityConfig::default()
        };
        let gate = QualityGate::new(config);
        let report = gate.validate(dir.path()).await.unwrap();
        assert_eq!(report.tests_failed, 1);
    }
}
