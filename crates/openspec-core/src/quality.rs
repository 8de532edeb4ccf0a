//! Quality gates: lint, type-check, test and security-scan results judged
//! against lane thresholds.
//!
//! Leniency policy: a tool that cannot run (missing, timed out) or whose
//! output cannot be parsed is `SKIP`, and `SKIP` never fails the gate. Only
//! a threshold violation (`FAIL`) does.

use crate::config::{QualityConfig, ToolCommand};
use crate::error::{Result, WorkflowError};
use crate::lane::Lane;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

pub const TARGETS_PLACEHOLDER: &str = "{targets}";

// ---------------------------------------------------------------------------
// QualityTool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTool {
    Lint,
    TypeCheck,
    Test,
    Security,
}

impl QualityTool {
    pub fn all() -> &'static [QualityTool] {
        &[
            QualityTool::Lint,
            QualityTool::TypeCheck,
            QualityTool::Test,
            QualityTool::Security,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTool::Lint => "lint",
            QualityTool::TypeCheck => "type_check",
            QualityTool::Test => "test",
            QualityTool::Security => "security",
        }
    }

    pub fn default_command(self) -> &'static str {
        match self {
            QualityTool::Lint => "ruff check --output-format json {targets}",
            QualityTool::TypeCheck => "mypy {targets}",
            QualityTool::Test => "pytest --cov --cov-report=term {targets}",
            QualityTool::Security => "bandit -f json -q -r {targets}",
        }
    }
}

impl fmt::Display for QualityTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub enabled: bool,
    pub max_lint_errors: u64,
    pub max_type_errors: u64,
    pub min_test_pass_rate: f64,
    pub min_coverage: f64,
    pub max_high_severity: u64,
}

impl Thresholds {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::standard()
        }
    }

    pub fn standard() -> Self {
        Self {
            enabled: true,
            max_lint_errors: 0,
            max_type_errors: 0,
            min_test_pass_rate: 0.80,
            min_coverage: 0.70,
            max_high_severity: 0,
        }
    }

    pub fn strict() -> Self {
        Self {
            min_test_pass_rate: 1.0,
            min_coverage: 0.85,
            ..Self::standard()
        }
    }

    pub fn for_lane(lane: &Lane) -> Self {
        match (lane.quality_gates_enabled, lane.strict_thresholds) {
            (false, _) => Self::disabled(),
            (true, false) => Self::standard(),
            (true, true) => Self::strict(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolStatus::Pass => "PASS",
            ToolStatus::Fail => "FAIL",
            ToolStatus::Skip => "SKIP",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_threshold: Option<f64>,
    pub message: String,
}

impl ToolReport {
    fn skip(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Skip,
            metric_value: None,
            threshold: None,
            coverage: None,
            coverage_threshold: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub lane: String,
    pub enabled: bool,
    pub tools: BTreeMap<QualityTool, ToolReport>,
    pub overall: Verdict,
    pub timestamp: DateTime<Utc>,
}

impl QualityGateResult {
    pub fn passed(&self) -> bool {
        self.overall == Verdict::Pass
    }

    pub fn failing_tools(&self) -> Vec<QualityTool> {
        self.tools
            .iter()
            .filter(|(_, r)| r.status == ToolStatus::Fail)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Write `quality_metrics.json` (latest) and a timestamped copy under
    /// `quality_reports/`. Returns the timestamped path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&dir.join(crate::paths::QUALITY_METRICS_FILE), data.as_bytes())?;
        let keyed = dir.join(crate::paths::QUALITY_REPORTS_DIR).join(format!(
            "quality_metrics-{}.json",
            self.timestamp.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        crate::io::atomic_write(&keyed, data.as_bytes())?;
        Ok(keyed)
    }

    pub fn load_latest(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(crate::paths::QUALITY_METRICS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}

// ---------------------------------------------------------------------------
// ToolRunner
// ---------------------------------------------------------------------------

pub struct ToolInvocation<'a> {
    pub tool: QualityTool,
    pub command: &'a str,
    pub cwd: &'a Path,
    pub targets: &'a [String],
    pub timeout: Duration,
}

/// Runs one external tool and returns its raw output. `ToolUnavailable` and
/// `ToolTimeout` errors become `SKIP`.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation<'_>) -> Result<String>;
}

/// Runs tools through `sh -c`, substituting `{targets}` with the target paths
/// (or `.` when there are none).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellToolRunner;

impl ToolRunner for ShellToolRunner {
    fn run(&self, invocation: &ToolInvocation<'_>) -> Result<String> {
        let targets = if invocation.targets.is_empty() {
            ".".to_string()
        } else {
            invocation
                .targets
                .iter()
                .map(|t| shell_quote(t))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let command = invocation.command.replace(TARGETS_PLACEHOLDER, &targets);
        let timeout = (!invocation.timeout.is_zero()).then_some(invocation.timeout);
        let output = crate::process::run_shell(
            invocation.tool.as_str(),
            &command,
            invocation.cwd,
            &[],
            timeout,
        )?;
        Ok(output.combined())
    }
}

fn shell_quote(s: &str) -> String {
    if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// Output parsers
// ---------------------------------------------------------------------------

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

static FOUND_ERRORS_RE: OnceLock<Regex> = OnceLock::new();
static PASSED_RE: OnceLock<Regex> = OnceLock::new();
static FAILED_RE: OnceLock<Regex> = OnceLock::new();
static ERRORS_RE: OnceLock<Regex> = OnceLock::new();
static COVERAGE_RE: OnceLock<Regex> = OnceLock::new();
static HIGH_SEVERITY_RE: OnceLock<Regex> = OnceLock::new();

fn found_errors(output: &str) -> Option<u64> {
    re(&FOUND_ERRORS_RE, r"Found (\d+) errors?")
        .captures(output)
        .and_then(|c| c[1].parse().ok())
}

/// Lint error count from a JSON diagnostics array or a `Found N errors` line.
pub fn parse_lint(output: &str) -> Option<u64> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<serde_json::Value>>(trimmed)
            .ok()
            .map(|v| v.len() as u64);
    }
    if let Some(n) = found_errors(trimmed) {
        return Some(n);
    }
    trimmed.contains("All checks passed").then_some(0)
}

/// Type error count from a `Found N errors in M files` or success summary.
pub fn parse_type_check(output: &str) -> Option<u64> {
    if let Some(n) = found_errors(output) {
        return Some(n);
    }
    output.contains("Success: no issues found").then_some(0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestMetrics {
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    /// Line coverage as a fraction in `[0, 1]`, when reported.
    pub coverage: Option<f64>,
}

impl TestMetrics {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed + self.errors;
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64
        }
    }
}

fn last_count(regex: &Regex, output: &str) -> Option<u64> {
    regex
        .captures_iter(output)
        .last()
        .and_then(|c| c[1].parse().ok())
}

/// Test counts from a pytest-style summary plus the `TOTAL ... NN%` coverage
/// line. `None` when no tests were counted.
pub fn parse_test(output: &str) -> Option<TestMetrics> {
    let passed = last_count(re(&PASSED_RE, r"(\d+) passed"), output);
    let failed = last_count(re(&FAILED_RE, r"(\d+) failed"), output);
    let errors = last_count(re(&ERRORS_RE, r"(\d+) errors?\b"), output);
    if passed.is_none() && failed.is_none() && errors.is_none() {
        return None;
    }
    let metrics = TestMetrics {
        passed: passed.unwrap_or(0),
        failed: failed.unwrap_or(0),
        errors: errors.unwrap_or(0),
        coverage: re(&COVERAGE_RE, r"(?m)^TOTAL\s.*?(\d+(?:\.\d+)?)%\s*$")
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .map(|pct| pct / 100.0),
    };
    (metrics.passed + metrics.failed + metrics.errors > 0).then_some(metrics)
}

/// High-severity finding count from a JSON report (`results[].issue_severity`)
/// or text `Severity: High` lines.
pub fn parse_security(output: &str) -> Option<u64> {
    let trimmed = output.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let results = value.get("results")?.as_array()?;
        let high = results
            .iter()
            .filter(|r| {
                r.get("issue_severity")
                    .and_then(|s| s.as_str())
                    .is_some_and(|s| s.eq_ignore_ascii_case("high"))
            })
            .count();
        return Some(high as u64);
    }
    let high = re(&HIGH_SEVERITY_RE, r"(?mi)Severity:\s*High\b")
        .find_iter(trimmed)
        .count() as u64;
    if high > 0 {
        return Some(high);
    }
    trimmed.contains("No issues identified").then_some(0)
}

// ---------------------------------------------------------------------------
// Judging
// ---------------------------------------------------------------------------

fn judge_count(count: u64, max: u64, noun: &str) -> ToolReport {
    let status = if count <= max {
        ToolStatus::Pass
    } else {
        ToolStatus::Fail
    };
    ToolReport {
        status,
        metric_value: Some(count as f64),
        threshold: Some(max as f64),
        coverage: None,
        coverage_threshold: None,
        message: format!("{count} {noun} (max {max})"),
    }
}

/// Judge raw tool output against thresholds; unparseable output is `SKIP`.
pub fn judge(tool: QualityTool, output: &str, thresholds: &Thresholds) -> ToolReport {
    let unparsed = || ToolReport::skip(format!("could not parse {tool} output"));
    match tool {
        QualityTool::Lint => parse_lint(output)
            .map(|n| judge_count(n, thresholds.max_lint_errors, "lint errors"))
            .unwrap_or_else(unparsed),
        QualityTool::TypeCheck => parse_type_check(output)
            .map(|n| judge_count(n, thresholds.max_type_errors, "type errors"))
            .unwrap_or_else(unparsed),
        QualityTool::Security => parse_security(output)
            .map(|n| judge_count(n, thresholds.max_high_severity, "high-severity findings"))
            .unwrap_or_else(unparsed),
        QualityTool::Test => match parse_test(output) {
            None => unparsed(),
            Some(m) => {
                let rate = m.pass_rate();
                let rate_ok = rate >= thresholds.min_test_pass_rate;
                let coverage_ok = m.coverage.map_or(true, |c| c >= thresholds.min_coverage);
                let mut message = format!(
                    "{} passed, {} failed, {} errors; pass rate {:.0}% (min {:.0}%)",
                    m.passed,
                    m.failed,
                    m.errors,
                    rate * 100.0,
                    thresholds.min_test_pass_rate * 100.0
                );
                match m.coverage {
                    Some(c) => message.push_str(&format!(
                        "; coverage {:.0}% (min {:.0}%)",
                        c * 100.0,
                        thresholds.min_coverage * 100.0
                    )),
                    None => message.push_str("; coverage not reported"),
                }
                ToolReport {
                    status: if rate_ok && coverage_ok {
                        ToolStatus::Pass
                    } else {
                        ToolStatus::Fail
                    },
                    metric_value: Some(rate),
                    threshold: Some(thresholds.min_test_pass_rate),
                    coverage: m.coverage,
                    coverage_threshold: Some(thresholds.min_coverage),
                    message,
                }
            }
        },
    }
}

// ---------------------------------------------------------------------------
// QualityGateEvaluator
// ---------------------------------------------------------------------------

pub struct QualityGateEvaluator {
    config: QualityConfig,
    runner: Box<dyn ToolRunner>,
}

impl QualityGateEvaluator {
    pub fn new(config: QualityConfig, runner: Box<dyn ToolRunner>) -> Self {
        Self { config, runner }
    }

    pub fn with_shell(config: QualityConfig) -> Self {
        Self::new(config, Box::new(ShellToolRunner))
    }

    /// Run every tool for `lane` in `cwd` and judge the results.
    ///
    /// A lane with gates disabled short-circuits to PASS without invoking
    /// anything.
    pub fn run_all(&self, lane: &Lane, cwd: &Path, targets: &[String]) -> QualityGateResult {
        let thresholds = Thresholds::for_lane(lane);
        let mut tools = BTreeMap::new();

        if !thresholds.enabled {
            tracing::info!(lane = %lane.name, "quality gates disabled for lane");
            return QualityGateResult {
                lane: lane.name.clone(),
                enabled: false,
                tools,
                overall: Verdict::Pass,
                timestamp: Utc::now(),
            };
        }

        for &tool in QualityTool::all() {
            let report = self.run_tool(tool, &self.config.command_for(tool), cwd, targets, &thresholds);
            tracing::info!(tool = %tool, status = %report.status, "{}", report.message);
            tools.insert(tool, report);
        }

        let overall = if tools.values().any(|r| r.status == ToolStatus::Fail) {
            Verdict::Fail
        } else {
            Verdict::Pass
        };

        QualityGateResult {
            lane: lane.name.clone(),
            enabled: true,
            tools,
            overall,
            timestamp: Utc::now(),
        }
    }

    fn run_tool(
        &self,
        tool: QualityTool,
        command: &ToolCommand,
        cwd: &Path,
        targets: &[String],
        thresholds: &Thresholds,
    ) -> ToolReport {
        if !command.enabled {
            return ToolReport::skip(format!("{tool} disabled in config"));
        }
        let invocation = ToolInvocation {
            tool,
            command: &command.command,
            cwd,
            targets,
            timeout: command.timeout(),
        };
        match self.runner.run(&invocation) {
            Ok(output) => judge(tool, &output, thresholds),
            Err(e @ (WorkflowError::ToolUnavailable(_) | WorkflowError::ToolTimeout { .. })) => {
                tracing::warn!(tool = %tool, error = %e, "quality tool skipped");
                ToolReport::skip(e.to_string())
            }
            Err(e) => {
                tracing::warn!(tool = %tool, error = %e, "quality tool could not run");
                ToolReport::skip(format!("{tool} could not run: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::{LaneRegistry, DOCS_LANE, HEAVY_LANE, STANDARD_LANE};
    use crate::test_support::{passing_runner as passing, Reply, ScriptedToolRunner};
    use tempfile::TempDir;

    fn evaluate(runner: ScriptedToolRunner, lane: &str) -> QualityGateResult {
        let registry = LaneRegistry::builtin();
        QualityGateEvaluator::new(QualityConfig::default(), Box::new(runner)).run_all(
            registry.get_lane(lane),
            Path::new("."),
            &[],
        )
    }

    #[test]
    fn all_tools_pass() {
        let result = evaluate(passing(), STANDARD_LANE);
        assert_eq!(result.overall, Verdict::Pass);
        assert!(result.tools.values().all(|r| r.status == ToolStatus::Pass));
        assert_eq!(result.tools[&QualityTool::Test].coverage, Some(0.9));
    }

    #[test]
    fn docs_lane_short_circuits_without_running_tools() {
        let runner = ScriptedToolRunner::new();
        let calls = runner.calls();
        let result = evaluate(runner, DOCS_LANE);
        assert_eq!(result.overall, Verdict::Pass);
        assert!(!result.enabled);
        assert!(result.tools.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unavailable_lint_is_skip_and_does_not_fail() {
        let runner = passing().reply(QualityTool::Lint, Reply::Unavailable);
        let result = evaluate(runner, STANDARD_LANE);
        assert_eq!(result.tools[&QualityTool::Lint].status, ToolStatus::Skip);
        assert_eq!(result.overall, Verdict::Pass);
    }

    #[test]
    fn timeout_is_skip() {
        let runner = passing().reply(QualityTool::Security, Reply::Timeout);
        let result = evaluate(runner, STANDARD_LANE);
        assert_eq!(result.tools[&QualityTool::Security].status, ToolStatus::Skip);
        assert_eq!(result.overall, Verdict::Pass);
    }

    #[test]
    fn unparseable_output_is_skip() {
        let runner = passing().reply(QualityTool::TypeCheck, Reply::Output("segfault".into()));
        let result = evaluate(runner, STANDARD_LANE);
        assert_eq!(result.tools[&QualityTool::TypeCheck].status, ToolStatus::Skip);
        assert_eq!(result.overall, Verdict::Pass);
    }

    #[test]
    fn any_fail_fails_overall() {
        let runner = passing()
            .reply(QualityTool::Lint, Reply::Unavailable)
            .reply(
                QualityTool::Security,
                Reply::Output(r#"{"results": [{"issue_severity": "HIGH"}, {"issue_severity": "LOW"}]}"#.into()),
            );
        let result = evaluate(runner, STANDARD_LANE);
        assert_eq!(result.tools[&QualityTool::Security].status, ToolStatus::Fail);
        assert_eq!(result.tools[&QualityTool::Security].metric_value, Some(1.0));
        assert_eq!(result.overall, Verdict::Fail);
        assert_eq!(result.failing_tools(), vec![QualityTool::Security]);
    }

    #[test]
    fn coverage_below_standard_threshold_fails() {
        let output = "TOTAL   100   40   60%\n===== 10 passed in 1.0s =====\n";
        let runner = passing().reply(QualityTool::Test, Reply::Output(output.into()));
        let result = evaluate(runner, STANDARD_LANE);
        let test = &result.tools[&QualityTool::Test];
        assert_eq!(test.status, ToolStatus::Fail);
        assert_eq!(test.coverage, Some(0.6));
        assert_eq!(test.coverage_threshold, Some(0.7));
        assert_eq!(result.overall, Verdict::Fail);
    }

    #[test]
    fn heavy_lane_uses_strict_thresholds() {
        // 80% coverage and 9/10 passing clears standard but not strict.
        let output = "TOTAL   100   20   80%\n=== 9 passed, 1 failed in 2s ===\n";
        let standard = evaluate(
            passing().reply(QualityTool::Test, Reply::Output(output.into())),
            STANDARD_LANE,
        );
        let heavy = evaluate(
            passing().reply(QualityTool::Test, Reply::Output(output.into())),
            HEAVY_LANE,
        );
        assert_eq!(standard.overall, Verdict::Pass);
        assert_eq!(heavy.overall, Verdict::Fail);
    }

    #[test]
    fn disabled_tool_is_skipped_without_running() {
        let mut config = QualityConfig::default();
        if let Some(cmd) = config.tools.get_mut(&QualityTool::Security) {
            cmd.enabled = false;
        }
        let runner = passing();
        let calls = runner.calls();
        let registry = LaneRegistry::builtin();
        let result = QualityGateEvaluator::new(config, Box::new(runner)).run_all(
            registry.get_lane(STANDARD_LANE),
            Path::new("."),
            &[],
        );
        assert_eq!(result.tools[&QualityTool::Security].status, ToolStatus::Skip);
        assert!(!calls.lock().unwrap().contains(&QualityTool::Security));
    }

    #[test]
    fn lint_parser_formats() {
        assert_eq!(parse_lint("[]"), Some(0));
        assert_eq!(parse_lint(r#"[{"code": "F401"}, {"code": "E501"}]"#), Some(2));
        assert_eq!(parse_lint("Found 3 errors.\n[*] 2 fixable"), Some(3));
        assert_eq!(parse_lint("All checks passed!"), Some(0));
        assert_eq!(parse_lint("[not json"), None);
        assert_eq!(parse_lint(""), None);
    }

    #[test]
    fn type_check_parser_formats() {
        assert_eq!(
            parse_type_check("a.py:1: error: bad\nFound 1 error in 1 file (checked 3 source files)"),
            Some(1)
        );
        assert_eq!(parse_type_check("Success: no issues found in 3 source files"), Some(0));
        assert_eq!(parse_type_check("mypy: command crashed"), None);
    }

    #[test]
    fn test_parser_formats() {
        let m = parse_test("== 3 failed, 7 passed, 1 error in 0.5s ==").unwrap();
        assert_eq!((m.passed, m.failed, m.errors), (7, 3, 1));
        assert_eq!(m.coverage, None);
        assert!(parse_test("no tests ran in 0.01s").is_none());
        let m = parse_test("TOTAL    10    1    87.5%\n== 1 passed ==").unwrap();
        assert_eq!(m.coverage, Some(0.875));
    }

    #[test]
    fn security_parser_formats() {
        assert_eq!(parse_security(r#"{"results": []}"#), Some(0));
        assert_eq!(parse_security(r#"{"unexpected": true}"#), None);
        assert_eq!(
            parse_security("Issue: x\n   Severity: High   Confidence: High\nSeverity: Low\n"),
            Some(1)
        );
        assert_eq!(parse_security("Test results:\n\tNo issues identified."), Some(0));
        assert_eq!(parse_security("Traceback (most recent call last)"), None);
    }

    #[test]
    fn result_is_persisted_with_timestamped_copy() {
        let dir = TempDir::new().unwrap();
        let result = evaluate(passing(), STANDARD_LANE);
        let keyed = result.save(dir.path()).unwrap();
        assert!(keyed.exists());
        assert!(keyed.starts_with(dir.path().join("quality_reports")));
        let latest = QualityGateResult::load_latest(dir.path()).unwrap().unwrap();
        assert_eq!(latest, result);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&keyed).unwrap()).unwrap();
        assert_eq!(json["overall"], "PASS");
        assert_eq!(json["lane"], "standard");
        assert_eq!(json["tools"]["lint"]["status"], "PASS");
    }

    #[test]
    fn shell_runner_substitutes_targets() {
        let out = ShellToolRunner
            .run(&ToolInvocation {
                tool: QualityTool::Lint,
                command: "echo {targets}",
                cwd: Path::new("/tmp"),
                targets: &["src/app.py".to_string(), "it's.py".to_string()],
                timeout: Duration::from_secs(5),
            })
            .unwrap();
        assert_eq!(out, "src/app.py it's.py");

        let out = ShellToolRunner
            .run(&ToolInvocation {
                tool: QualityTool::Lint,
                command: "echo {targets}",
                cwd: Path::new("/tmp"),
                targets: &[],
                timeout: Duration::from_secs(5),
            })
            .unwrap();
        assert_eq!(out, ".");
    }

    #[test]
    fn shell_runner_missing_binary_is_skip() {
        let mut config = QualityConfig::default();
        for cmd in config.tools.values_mut() {
            cmd.command = "no-such-quality-tool-xyz {targets}".to_string();
        }
        let registry = LaneRegistry::builtin();
        let result = QualityGateEvaluator::with_shell(config).run_all(
            registry.get_lane(STANDARD_LANE),
            Path::new("/tmp"),
            &[],
        );
        assert!(result.tools.values().all(|r| r.status == ToolStatus::Skip));
        assert_eq!(result.overall, Verdict::Pass);
    }
}
