//! Stage execution: one capability per stage, with errors and panics from
//! collaborators turned into a failed `StageOutcome` rather than propagated.

use crate::change::Change;
use crate::config::{Config, ScriptConfig};
use crate::document::{
    DocumentGenerator, DocumentValidator, GenerationRequest, SectionValidator, TemplateGenerator,
};
use crate::error::WorkflowError;
use crate::lane::Lane;
use crate::paths;
use crate::types::{ArtifactKind, Stage, StageKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// StageOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage's own work failed (script exit code, generator error, panic).
    Stage,
    /// An artifact is missing required sections.
    Validation,
    Timeout,
    /// Moving the change directory failed; the orchestrator treats this as fatal.
    Archival,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

struct StageFailure {
    kind: FailureKind,
    message: String,
}

impl StageFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<WorkflowError> for StageFailure {
    fn from(e: WorkflowError) -> Self {
        let kind = match &e {
            WorkflowError::ArtifactValidation { .. } => FailureKind::Validation,
            WorkflowError::ToolTimeout { .. } => FailureKind::Timeout,
            WorkflowError::ArchivalIo { .. } => FailureKind::Archival,
            _ => FailureKind::Stage,
        };
        Self::new(kind, e.to_string())
    }
}

type StepResult = std::result::Result<String, StageFailure>;

// ---------------------------------------------------------------------------
// StageExecutor
// ---------------------------------------------------------------------------

pub struct StageExecutor {
    generator: Box<dyn DocumentGenerator>,
    validator: Box<dyn DocumentValidator>,
    scripts: BTreeMap<String, ScriptConfig>,
}

impl StageExecutor {
    /// Executor with the template generator and section validator.
    pub fn new(config: &Config) -> Self {
        Self::with_collaborators(config, Box::new(TemplateGenerator), Box::new(SectionValidator))
    }

    pub fn with_collaborators(
        config: &Config,
        generator: Box<dyn DocumentGenerator>,
        validator: Box<dyn DocumentValidator>,
    ) -> Self {
        Self {
            generator,
            validator,
            scripts: config.scripts.clone(),
        }
    }

    /// Run one stage for `change`. Never returns an error: every failure,
    /// including a panicking collaborator, becomes `success = false`.
    ///
    /// With `dry_run` nothing on disk changes; the output describes what
    /// would have happened.
    pub fn execute(&self, stage: Stage, change: &Change, lane: &Lane, dry_run: bool) -> StageOutcome {
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(stage, change, lane, dry_run)))
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(StageFailure::new(
                    FailureKind::Stage,
                    format!("stage panicked: {message}"),
                ))
            });
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::debug!(change = %change.id(), stage = stage.id(), dry_run, "{output}");
                StageOutcome {
                    stage,
                    success: true,
                    output,
                    duration_ms,
                    failure: None,
                }
            }
            Err(f) => StageOutcome {
                stage,
                success: false,
                output: f.message,
                duration_ms,
                failure: Some(f.kind),
            },
        }
    }

    fn dispatch(&self, stage: Stage, change: &Change, lane: &Lane, dry_run: bool) -> StepResult {
        match stage.kind() {
            StageKind::ScaffoldTodo => scaffold_todo(change, dry_run),
            StageKind::PrepareArtifact { artifact, sources } => {
                self.prepare_artifact(change, artifact, sources, dry_run)
            }
            StageKind::CrossValidate => self.cross_validate(change, lane, dry_run),
            StageKind::RunScript => self.run_script(stage, change, dry_run),
            StageKind::ArchiveChange => archive_change(change, dry_run),
        }
    }

    // -----------------------------------------------------------------------
    // prepare-artifact
    // -----------------------------------------------------------------------

    fn prepare_artifact(
        &self,
        change: &Change,
        artifact: ArtifactKind,
        sources: &[ArtifactKind],
        dry_run: bool,
    ) -> StepResult {
        let path = change.artifact_path(artifact);
        let existing = change.read_artifact(artifact)?;

        if dry_run {
            return Ok(match existing {
                Some(_) => format!("would validate existing {}", artifact.filename()),
                None => format!("would generate {}", artifact.filename()),
            });
        }

        let (content, generated) = match existing {
            Some(content) => (content, false),
            None => {
                let mut inputs = BTreeMap::new();
                for &src in sources {
                    if let Some(text) = change.read_artifact(src)? {
                        inputs.insert(src, text);
                    }
                }
                let content = self.generator.generate(&GenerationRequest {
                    change: &change.manifest,
                    artifact,
                    sources: &inputs,
                })?;
                crate::io::atomic_write(&path, content.as_bytes())?;
                (content, true)
            }
        };

        let report = self.validator.validate(artifact, &content);
        for warning in &report.warnings {
            tracing::warn!(change = %change.id(), artifact = %artifact, "{warning}");
        }
        for suggestion in &report.suggestions {
            tracing::debug!(change = %change.id(), artifact = %artifact, "{suggestion}");
        }
        if !report.is_valid() {
            return Err(WorkflowError::ArtifactValidation {
                artifact: artifact.filename().to_string(),
                errors: report.errors,
            }
            .into());
        }

        Ok(if generated {
            format!("generated {}", artifact.filename())
        } else {
            format!("{} already present", artifact.filename())
        })
    }

    // -----------------------------------------------------------------------
    // cross-validation
    // -----------------------------------------------------------------------

    /// Check every artifact the lane produces before cross-validation and
    /// write `cross_validation_report.md`. A report already showing PASS is
    /// left alone; a failing one is rebuilt on the next run.
    fn cross_validate(&self, change: &Change, lane: &Lane, dry_run: bool) -> StepResult {
        let report_kind = ArtifactKind::CrossValidationReport;
        let expected: Vec<ArtifactKind> = lane
            .stages()
            .filter(|s| *s < Stage::CrossValidation)
            .filter_map(Stage::artifact)
            .collect();

        if let Some(existing) = change.read_artifact(report_kind)? {
            if report_result(&existing) == Some("PASS") {
                return Ok(format!("{} already present", report_kind.filename()));
            }
        }
        if dry_run {
            return Ok(format!(
                "would cross-validate {} artifact(s) and write {}",
                expected.len(),
                report_kind.filename()
            ));
        }

        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        for kind in &expected {
            match change.read_artifact(*kind)? {
                None => issues.push(format!("`{}` is missing", kind.filename())),
                Some(content) => {
                    let report = self.validator.validate(*kind, &content);
                    issues.extend(report.errors.iter().map(|e| format!("`{}`: {e}", kind.filename())));
                    warnings.extend(report.warnings.iter().map(|w| format!("`{}`: {w}", kind.filename())));
                }
            }
        }

        let passed = issues.is_empty();
        let doc = render_cross_validation(&change.manifest.title, &expected, &issues, &warnings);
        crate::io::atomic_write(&change.artifact_path(report_kind), doc.as_bytes())?;

        if passed {
            Ok(format!(
                "cross-validated {} artifact(s), {} warning(s)",
                expected.len(),
                warnings.len()
            ))
        } else {
            Err(WorkflowError::ArtifactValidation {
                artifact: report_kind.filename().to_string(),
                errors: issues,
            }
            .into())
        }
    }

    // -----------------------------------------------------------------------
    // run-external-script
    // -----------------------------------------------------------------------

    fn run_script(&self, stage: Stage, change: &Change, dry_run: bool) -> StepResult {
        let Some(script) = self.scripts.get(stage.as_str()) else {
            return Ok(format!("no script configured for {}", stage.as_str()));
        };
        if dry_run {
            return Ok(format!("would run `{}`", script.command));
        }

        let envs = [
            ("OPENSPEC_CHANGE_ID", change.id().to_string()),
            ("OPENSPEC_CHANGE_DIR", change.dir().display().to_string()),
            ("OPENSPEC_STAGE", stage.as_str().to_string()),
        ];
        let timeout = (script.timeout_seconds > 0).then(|| Duration::from_secs(script.timeout_seconds));
        let output = crate::process::run_shell(stage.as_str(), &script.command, &change.root, &envs, timeout)?;

        let combined = output.combined();
        if output.success {
            Ok(if combined.is_empty() {
                format!("`{}` succeeded", script.command)
            } else {
                combined
            })
        } else {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(StageFailure::new(
                FailureKind::Stage,
                format!("`{}` exited with {code}\n{combined}", script.command),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// scaffold-todo / archive-change
// ---------------------------------------------------------------------------

fn scaffold_todo(change: &Change, dry_run: bool) -> StepResult {
    let path = change.todo_path();
    if path.exists() {
        return Ok(format!("{} already present", paths::TODO_FILE));
    }
    if dry_run {
        return Ok(format!("would create {}", paths::TODO_FILE));
    }
    let todo = crate::todo::render(change.id(), &change.manifest.title);
    crate::io::write_if_missing(&path, todo.as_bytes())?;
    Ok(format!("created {}", paths::TODO_FILE))
}

/// Move the change directory into the archive. A change that is already in
/// the archive (and no longer active) counts as done.
fn archive_change(change: &Change, dry_run: bool) -> StepResult {
    let id = change.id();
    let source = paths::change_dir(&change.root, id);
    let target = paths::archived_change_dir(&change.root, id);
    let archival = |reason: String| {
        StageFailure::from(WorkflowError::ArchivalIo {
            change: id.to_string(),
            reason,
        })
    };

    match (source.exists(), target.exists()) {
        (false, true) => Ok(format!("{id} already archived")),
        (true, true) => Err(archival(format!(
            "both {} and {} exist",
            source.display(),
            target.display()
        ))),
        (false, false) => Err(archival(format!("{} does not exist", source.display()))),
        (true, false) if dry_run => Ok(format!(
            "would move {} to {}",
            source.display(),
            target.display()
        )),
        (true, false) => {
            crate::io::ensure_dir(&paths::archive_dir(&change.root))
                .map_err(|e| archival(e.to_string()))?;
            std::fs::rename(&source, &target).map_err(|e| archival(e.to_string()))?;
            tracing::info!(change = %id, to = %target.display(), "archived change");
            Ok(format!("archived to {}", target.display()))
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-validation report rendering
// ---------------------------------------------------------------------------

fn report_result(content: &str) -> Option<&str> {
    crate::document::section_body(content, "## Result")
        .into_iter()
        .map(str::trim)
        .find(|l| !l.is_empty())
}

fn render_cross_validation(
    title: &str,
    checked: &[ArtifactKind],
    issues: &[String],
    warnings: &[String],
) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "- None\n".to_string()
        } else {
            items.iter().map(|i| format!("- {i}\n")).collect()
        }
    };
    let checked: Vec<String> = checked.iter().map(|k| format!("`{}`", k.filename())).collect();
    format!(
        "# Cross-Validation Report: {title}\n\n## Result\n\n{}\n\n## Checked\n\n{}\n## Issues\n\n{}\n## Warnings\n\n{}",
        if issues.is_empty() { "PASS" } else { "FAIL" },
        list(&checked),
        list(issues),
        list(warnings),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ValidationReport;
    use crate::lane::{LaneRegistry, DOCS_LANE, STANDARD_LANE};
    use chrono::NaiveDate;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(dir: &Path) -> Change {
        Change::create(
            dir,
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            "sync-notes",
            "Sync notes",
            Some("Edits are lost when two devices sync".to_string()),
            vec!["docs/sync.md".to_string()],
        )
        .unwrap()
    }

    fn standard() -> Lane {
        LaneRegistry::builtin().get_lane(STANDARD_LANE).clone()
    }

    fn executor() -> StageExecutor {
        StageExecutor::new(&Config::new("p"))
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(d) = stack.pop() {
            for entry in std::fs::read_dir(&d).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.insert(
                        path.strip_prefix(dir).unwrap().display().to_string(),
                        std::fs::read_to_string(&path).unwrap(),
                    );
                }
            }
        }
        files
    }

    #[test]
    fn prepare_stage_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = executor();

        let first = exec.execute(Stage::Proposal, &change, &standard(), false);
        assert!(first.success, "{}", first.output);
        assert_eq!(first.output, "generated proposal.md");
        let before = snapshot(dir.path());

        let second = exec.execute(Stage::Proposal, &change, &standard(), false);
        assert!(second.success);
        assert_eq!(second.output, "proposal.md already present");
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn specification_reads_the_proposal() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = executor();
        exec.execute(Stage::Proposal, &change, &standard(), false);
        assert!(exec.execute(Stage::Specification, &change, &standard(), false).success);
        let spec = change.read_artifact(ArtifactKind::Spec).unwrap().unwrap();
        assert!(spec.contains("SHALL support: Sync notes"));
    }

    #[test]
    fn invalid_existing_artifact_fails_validation() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        std::fs::write(change.artifact_path(ArtifactKind::Proposal), "# Proposal\n\n## Why\n").unwrap();
        let outcome = executor().execute(Stage::Proposal, &change, &standard(), false);
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Validation));
        assert!(outcome.output.contains("## What Changes"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        std::fs::remove_file(change.todo_path()).unwrap();
        let before = snapshot(dir.path());
        let exec = executor();
        for &stage in Stage::all() {
            let outcome = exec.execute(stage, &change, &standard(), true);
            assert!(outcome.success, "{stage}: {}", outcome.output);
        }
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn scaffold_todo_writes_checklist_once() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        std::fs::remove_file(change.todo_path()).unwrap();
        let exec = executor();
        assert_eq!(
            exec.execute(Stage::Todo, &change, &standard(), false).output,
            "created todo.md"
        );
        assert_eq!(
            exec.execute(Stage::Todo, &change, &standard(), false).output,
            "todo.md already present"
        );
    }

    #[test]
    fn script_stage_without_command_is_noop() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let outcome = executor().execute(Stage::VersionBump, &change, &standard(), false);
        assert!(outcome.success);
        assert_eq!(outcome.output, "no script configured for version_bump");
    }

    #[test]
    fn script_stage_runs_with_environment() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let mut config = Config::new("p");
        config.scripts.insert(
            "pull_request".to_string(),
            ScriptConfig {
                command: "echo $OPENSPEC_STAGE $OPENSPEC_CHANGE_ID".to_string(),
                timeout_seconds: 10,
            },
        );
        let outcome = StageExecutor::new(&config).execute(Stage::PullRequest, &change, &standard(), false);
        assert!(outcome.success);
        assert_eq!(outcome.output, "pull_request 2026-10-19-sync-notes");
    }

    #[test]
    fn failing_and_slow_scripts_fail_the_stage() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let mut config = Config::new("p");
        config.scripts.insert(
            "version_bump".to_string(),
            ScriptConfig {
                command: "echo nope; exit 2".to_string(),
                timeout_seconds: 10,
            },
        );
        config.scripts.insert(
            "script_generation".to_string(),
            ScriptConfig {
                command: "sleep 5".to_string(),
                timeout_seconds: 1,
            },
        );
        let exec = StageExecutor::new(&config);

        let failed = exec.execute(Stage::VersionBump, &change, &standard(), false);
        assert!(!failed.success);
        assert_eq!(failed.failure, Some(FailureKind::Stage));
        assert!(failed.output.contains("exited with 2"));
        assert!(failed.output.contains("nope"));

        let slow = exec.execute(Stage::ScriptGeneration, &change, &standard(), false);
        assert!(!slow.success);
        assert_eq!(slow.failure, Some(FailureKind::Timeout));
        assert!(slow.output.contains("timed out"));
    }

    #[test]
    fn archive_then_archive_again_succeeds() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = executor();

        let first = exec.execute(Stage::Archive, &change, &standard(), false);
        assert!(first.success, "{}", first.output);
        assert!(!paths::change_dir(dir.path(), change.id()).exists());
        assert!(paths::archived_change_dir(dir.path(), change.id()).join("todo.md").exists());

        let second = exec.execute(Stage::Archive, &change, &standard(), false);
        assert!(second.success);
        assert!(second.output.contains("already archived"));
    }

    #[test]
    fn archive_conflict_is_archival_failure() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        std::fs::create_dir_all(paths::archived_change_dir(dir.path(), change.id())).unwrap();
        let outcome = executor().execute(Stage::Archive, &change, &standard(), false);
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Archival));
        assert!(paths::change_dir(dir.path(), change.id()).exists());
    }

    #[test]
    fn cross_validation_reports_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = executor();
        let docs = LaneRegistry::builtin().get_lane(DOCS_LANE).clone();

        exec.execute(Stage::Proposal, &change, &docs, false);
        let failed = exec.execute(Stage::CrossValidation, &change, &docs, false);
        assert!(!failed.success);
        assert_eq!(failed.failure, Some(FailureKind::Validation));
        assert!(failed.output.contains("`spec.md` is missing"));
        let report = change.read_artifact(ArtifactKind::CrossValidationReport).unwrap().unwrap();
        assert_eq!(report_result(&report), Some("FAIL"));

        for stage in [Stage::Specification, Stage::TaskBreakdown, Stage::Documentation] {
            assert!(exec.execute(stage, &change, &docs, false).success);
        }
        let passed = exec.execute(Stage::CrossValidation, &change, &docs, false);
        assert!(passed.success, "{}", passed.output);
        assert!(passed.output.starts_with("cross-validated 4 artifact(s)"));
        let again = exec.execute(Stage::CrossValidation, &change, &docs, false);
        assert_eq!(again.output, "cross_validation_report.md already present");
    }

    struct PanickingGenerator;

    impl DocumentGenerator for PanickingGenerator {
        fn generate(&self, _: &GenerationRequest<'_>) -> crate::Result<String> {
            panic!("template engine exploded")
        }
    }

    struct RejectAll;

    impl DocumentValidator for RejectAll {
        fn validate(&self, _: ArtifactKind, _: &str) -> ValidationReport {
            ValidationReport {
                errors: vec!["rejected".to_string()],
                ..Default::default()
            }
        }
    }

    #[test]
    fn collaborator_panic_becomes_failure() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = StageExecutor::with_collaborators(
            &Config::new("p"),
            Box::new(PanickingGenerator),
            Box::new(SectionValidator),
        );
        let outcome = exec.execute(Stage::Proposal, &change, &standard(), false);
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Stage));
        assert!(outcome.output.contains("template engine exploded"));
    }

    #[test]
    fn validator_errors_halt_the_stage() {
        let dir = TempDir::new().unwrap();
        let change = setup(dir.path());
        let exec = StageExecutor::with_collaborators(
            &Config::new("p"),
            Box::new(TemplateGenerator),
            Box::new(RejectAll),
        );
        let outcome = exec.execute(Stage::Review, &change, &standard(), false);
        assert!(!outcome.success);
        assert!(outcome.output.contains("review_summary.md"));
        assert!(outcome.output.contains("rejected"));
    }
}
