//! The workflow state machine: drives one change through its lane's stages,
//! resuming from the todo checklist, with quality gates after implementation
//! and the docs-lane code guard up front.

use crate::change::{Change, Location};
use crate::config::{Config, GuardConfig};
use crate::error::{Result, WorkflowError};
use crate::lane::{Lane, LaneRegistry};
use crate::progress::{NoopReporter, ProgressReporter};
use crate::quality::{QualityGateEvaluator, QualityGateResult};
use crate::run::{RunState, WorkflowRun, OUTPUT_EXCERPT_LIMIT};
use crate::stage::{FailureKind, StageExecutor, StageOutcome};
use crate::todo::TodoList;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use uuid::Uuid;

pub const QUALITY_GATE_FAILURE: &str = "quality gate failure";

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Walk every stage without touching disk.
    pub dry_run: bool,
    /// Bypass the docs-lane guard and, on a strict lane, a failing gate.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateReport {
    /// Dry run: gates would be evaluated after implementation.
    WouldRun,
    Evaluated {
        result: QualityGateResult,
        /// The gate failed but the run continued under `force`.
        forced: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub change_id: String,
    pub lane: String,
    pub state: RunState,
    pub dry_run: bool,
    /// Stages already ticked in the todo checklist.
    pub skipped: Vec<Stage>,
    pub outcomes: Vec<StageOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn executed(&self) -> Vec<Stage> {
        self.outcomes.iter().map(|o| o.stage).collect()
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

pub struct WorkflowOrchestrator {
    root: PathBuf,
    lanes: LaneRegistry,
    guard: GuardConfig,
    executor: StageExecutor,
    evaluator: QualityGateEvaluator,
    reporter: Box<dyn ProgressReporter>,
}

impl WorkflowOrchestrator {
    /// Build an orchestrator from validated config. Invalid custom lanes are
    /// a `Configuration` error here, before any change is touched.
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            lanes: config.lane_registry()?,
            guard: config.guard.clone(),
            executor: StageExecutor::new(config),
            evaluator: QualityGateEvaluator::with_shell(config.quality.clone()),
            reporter: Box::new(NoopReporter),
        })
    }

    pub fn with_executor(mut self, executor: StageExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_evaluator(mut self, evaluator: QualityGateEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn lanes(&self) -> &LaneRegistry {
        &self.lanes
    }

    /// Refuse a docs-lane run for a change that declares code files.
    pub fn check_guard(&self, change: &Change, lane: &Lane) -> Result<()> {
        if !lane.is_docs() {
            return Ok(());
        }
        let files = self.guard.code_files(&change.manifest.affected_files);
        if files.is_empty() {
            return Ok(());
        }
        Err(WorkflowError::GuardViolation {
            change: change.id().to_string(),
            files,
        })
    }

    /// Drive `change_id` through `lane_name` (unknown lanes fall back to
    /// standard).
    ///
    /// A halted run is `Ok` with `state == Halted`. Guard violations and
    /// archival failures are errors; the latter only after the halted status
    /// has been persisted.
    pub fn run(&self, change_id: &str, lane_name: &str, options: RunOptions) -> Result<RunReport> {
        let started = Instant::now();
        let mut change = Change::locate(&self.root, change_id)?;
        let lane = self.lanes.get_lane(lane_name).clone();

        if options.force {
            if let Err(e) = self.check_guard(&change, &lane) {
                tracing::warn!(change = %change.id(), "guard bypassed with --force: {e}");
            }
        } else {
            self.check_guard(&change, &lane)?;
        }

        let mut todo = TodoList::load_or_empty(&change.todo_path())?;
        let completed = todo.completed();
        let mut run = WorkflowRun::new(change.id(), &lane.name, completed.iter().copied());
        run.state = RunState::Running;

        let mut report = RunReport {
            run_id: run.run_id,
            change_id: change.id().to_string(),
            lane: lane.name.clone(),
            state: RunState::Running,
            dry_run: options.dry_run,
            skipped: Vec::new(),
            outcomes: Vec::new(),
            gate: None,
            last_completed: None,
            halted_at: None,
            halt_reason: None,
            duration_ms: 0,
        };

        tracing::info!(
            change = %change.id(),
            lane = %lane.name,
            dry_run = options.dry_run,
            already_complete = completed.len(),
            "run started"
        );
        self.reporter.run_started(change.id(), &lane, &completed);

        let mut archival_failure: Option<String> = None;

        for stage in lane.stages() {
            if completed.contains(&stage.id()) {
                tracing::info!(change = %change.id(), stage = stage.id(), "already complete, skipping");
                self.reporter.stage_skipped(change.id(), stage);
                report.skipped.push(stage);
                continue;
            }

            tracing::info!(change = %change.id(), stage = stage.id(), "{stage}");
            self.reporter.stage_started(change.id(), stage);
            let outcome = self.executor.execute(stage, &change, &lane, options.dry_run);
            run.record(&outcome);
            self.reporter.stage_finished(change.id(), &outcome);
            report.outcomes.push(outcome.clone());

            if !outcome.success {
                let first_line = outcome.output.lines().next().unwrap_or_default();
                let reason = format!("{stage} failed: {first_line}");
                log_halt(change.id(), stage, &reason, &outcome.output);
                run.halt(stage, reason);
                if outcome.failure == Some(FailureKind::Archival) {
                    archival_failure = Some(outcome.output.clone());
                }
                break;
            }

            // Gates are judged before implementation is ticked so a resumed
            // run evaluates them again.
            if stage == Stage::Implementation && lane.quality_gates_enabled {
                if options.dry_run {
                    report.gate = Some(GateReport::WouldRun);
                } else {
                    let result = match self.evaluate_gates(&change, &lane) {
                        Ok(result) => result,
                        Err(e) => {
                            let reason =
                                format!("{stage} failed: could not record quality gates: {e}");
                            log_halt(change.id(), stage, &reason, "");
                            run.halt(stage, reason);
                            run.save(&change.dir())?;
                            run.append_history(&self.root)?;
                            return Err(e);
                        }
                    };
                    let passed = result.passed();
                    let forced = !passed && lane.strict_thresholds && options.force;
                    let failing = result
                        .failing_tools()
                        .iter()
                        .map(|t| format!("{t}: {}", result.tools[t].message))
                        .collect::<Vec<_>>()
                        .join("\n");
                    report.gate = Some(GateReport::Evaluated { result, forced });
                    if forced {
                        tracing::warn!(change = %change.id(), "continuing past failing quality gate under --force\n{failing}");
                    } else if !passed {
                        log_halt(change.id(), stage, QUALITY_GATE_FAILURE, &failing);
                        run.halt(stage, QUALITY_GATE_FAILURE);
                        break;
                    }
                }
            }

            if !options.dry_run {
                if stage == Stage::Archive {
                    change.location = Location::Archived;
                }
                if stage == Stage::Todo {
                    todo = TodoList::load_or_empty(&change.todo_path())?;
                }
                todo.mark_complete(&change.todo_path(), stage)?;
                run.mark_completed(stage);
                run.save(&change.dir())?;
            }
            report.last_completed = Some(stage);
        }

        if run.state == RunState::Running {
            run.complete();
        }
        if !options.dry_run {
            run.save(&change.dir())?;
            run.append_history(&self.root)?;
        }

        let elapsed = started.elapsed();
        if elapsed > lane.max_duration {
            tracing::warn!(
                change = %change.id(),
                lane = %lane.name,
                elapsed_secs = elapsed.as_secs(),
                budget_secs = lane.max_duration.as_secs(),
                "run exceeded lane duration budget"
            );
        }

        report.state = run.state;
        report.halted_at = (run.state == RunState::Halted)
            .then_some(run.current_stage)
            .flatten();
        report.halt_reason = run.halt_reason.clone();
        report.duration_ms = elapsed.as_millis() as u64;
        tracing::info!(change = %change.id(), state = %report.state, "run finished");
        self.reporter.run_finished(&report);

        match archival_failure {
            Some(reason) => Err(WorkflowError::ArchivalIo {
                change: change.id().to_string(),
                reason,
            }),
            None => Ok(report),
        }
    }

    /// Run independent changes on up to `jobs` worker threads, one change per
    /// worker at a time. Results come back in input order.
    pub fn run_batch(
        &self,
        change_ids: &[String],
        lane_name: &str,
        options: RunOptions,
        jobs: usize,
    ) -> Vec<(String, Result<RunReport>)> {
        let workers = jobs.clamp(1, change_ids.len().max(1));
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(id) = change_ids.get(i) else { break };
                    if tx.send((i, self.run(id, lane_name, options))).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut results: Vec<(usize, Result<RunReport>)> = rx.into_iter().collect();
        results.sort_by_key(|(i, _)| *i);
        results
            .into_iter()
            .map(|(i, r)| (change_ids[i].clone(), r))
            .collect()
    }

    fn evaluate_gates(&self, change: &Change, lane: &Lane) -> Result<QualityGateResult> {
        let targets = self.guard.code_files(&change.manifest.affected_files);
        let result = self.evaluator.run_all(lane, &change.root, &targets);
        result.save(&change.dir())?;
        tracing::info!(change = %change.id(), overall = %result.overall, "quality gates evaluated");
        self.reporter.gate_evaluated(change.id(), &result);
        Ok(result)
    }
}

fn log_halt(change_id: &str, stage: Stage, reason: &str, output: &str) {
    tracing::warn!(
        change = %change_id,
        stage = stage.id(),
        reason,
        output = %crate::io::truncate_tail(output, OUTPUT_EXCERPT_LIMIT),
        "run halted"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
