use crate::error::Result;
use crate::paths;
use crate::stage::StageOutcome;
use crate::types::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Captured stage output kept in `status.json` and halt logs.
pub const OUTPUT_EXCERPT_LIMIT: usize = 2 * 1024;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Halted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::NotStarted => "NOT_STARTED",
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Halted => "HALTED",
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub success: bool,
    pub duration_ms: u64,
    pub output_excerpt: String,
}

impl From<&StageOutcome> for StageResult {
    fn from(o: &StageOutcome) -> Self {
        Self {
            success: o.success,
            duration_ms: o.duration_ms,
            output_excerpt: crate::io::truncate_tail(&o.output, OUTPUT_EXCERPT_LIMIT),
        }
    }
}

/// One orchestrator pass over a change, persisted as `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub change_id: String,
    pub lane: String,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub completed_stages: Vec<u8>,
    #[serde(default)]
    pub stage_results: BTreeMap<Stage, StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(change_id: &str, lane: &str, completed: impl IntoIterator<Item = u8>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            change_id: change_id.to_string(),
            lane: lane.to_string(),
            state: RunState::NotStarted,
            current_stage: None,
            completed_stages: completed.into_iter().collect(),
            stage_results: BTreeMap::new(),
            halt_reason: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn record(&mut self, outcome: &StageOutcome) {
        self.current_stage = Some(outcome.stage);
        self.stage_results.insert(outcome.stage, StageResult::from(outcome));
    }

    pub fn mark_completed(&mut self, stage: Stage) {
        if !self.completed_stages.contains(&stage.id()) {
            self.completed_stages.push(stage.id());
            self.completed_stages.sort_unstable();
        }
    }

    pub fn halt(&mut self, stage: Stage, reason: impl Into<String>) {
        self.state = RunState::Halted;
        self.current_stage = Some(stage);
        self.halt_reason = Some(reason.into());
        self.end_time = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    pub fn save(&self, change_dir: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&change_dir.join(paths::STATUS_FILE), data.as_bytes())
    }

    pub fn load(change_dir: &Path) -> Result<Option<Self>> {
        let path = change_dir.join(paths::STATUS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Append a one-line summary to `.openspec/run_history.jsonl`.
    pub fn append_history(&self, root: &Path) -> Result<()> {
        let entry = HistoryEntry {
            run_id: self.run_id,
            change_id: &self.change_id,
            lane: &self.lane,
            state: self.state,
            halted_at: (self.state == RunState::Halted)
                .then_some(self.current_stage)
                .flatten(),
            halt_reason: self.halt_reason.as_deref(),
            stages_executed: self.stage_results.len(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms(),
        };
        let line = serde_json::to_string(&entry)?;
        crate::io::append_line(&paths::run_history_path(root), &line)
    }
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    run_id: Uuid,
    change_id: &'a str,
    lane: &'a str,
    state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    halted_at: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    halt_reason: Option<&'a str>,
    stages_executed: usize,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(stage: Stage, success: bool, output: &str) -> StageOutcome {
        StageOutcome {
            stage,
            success,
            output: output.to_string(),
            duration_ms: 12,
            failure: None,
        }
    }

    #[test]
    fn status_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut run = WorkflowRun::new("2026-10-19-x", "standard", [0, 2]);
        run.state = RunState::Running;
        run.record(&outcome(Stage::Specification, true, "generated spec.md"));
        run.mark_completed(Stage::Specification);
        run.complete();
        run.save(dir.path()).unwrap();

        let loaded = WorkflowRun::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.completed_stages, vec![0, 2, 3]);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("status.json")).unwrap())
                .unwrap();
        assert_eq!(json["state"], "COMPLETED");
        assert_eq!(json["stage_results"]["specification"]["success"], true);
    }

    #[test]
    fn missing_status_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(WorkflowRun::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn output_excerpt_is_bounded() {
        let mut run = WorkflowRun::new("2026-10-19-x", "standard", []);
        run.record(&outcome(Stage::VersionBump, false, &"x".repeat(10_000)));
        let excerpt = &run.stage_results[&Stage::VersionBump].output_excerpt;
        assert!(excerpt.len() <= OUTPUT_EXCERPT_LIMIT + 3);
    }

    #[test]
    fn history_appends_one_line_per_run() {
        let dir = TempDir::new().unwrap();
        let mut first = WorkflowRun::new("2026-10-19-a", "docs", []);
        first.complete();
        first.append_history(dir.path()).unwrap();
        let mut second = WorkflowRun::new("2026-10-19-b", "standard", []);
        second.halt(Stage::Implementation, "quality gate failure");
        second.append_history(dir.path()).unwrap();

        let history = std::fs::read_to_string(dir.path().join(".openspec/run_history.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = history
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["state"], "COMPLETED");
        assert_eq!(lines[1]["halted_at"], "implementation");
        assert_eq!(lines[1]["halt_reason"], "quality gate failure");
    }
}
