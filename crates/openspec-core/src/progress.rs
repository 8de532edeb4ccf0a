//! Optional progress callbacks for the orchestrator. Every method has a no-op
//! default, so a reporter only implements the events it cares about.

use crate::lane::Lane;
use crate::orchestrator::RunReport;
use crate::quality::QualityGateResult;
use crate::stage::StageOutcome;
use crate::types::Stage;
use std::collections::BTreeSet;

pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, _change_id: &str, _lane: &Lane, _completed: &BTreeSet<u8>) {}

    fn stage_skipped(&self, _change_id: &str, _stage: Stage) {}

    fn stage_started(&self, _change_id: &str, _stage: Stage) {}

    fn stage_finished(&self, _change_id: &str, _outcome: &StageOutcome) {}

    fn gate_evaluated(&self, _change_id: &str, _result: &QualityGateResult) {}

    fn run_finished(&self, _report: &RunReport) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}
