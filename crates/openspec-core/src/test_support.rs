//! Canned collaborators shared by the unit tests.

use crate::error::{Result, WorkflowError};
use crate::quality::{QualityTool, ToolInvocation, ToolRunner};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Unavailable,
    Timeout,
}

/// Returns a fixed reply per tool and records which tools were invoked.
/// Tools without a reply behave as if not installed.
#[derive(Default)]
pub struct ScriptedToolRunner {
    replies: BTreeMap<QualityTool, Reply>,
    calls: Arc<Mutex<Vec<QualityTool>>>,
}

impl ScriptedToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, tool: QualityTool, reply: Reply) -> Self {
        self.replies.insert(tool, reply);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<QualityTool>>> {
        Arc::clone(&self.calls)
    }
}

impl ToolRunner for ScriptedToolRunner {
    fn run(&self, invocation: &ToolInvocation<'_>) -> Result<String> {
        self.calls.lock().unwrap().push(invocation.tool);
        match self.replies.get(&invocation.tool) {
            Some(Reply::Output(out)) => Ok(out.clone()),
            Some(Reply::Timeout) => Err(WorkflowError::ToolTimeout {
                tool: invocation.tool.to_string(),
                seconds: invocation.timeout.as_secs(),
            }),
            Some(Reply::Unavailable) | None => Err(WorkflowError::ToolUnavailable(format!(
                "{}: not installed",
                invocation.tool
            ))),
        }
    }
}

pub const PYTEST_PASSING: &str = "\
TOTAL       200     20    90%
========== 42 passed in 3.21s ==========
";

/// Every tool reports a clean result.
pub fn passing_runner() -> ScriptedToolRunner {
    ScriptedToolRunner::new()
        .reply(QualityTool::Lint, Reply::Output("[]".into()))
        .reply(
            QualityTool::TypeCheck,
            Reply::Output("Success: no issues found in 12 source files".into()),
        )
        .reply(QualityTool::Test, Reply::Output(PYTEST_PASSING.into()))
        .reply(
            QualityTool::Security,
            Reply::Output(r#"{"errors": [], "results": []}"#.into()),
        )
}
