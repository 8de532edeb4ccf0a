use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the 13 ordered steps a change walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Todo,
    VersionBump,
    Proposal,
    Specification,
    TaskBreakdown,
    TestDefinition,
    ScriptGeneration,
    Implementation,
    Review,
    Documentation,
    CrossValidation,
    Archive,
    PullRequest,
}

pub const STAGE_COUNT: u8 = 13;
pub const MAX_STAGE_ID: u8 = STAGE_COUNT - 1;

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Todo,
            Stage::VersionBump,
            Stage::Proposal,
            Stage::Specification,
            Stage::TaskBreakdown,
            Stage::TestDefinition,
            Stage::ScriptGeneration,
            Stage::Implementation,
            Stage::Review,
            Stage::Documentation,
            Stage::CrossValidation,
            Stage::Archive,
            Stage::PullRequest,
        ]
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Stage> {
        Self::all().get(id as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Todo => "todo",
            Stage::VersionBump => "version_bump",
            Stage::Proposal => "proposal",
            Stage::Specification => "specification",
            Stage::TaskBreakdown => "task_breakdown",
            Stage::TestDefinition => "test_definition",
            Stage::ScriptGeneration => "script_generation",
            Stage::Implementation => "implementation",
            Stage::Review => "review",
            Stage::Documentation => "documentation",
            Stage::CrossValidation => "cross_validation",
            Stage::Archive => "archive",
            Stage::PullRequest => "pull_request",
        }
    }

    /// Fixed label used on the stage's todo checkbox line.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Todo => "Create Todo",
            Stage::VersionBump => "Version Bump",
            Stage::Proposal => "Proposal",
            Stage::Specification => "Specification",
            Stage::TaskBreakdown => "Task Breakdown",
            Stage::TestDefinition => "Test Definition",
            Stage::ScriptGeneration => "Script Generation",
            Stage::Implementation => "Implementation",
            Stage::Review => "Review",
            Stage::Documentation => "Documentation",
            Stage::CrossValidation => "Cross-Validation",
            Stage::Archive => "Archive",
            Stage::PullRequest => "Pull Request",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Stage::Todo => "create this checklist",
            Stage::VersionBump => "bump the release version",
            Stage::Proposal => "write proposal.md",
            Stage::Specification => "derive spec.md from the proposal",
            Stage::TaskBreakdown => "break the spec into tasks.md",
            Stage::TestDefinition => "define test_plan.md",
            Stage::ScriptGeneration => "generate scripts and tooling",
            Stage::Implementation => "implement and record implementation_notes.md",
            Stage::Review => "summarize the review in review_summary.md",
            Stage::Documentation => "record doc_changes.md",
            Stage::CrossValidation => "cross-validate all artifacts",
            Stage::Archive => "move the change to the archive",
            Stage::PullRequest => "open the pull request",
        }
    }

    pub fn kind(self) -> StageKind {
        match self {
            Stage::Todo => StageKind::ScaffoldTodo,
            Stage::VersionBump | Stage::ScriptGeneration | Stage::PullRequest => {
                StageKind::RunScript
            }
            Stage::Proposal => StageKind::PrepareArtifact {
                artifact: ArtifactKind::Proposal,
                sources: &[],
            },
            Stage::Specification => StageKind::PrepareArtifact {
                artifact: ArtifactKind::Spec,
                sources: &[ArtifactKind::Proposal],
            },
            Stage::TaskBreakdown => StageKind::PrepareArtifact {
                artifact: ArtifactKind::Tasks,
                sources: &[ArtifactKind::Spec],
            },
            Stage::TestDefinition => StageKind::PrepareArtifact {
                artifact: ArtifactKind::TestPlan,
                sources: &[ArtifactKind::Spec, ArtifactKind::Tasks],
            },
            Stage::Implementation => StageKind::PrepareArtifact {
                artifact: ArtifactKind::ImplementationNotes,
                sources: &[ArtifactKind::Tasks],
            },
            Stage::Review => StageKind::PrepareArtifact {
                artifact: ArtifactKind::ReviewSummary,
                sources: &[ArtifactKind::ImplementationNotes],
            },
            Stage::Documentation => StageKind::PrepareArtifact {
                artifact: ArtifactKind::DocChanges,
                sources: &[ArtifactKind::Proposal, ArtifactKind::Spec],
            },
            Stage::CrossValidation => StageKind::CrossValidate,
            Stage::Archive => StageKind::ArchiveChange,
        }
    }

    /// The artifact this stage leaves behind in the change directory, if any.
    pub fn artifact(self) -> Option<ArtifactKind> {
        match self.kind() {
            StageKind::PrepareArtifact { artifact, .. } => Some(artifact),
            StageKind::CrossValidate => Some(ArtifactKind::CrossValidationReport),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.id(), self.label())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u8>() {
            return Stage::from_id(id)
                .ok_or_else(|| crate::error::WorkflowError::UnknownStage(s.to_string()));
        }
        Stage::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| crate::error::WorkflowError::UnknownStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// The capability a stage exercises when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    ScaffoldTodo,
    PrepareArtifact {
        artifact: ArtifactKind,
        sources: &'static [ArtifactKind],
    },
    CrossValidate,
    RunScript,
    ArchiveChange,
}

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Proposal,
    Spec,
    Tasks,
    TestPlan,
    ImplementationNotes,
    ReviewSummary,
    DocChanges,
    CrossValidationReport,
}

impl ArtifactKind {
    pub fn all() -> &'static [ArtifactKind] {
        &[
            ArtifactKind::Proposal,
            ArtifactKind::Spec,
            ArtifactKind::Tasks,
            ArtifactKind::TestPlan,
            ArtifactKind::ImplementationNotes,
            ArtifactKind::ReviewSummary,
            ArtifactKind::DocChanges,
            ArtifactKind::CrossValidationReport,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Proposal => "proposal",
            ArtifactKind::Spec => "spec",
            ArtifactKind::Tasks => "tasks",
            ArtifactKind::TestPlan => "test_plan",
            ArtifactKind::ImplementationNotes => "implementation_notes",
            ArtifactKind::ReviewSummary => "review_summary",
            ArtifactKind::DocChanges => "doc_changes",
            ArtifactKind::CrossValidationReport => "cross_validation_report",
        }
    }

    pub fn filename(self) -> &'static str {
        match self {
            ArtifactKind::Proposal => "proposal.md",
            ArtifactKind::Spec => "spec.md",
            ArtifactKind::Tasks => "tasks.md",
            ArtifactKind::TestPlan => "test_plan.md",
            ArtifactKind::ImplementationNotes => "implementation_notes.md",
            ArtifactKind::ReviewSummary => "review_summary.md",
            ArtifactKind::DocChanges => "doc_changes.md",
            ArtifactKind::CrossValidationReport => "cross_validation_report.md",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
