use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not initialized: run 'openspec init'")]
    NotInitialized,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("change not found: {0}")]
    ChangeNotFound(String),

    #[error("change already exists: {0}")]
    ChangeExists(String),

    #[error("invalid change id '{0}': expected YYYY-MM-DD-<slug>")]
    InvalidChangeId(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("artifact '{artifact}' failed validation: {}", errors.join("; "))]
    ArtifactValidation {
        artifact: String,
        errors: Vec<String>,
    },

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("tool '{tool}' timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("archival failed for change '{change}': {reason}")]
    ArchivalIo { change: String, reason: String },

    #[error(
        "change '{change}' touches code files ({}); the docs lane cannot skip validation, re-run with --lane standard",
        files.join(", ")
    )]
    GuardViolation { change: String, files: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
