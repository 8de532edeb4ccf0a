use crate::error::{Result, WorkflowError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const OPENSPEC_STATE_DIR: &str = ".openspec";
pub const LOCKS_DIR: &str = ".openspec/locks";
pub const CONFIG_FILE: &str = ".openspec/config.yaml";
pub const RUN_HISTORY_FILE: &str = ".openspec/run_history.jsonl";

pub const CHANGES_DIR: &str = "openspec/changes";
pub const ARCHIVE_DIR: &str = "openspec/archive";

pub const MANIFEST_FILE: &str = "change.yaml";
pub const TODO_FILE: &str = "todo.md";
pub const STATUS_FILE: &str = "status.json";
pub const QUALITY_METRICS_FILE: &str = "quality_metrics.json";
pub const QUALITY_REPORTS_DIR: &str = "quality_reports";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(OPENSPEC_STATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn run_history_path(root: &Path) -> PathBuf {
    root.join(RUN_HISTORY_FILE)
}

pub fn lock_path(root: &Path, change_id: &str) -> PathBuf {
    root.join(LOCKS_DIR).join(format!("{change_id}.lock"))
}

pub fn changes_dir(root: &Path) -> PathBuf {
    root.join(CHANGES_DIR)
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

pub fn change_dir(root: &Path, change_id: &str) -> PathBuf {
    changes_dir(root).join(change_id)
}

pub fn archived_change_dir(root: &Path, change_id: &str) -> PathBuf {
    archive_dir(root).join(change_id)
}

// ---------------------------------------------------------------------------
// Slug / change-id validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();
static CHANGE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

fn change_id_re() -> &'static Regex {
    CHANGE_ID_RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-(.+)$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(WorkflowError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// A change id is `YYYY-MM-DD-<slug>` with a real calendar date.
pub fn validate_change_id(id: &str) -> Result<()> {
    let invalid = || WorkflowError::InvalidChangeId(id.to_string());
    let caps = change_id_re().captures(id).ok_or_else(invalid)?;
    chrono::NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").map_err(|_| invalid())?;
    validate_slug(&caps[2]).map_err(|_| invalid())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
