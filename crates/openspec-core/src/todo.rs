//! The `todo.md` checklist: the durable record of which stages are complete.
//!
//! Each stage owns one checkbox line of the form
//! `- [ ] **N. Label**: hint` (pending) or `- [x] **N. Label**: hint`
//! (complete). Everything else in the file is left untouched.

use crate::error::Result;
use crate::types::Stage;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

static CHECKBOX_RE: OnceLock<Regex> = OnceLock::new();

fn checkbox_re() -> &'static Regex {
    CHECKBOX_RE.get_or_init(|| {
        Regex::new(r"^(?P<indent>\s*)- \[(?P<mark>[ xX])\] \*\*(?P<id>\d+)\. ").unwrap()
    })
}

/// Render a fresh checklist with every stage pending.
pub fn render(change_id: &str, title: &str) -> String {
    let mut out = format!("# {title}\n\nChange: `{change_id}`\n\n## Workflow\n\n");
    for stage in Stage::all() {
        out.push_str(&format!(
            "- [ ] **{}. {}**: {}\n",
            stage.id(),
            stage.label(),
            stage.hint()
        ));
    }
    out
}

/// Stage ids whose checkbox is ticked.
pub fn completed_stages(content: &str) -> BTreeSet<u8> {
    content
        .lines()
        .filter_map(|line| checkbox_re().captures(line))
        .filter(|caps| !caps["mark"].trim().is_empty())
        .filter_map(|caps| caps["id"].parse::<u8>().ok())
        .collect()
}

/// Tick the checkbox for `stage`. Returns the new content, or `None` when the
/// file has no line for that stage. Already-ticked lines are left as they are,
/// so applying this twice equals applying it once.
pub fn mark_complete(content: &str, stage: Stage) -> Option<String> {
    let mut found = false;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        match checkbox_re().captures(line) {
            Some(caps) if caps["id"].parse::<u8>().ok() == Some(stage.id()) => {
                found = true;
                if caps["mark"].trim().is_empty() {
                    let indent = &caps["indent"];
                    let rest = &line[caps.get(0).map_or(0, |m| m.end())..];
                    out.push_str(&format!("{indent}- [x] **{}. {rest}", stage.id()));
                } else {
                    out.push_str(line);
                }
            }
            _ => out.push_str(line),
        }
    }
    found.then_some(out)
}

// ---------------------------------------------------------------------------
// TodoList (file-backed)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TodoList {
    content: String,
}

impl TodoList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self { content })
    }

    /// Load the checklist, treating a missing file as "nothing complete".
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                content: String::new(),
            });
        }
        Self::load(path)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn completed(&self) -> BTreeSet<u8> {
        completed_stages(&self.content)
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed().contains(&stage.id())
    }

    /// Tick `stage` and persist via temp file + rename. A checklist missing the
    /// stage's line gets the line appended so progress is never lost.
    pub fn mark_complete(&mut self, path: &Path, stage: Stage) -> Result<()> {
        let updated = match mark_complete(&self.content, stage) {
            Some(updated) => updated,
            None => {
                let mut updated = self.content.clone();
                if !updated.is_empty() && !updated.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push_str(&format!(
                    "- [x] **{}. {}**: {}\n",
                    stage.id(),
                    stage.label(),
                    stage.hint()
                ));
                updated
            }
        };
        if updated != self.content {
            crate::io::atomic_write(path, updated.as_bytes())?;
            self.content = updated;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_checklist_has_every_stage_pending() {
        let content = render("2026-10-19-add-auth", "Add auth");
        assert!(completed_stages(&content).is_empty());
        assert!(content.contains("- [ ] **0. Create Todo**"));
        assert!(content.contains("- [ ] **11. Archive**"));
        assert_eq!(content.matches("- [ ] **").count(), 13);
    }

    #[test]
    fn parses_ticked_lines_only() {
        let content = "\
# T
- [x] **0. Create Todo**: done
- [ ] **1. Version Bump**: pending
  - [X] **2. Proposal**: nested and upper-case
- [x] not a stage line
* [x] **3. Specification**: wrong bullet
";
        assert_eq!(completed_stages(content), BTreeSet::from([0, 2]));
    }

    #[test]
    fn mark_complete_is_idempotent() {
        let content = render("2026-10-19-x", "X");
        let once = mark_complete(&content, Stage::TaskBreakdown).unwrap();
        let twice = mark_complete(&once, Stage::TaskBreakdown).unwrap();
        assert_eq!(once, twice);
        assert_eq!(completed_stages(&once), BTreeSet::from([4]));
        assert!(once.contains("- [x] **4. Task Breakdown**: break the spec into tasks.md"));
    }

    #[test]
    fn mark_complete_preserves_other_text() {
        let content = "intro\n- [ ] **5. Test Definition**: t\n\nnotes without newline";
        let updated = mark_complete(content, Stage::TestDefinition).unwrap();
        assert_eq!(
            updated,
            "intro\n- [x] **5. Test Definition**: t\n\nnotes without newline"
        );
    }

    #[test]
    fn mark_complete_does_not_confuse_prefix_ids() {
        let content = "- [ ] **1. Version Bump**\n- [ ] **12. Pull Request**\n";
        let updated = mark_complete(content, Stage::VersionBump).unwrap();
        assert_eq!(completed_stages(&updated), BTreeSet::from([1]));
    }

    #[test]
    fn mark_complete_missing_line_returns_none() {
        assert!(mark_complete("# empty\n", Stage::Archive).is_none());
    }

    #[test]
    fn todo_list_persists_marks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("todo.md");
        std::fs::write(&path, render("2026-10-19-x", "X")).unwrap();

        let mut todo = TodoList::load(&path).unwrap();
        todo.mark_complete(&path, Stage::Todo).unwrap();
        todo.mark_complete(&path, Stage::Proposal).unwrap();

        let reloaded = TodoList::load(&path).unwrap();
        assert_eq!(reloaded.completed(), BTreeSet::from([0, 2]));
        assert!(reloaded.is_complete(Stage::Proposal));
        assert!(!reloaded.is_complete(Stage::Specification));
    }

    #[test]
    fn todo_list_appends_missing_stage_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("todo.md");
        std::fs::write(&path, "# hand-written").unwrap();
        let mut todo = TodoList::load(&path).unwrap();
        todo.mark_complete(&path, Stage::Review).unwrap();
        let reloaded = TodoList::load(&path).unwrap();
        assert_eq!(reloaded.completed(), BTreeSet::from([8]));
        assert!(reloaded.content().starts_with("# hand-written\n"));
    }
}
