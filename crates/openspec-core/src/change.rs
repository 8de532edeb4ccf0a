use crate::error::{Result, WorkflowError};
use crate::paths;
use crate::types::ArtifactKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ChangeManifest
// ---------------------------------------------------------------------------

/// Persisted description of a change (`change.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeManifest {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub affected_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Active,
    Archived,
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// A change plus where its working directory currently lives.
#[derive(Debug, Clone)]
pub struct Change {
    pub manifest: ChangeManifest,
    pub root: PathBuf,
    pub location: Location,
}

impl Change {
    /// Scaffold a new change: `YYYY-MM-DD-<slug>` directory with manifest and
    /// todo checklist.
    pub fn create(
        root: &Path,
        date: NaiveDate,
        slug: &str,
        title: impl Into<String>,
        description: Option<String>,
        affected_files: Vec<String>,
    ) -> Result<Self> {
        paths::validate_slug(slug)?;
        let id = format!("{}-{slug}", date.format("%Y-%m-%d"));
        paths::validate_change_id(&id)?;

        if paths::change_dir(root, &id).exists() || paths::archived_change_dir(root, &id).exists()
        {
            return Err(WorkflowError::ChangeExists(id));
        }

        let change = Self {
            manifest: ChangeManifest {
                id,
                title: title.into(),
                description,
                affected_files,
                created_at: Utc::now(),
            },
            root: root.to_path_buf(),
            location: Location::Active,
        };
        change.save()?;
        let todo = crate::todo::render(&change.manifest.id, &change.manifest.title);
        crate::io::write_if_missing(&change.todo_path(), todo.as_bytes())?;
        tracing::info!(change = %change.manifest.id, "created change");
        Ok(change)
    }

    /// Find a change in the active area first, then the archive.
    pub fn locate(root: &Path, id: &str) -> Result<Self> {
        paths::validate_change_id(id)?;
        for (dir, location) in [
            (paths::change_dir(root, id), Location::Active),
            (paths::archived_change_dir(root, id), Location::Archived),
        ] {
            let manifest_path = dir.join(paths::MANIFEST_FILE);
            if manifest_path.exists() {
                let data = std::fs::read_to_string(&manifest_path)?;
                let manifest: ChangeManifest = serde_yaml::from_str(&data)?;
                return Ok(Self {
                    manifest,
                    root: root.to_path_buf(),
                    location,
                });
            }
        }
        Err(WorkflowError::ChangeNotFound(id.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(&self.manifest)?;
        crate::io::atomic_write(&self.dir().join(paths::MANIFEST_FILE), data.as_bytes())
    }

    /// Active changes then archived ones, each sorted by id (and so by date).
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let mut changes = Vec::new();
        for dir in [paths::changes_dir(root), paths::archive_dir(root)] {
            if !dir.exists() {
                continue;
            }
            let mut ids: Vec<String> = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    ids.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            ids.sort();
            for id in ids {
                match Self::locate(root, &id) {
                    Ok(c) => changes.push(c),
                    Err(WorkflowError::ChangeNotFound(_) | WorkflowError::InvalidChangeId(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(changes)
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn is_archived(&self) -> bool {
        self.location == Location::Archived
    }

    pub fn dir(&self) -> PathBuf {
        match self.location {
            Location::Active => paths::change_dir(&self.root, &self.manifest.id),
            Location::Archived => paths::archived_change_dir(&self.root, &self.manifest.id),
        }
    }

    pub fn todo_path(&self) -> PathBuf {
        self.dir().join(paths::TODO_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir().join(paths::STATUS_FILE)
    }

    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir().join(kind.filename())
    }

    pub fn read_artifact(&self, kind: ArtifactKind) -> Result<Option<String>> {
        let path = self.artifact_path(kind);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn create_scaffolds_manifest_and_todo() {
        let dir = TempDir::new().unwrap();
        let change = Change::create(
            dir.path(),
            date(),
            "update-readme",
            "Update README",
            None,
            vec!["README.md".to_string()],
        )
        .unwrap();
        assert_eq!(change.id(), "2026-10-19-update-readme");
        assert!(change.dir().join("change.yaml").exists());
        let todo = std::fs::read_to_string(change.todo_path()).unwrap();
        assert!(todo.contains("- [ ] **0. Create Todo**"));
    }

    #[test]
    fn create_rejects_duplicates_and_bad_slugs() {
        let dir = TempDir::new().unwrap();
        Change::create(dir.path(), date(), "x", "X", None, vec![]).unwrap();
        assert!(matches!(
            Change::create(dir.path(), date(), "x", "X", None, vec![]),
            Err(WorkflowError::ChangeExists(_))
        ));
        assert!(matches!(
            Change::create(dir.path(), date(), "Bad Slug", "X", None, vec![]),
            Err(WorkflowError::InvalidSlug(_))
        ));
    }

    #[test]
    fn locate_finds_archived_changes() {
        let dir = TempDir::new().unwrap();
        let change = Change::create(dir.path(), date(), "x", "X", None, vec![]).unwrap();
        let archived = paths::archived_change_dir(dir.path(), change.id());
        std::fs::create_dir_all(archived.parent().unwrap()).unwrap();
        std::fs::rename(change.dir(), &archived).unwrap();

        let found = Change::locate(dir.path(), "2026-10-19-x").unwrap();
        assert!(found.is_archived());
        assert_eq!(found.dir(), archived);
    }

    #[test]
    fn locate_missing_change() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Change::locate(dir.path(), "2026-10-19-nope"),
            Err(WorkflowError::ChangeNotFound(_))
        ));
    }

    #[test]
    fn list_orders_active_before_archived() {
        let dir = TempDir::new().unwrap();
        Change::create(dir.path(), date(), "b", "B", None, vec![]).unwrap();
        Change::create(dir.path(), date(), "a", "A", None, vec![]).unwrap();
        let ids: Vec<String> = Change::list(dir.path())
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["2026-10-19-a", "2026-10-19-b"]);
    }

    #[test]
    fn read_artifact_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let change = Change::create(dir.path(), date(), "x", "X", None, vec![]).unwrap();
        assert!(change.read_artifact(ArtifactKind::Spec).unwrap().is_none());
    }
}
