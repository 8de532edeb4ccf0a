use anyhow::Context;
use openspec_core::paths;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive per-change run lock (`.openspec/locks/<change-id>.lock`),
/// released when dropped. The file holds the owning PID; a lock whose owner
/// is gone is taken over.
#[derive(Debug)]
pub struct ChangeLock {
    path: PathBuf,
}

impl ChangeLock {
    pub fn acquire(root: &Path, change_id: &str) -> anyhow::Result<Self> {
        paths::validate_change_id(change_id)?;
        let path = paths::lock_path(root, change_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if try_create(&path)? {
            return Ok(Self { path });
        }
        match read_owner(&path) {
            Some(pid) if !is_pid_alive(pid) => {
                tracing::warn!(change = change_id, pid, "removing stale lock left by a dead run");
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("failed to remove {}", path.display()))
                    }
                }
                // Another process may win the race for the freed lock.
                if try_create(&path)? {
                    return Ok(Self { path });
                }
            }
            _ => {}
        }
        anyhow::bail!(
            "change '{change_id}' is already being run (remove {} if no run is active)",
            path.display()
        )
    }
}

impl Drop for ChangeLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `Ok(false)` when the lock file already exists.
fn try_create(path: &Path) -> anyhow::Result<bool> {
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to create lock {}", path.display())),
    }
}

/// PID recorded in the lock. `None` for an unreadable or half-written file,
/// which is treated as held.
fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// `kill(pid, 0)` probes for existence without signalling. `EPERM` means the
/// process exists under another user.
#[cfg(unix)]
fn is_pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// PID of a process that has already exited and been reaped.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn second_acquire_fails_until_released() {
        let dir = TempDir::new().unwrap();
        let id = "2026-10-19-sync-notes";
        let lock = ChangeLock::acquire(dir.path(), id).unwrap();
        let err = ChangeLock::acquire(dir.path(), id).unwrap_err();
        assert!(err.to_string().contains("already being run"));

        drop(lock);
        assert!(!paths::lock_path(dir.path(), id).exists());
        ChangeLock::acquire(dir.path(), id).unwrap();
    }

    #[test]
    fn lock_of_dead_run_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let id = "2026-10-19-sync-notes";
        let path = paths::lock_path(dir.path(), id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{}\n", dead_pid())).unwrap();

        let lock = ChangeLock::acquire(dir.path(), id).unwrap();
        let owner = std::fs::read_to_string(&path).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn lock_of_live_or_unknown_owner_is_respected() {
        let dir = TempDir::new().unwrap();
        let id = "2026-10-19-sync-notes";
        let path = paths::lock_path(dir.path(), id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        assert!(ChangeLock::acquire(dir.path(), id).is_err());

        std::fs::write(&path, "").unwrap();
        assert!(ChangeLock::acquire(dir.path(), id).is_err());
        assert!(path.exists());
    }

    #[test]
    fn pid_liveness() {
        assert!(is_pid_alive(std::process::id()));
        assert!(!is_pid_alive(dead_pid()));
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(u32::MAX));
    }

    #[test]
    fn rejects_ids_that_are_not_change_ids() {
        let dir = TempDir::new().unwrap();
        assert!(ChangeLock::acquire(dir.path(), "../escape").is_err());
    }
}
