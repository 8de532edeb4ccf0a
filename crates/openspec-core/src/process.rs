//! Shell command execution with a timeout, shared by quality-gate tools and
//! script stages.

use crate::error::{Result, WorkflowError};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Cap on captured output kept in memory (tail is kept).
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// stdout and stderr joined, trimmed.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// First whitespace-separated word of a command line, used to check the
/// program is installed before spawning a shell for it.
pub fn program_of(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|word| !word.contains('='))
}

/// Run `command` through `sh -c` in `cwd`.
///
/// - The program (first word) missing from `PATH` → `ToolUnavailable`.
/// - Spawn failure → `ToolUnavailable`.
/// - Timeout (`None` waits forever) → process killed, `ToolTimeout`.
/// - Non-zero exit is *not* an error; callers inspect `success`.
pub fn run_shell(
    name: &str,
    command: &str,
    cwd: &Path,
    envs: &[(&str, String)],
    timeout: Option<Duration>,
) -> Result<ProcessOutput> {
    let program = program_of(command)
        .ok_or_else(|| WorkflowError::ToolUnavailable(format!("{name}: empty command")))?;
    if !program.contains('/') && which::which(program).is_err() {
        return Err(WorkflowError::ToolUnavailable(format!(
            "{name}: '{program}' not found on PATH"
        )));
    }

    tracing::debug!(tool = name, command, cwd = %cwd.display(), "spawning");
    let start = Instant::now();
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let mut child = cmd
        .spawn()
        .map_err(|e| WorkflowError::ToolUnavailable(format!("{name}: failed to spawn: {e}")))?;

    // Dedicated reader threads so a chatty process cannot fill a pipe and
    // deadlock against our wait.
    let stdout_thread = spawn_reader(child.stdout.take());
    let stderr_thread = spawn_reader(child.stderr.take());

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => match wait_with_timeout(&mut child, limit)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(tool = name, seconds = limit.as_secs(), "timed out");
                return Err(WorkflowError::ToolTimeout {
                    tool: name.to_string(),
                    seconds: limit.as_secs(),
                });
            }
        },
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(ProcessOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout: crate::io::truncate_tail(&stdout, MAX_CAPTURED_OUTPUT),
        stderr: crate::io::truncate_tail(&stderr, MAX_CAPTURED_OUTPUT),
        duration: start.elapsed(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    handle: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = handle {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Poll the child until it exits or `limit` elapses. `Ok(None)` on timeout.
fn wait_with_timeout(
    child: &mut Child,
    limit: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + limit;
    let mut interval = Duration::from_millis(5);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(interval.min(deadline - now));
        interval = (interval * 2).min(Duration::from_millis(100));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
