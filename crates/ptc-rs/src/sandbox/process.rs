//! Child process execution with a wall-clock bound.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, trace};

use crate::error::ExecError;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Kills a child's process group when dropped.
///
/// The child leads its own group, so background jobs and subshells it
/// started are members too and die with it.
struct GroupKill(Option<u32>);

impl GroupKill {
    fn of(child: &Child) -> Self {
        Self(child.id())
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory we own. A
    // negative pid addresses the whole group; ESRCH once it is gone is fine.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    trace!("killpg {pgid} -> {rc}");
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Run `cmd` to completion, giving up after `timeout`.
///
/// The child runs in a fresh process group. When the run ends, whether it
/// exited, timed out or the returned future was dropped by a cancelled
/// turn, every process left in that group is killed, so nothing it spawned
/// keeps touching the workspace afterwards.
pub async fn run_process(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> Result<ProcessOutput, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let _group = GroupKill::of(&child);
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            debug!(
                "{program} exited with {} ({} bytes stdout, {} bytes stderr)",
                output.status,
                output.stdout.len(),
                output.stderr.len()
            );
            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                success: output.status.success(),
            })
        }
        Ok(Err(source)) => Err(ExecError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ExecError::Timeout(timeout)),
    }
}

/// Truncate to at most `max` bytes on a char boundary, noting the cut.
pub fn truncate_output(s: String, max: usize) -> String {
    if s.len() > max {
        let cut = s.floor_char_boundary(max);
        format!(
            "{}...\n[truncated: {} bytes total]",
            s.get(..cut).unwrap_or_default(),
            s.len()
        )
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let out = run_process(sh("echo out; echo err >&2; exit 3"), "sh", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = run_process(sh("sleep 5"), "sh", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
        assert_eq!(err.to_string(), "timed out after 0.2 seconds");
    }

    #[tokio::test]
    async fn background_jobs_die_with_a_timed_out_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = sh("(sleep 1; echo late > late.txt) & wait");
        cmd.current_dir(dir.path());
        let err = run_process(cmd, "sh", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn dropping_the_run_kills_background_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = sh("(sleep 1; echo late > late.txt) & wait");
        cmd.current_dir(dir.path());
        let run = run_process(cmd, "sh", Duration::from_secs(30));
        // Abandon the run the way a cancelled turn does.
        let _ = tokio::time::timeout(Duration::from_millis(300), run).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_process(
            Command::new("definitely-not-a-real-binary-ptc"),
            "definitely-not-a-real-binary-ptc",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_output("short".into(), 10), "short");
        let s = "ééééé".to_string(); // 10 bytes
        let out = truncate_output(s, 3);
        assert!(out.starts_with("é..."));
        assert!(out.ends_with("[truncated: 10 bytes total]"));
    }
}
