//! Read-only git helpers exposed as local skills.
//!
//! | Skill | Purpose |
//! |-------|---------|
//! | `git_status` | Working tree status of the workspace |
//! | `git_log` | Recent commit history |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ptc_rs::skills::LocalFunction;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::process::Command;

/// Run git in `workdir` and return stdout, or stderr as the error.
async fn run_git(workdir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let code = output.status.code().unwrap_or(-1);
        Err(format!(
            "git exited with {code}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Arguments for `git_status`.
#[derive(Deserialize, JsonSchema)]
pub struct GitStatusArgs {
    /// Show short-format output.
    #[serde(default)]
    pub short: Option<bool>,
}

/// Arguments for `git_log`.
#[derive(Deserialize, JsonSchema)]
pub struct GitLogArgs {
    /// Number of commits to show (default 10).
    #[serde(default)]
    pub limit: Option<u32>,
}

pub fn git_status(workdir: impl Into<PathBuf>) -> LocalFunction {
    let workdir = Arc::new(workdir.into());
    LocalFunction::typed(
        "git_status",
        "Show the working tree status of the workspace repository.",
        move |args: GitStatusArgs| {
            let workdir = Arc::clone(&workdir);
            async move {
                let mut argv = vec!["status"];
                if args.short.unwrap_or(true) {
                    argv.push("--short");
                }
                run_git(&workdir, &argv).await
            }
        },
    )
}

pub fn git_log(workdir: impl Into<PathBuf>) -> LocalFunction {
    let workdir = Arc::new(workdir.into());
    LocalFunction::typed(
        "git_log",
        "Show recent commits in the workspace repository, one per line.",
        move |args: GitLogArgs| {
            let workdir = Arc::clone(&workdir);
            async move {
                let limit = format!("-{}", args.limit.unwrap_or(10).clamp(1, 200));
                run_git(&workdir, &["log", "--oneline", limit.as_str()]).await
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn status_outside_repo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = git_status(dir.path());
        // Either git is missing or the directory is not a repository.
        assert!(f.invoke(Map::new()).await.is_err());
    }

    #[test]
    fn log_schema_has_optional_limit() {
        let f = git_log(".");
        let schema = f.input_schema();
        assert!(schema["properties"]["limit"].is_object());
        assert!(
            schema
                .get("required")
                .and_then(|r| r.as_array())
                .is_none_or(|r| !r.contains(&json!("limit")))
        );
    }
}
