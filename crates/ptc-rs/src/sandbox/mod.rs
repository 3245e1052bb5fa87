//! Sandboxed execution of parsed blocks.
//!
//! Everything runs with the caller's privileges; the only containment is
//! the workspace: processes start in it and file writes cannot leave it.
//! Failures inside execution (timeouts, non-zero exits, escaped paths,
//! tool errors) never propagate as errors. They come back as an
//! [`ExecutionResult`] with [`ExecutionStatus::Failed`] so the model can
//! react to them.

mod process;
pub mod workspace;

pub use process::{ProcessOutput, run_process, truncate_output};
pub use workspace::resolve_in_workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::error::ExecError;
use crate::parser::{BlockAction, ExecutableBlock};
use crate::skills::bindings::BRIDGE_URL_ENV;

/// Default wall-clock bound for one block.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on captured output per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 30_000;

/// Outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What happened when a block ran. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub block: ExecutableBlock,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub status: ExecutionStatus,
    pub duration: Duration,
    /// Why the execution failed when no process output explains it
    /// (timeout, path escape, spawn error, tool error).
    pub failure: Option<String>,
}

impl ExecutionResult {
    fn failed(block: &ExecutableBlock, err: &ExecError, duration: Duration) -> Self {
        Self {
            block: block.clone(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            status: ExecutionStatus::Failed,
            duration,
            failure: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Combined output shown to the user and the model.
    pub fn output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.is_empty() {
                out.push_str("[stderr]\n");
            }
            out.push_str(&self.stderr);
        }
        if let Some(failure) = &self.failure {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("Error: ");
            out.push_str(failure);
        }
        out
    }

    /// Content of the tool-result message fed back to the model.
    pub fn to_message(&self) -> String {
        let exit = match self.exit_code {
            Some(code) => format!(" (exit {code})"),
            None => String::new(),
        };
        let output = self.output();
        let body = if output.is_empty() { "(no output)" } else { output.as_str() };
        format!(
            "[execution result: {} {}{exit}]\n{body}",
            self.block.kind(),
            self.status
        )
    }
}

/// Interpreter and limit settings for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell run as `<shell> -c <command>`.
    pub shell: String,
    /// Python interpreter run as `<python> -c <code>`.
    pub python: String,
    pub timeout: Duration,
    /// Cap for each captured stream.
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            python: "python3".to_string(),
            timeout: DEFAULT_EXEC_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }
}

/// Runs executable blocks against one workspace.
#[derive(Debug, Clone)]
pub struct Executor {
    workspace: PathBuf,
    config: ExecutorConfig,
    bridge: Option<Arc<Bridge>>,
    bridge_url: Option<String>,
    skills_dir: Option<PathBuf>,
}

impl Executor {
    pub fn new(workspace: impl Into<PathBuf>, config: ExecutorConfig) -> Self {
        Self {
            workspace: workspace.into(),
            config,
            bridge: None,
            bridge_url: None,
            skills_dir: None,
        }
    }

    /// Dispatch XML tool invocations through `bridge`.
    pub fn with_bridge(mut self, bridge: Arc<Bridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// URL exported to child processes as `PTC_BRIDGE_URL`.
    pub fn with_bridge_url(mut self, url: impl Into<String>) -> Self {
        self.bridge_url = Some(url.into());
        self
    }

    /// Directory holding the generated `_lib` bindings; put on the
    /// interpreter's import path for code blocks.
    pub fn with_skills_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skills_dir = Some(dir.into());
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn bridge(&self) -> Option<&Arc<Bridge>> {
        self.bridge.as_ref()
    }

    /// Run one block. Always produces a result.
    pub async fn execute(&self, block: &ExecutableBlock) -> ExecutionResult {
        log_execution(block);
        let start = Instant::now();
        let outcome = match &block.action {
            BlockAction::Shell { command } => self.run_shell(command).await,
            BlockAction::Code { language, source } => self.run_code(language, source).await,
            BlockAction::FileCreate { path, contents } => self.create_file(path, contents).await,
            BlockAction::ToolCall { name, arguments } => {
                self.call_tool(name, arguments.clone()).await
            }
        };
        let duration = start.elapsed();

        let result = match outcome {
            Ok(out) => ExecutionResult {
                block: block.clone(),
                stdout: truncate_output(out.stdout, self.config.max_output_bytes),
                stderr: truncate_output(out.stderr, self.config.max_output_bytes),
                exit_code: out.exit_code,
                status: if out.success {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                },
                duration,
                failure: None,
            },
            Err(err) => {
                warn!("[exec] {} failed ({}): {err}", block.kind(), err.reason());
                ExecutionResult::failed(block, &err, duration)
            }
        };
        debug!(
            "[exec] {} {} in {:.0}ms",
            block.kind(),
            result.status,
            duration.as_secs_f64() * 1000.0
        );
        result
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.workspace);
        if let Some(url) = &self.bridge_url {
            cmd.env(BRIDGE_URL_ENV, url);
        }
        cmd
    }

    async fn run_shell(&self, command: &str) -> Result<ProcessOutput, ExecError> {
        let mut cmd = self.command(&self.config.shell);
        cmd.arg("-c").arg(command);
        run_process(cmd, &self.config.shell, self.config.timeout).await
    }

    async fn run_code(&self, language: &str, source: &str) -> Result<ProcessOutput, ExecError> {
        if language != "python" {
            return Err(ExecError::Spawn {
                program: language.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("no interpreter for '{language}'"),
                ),
            });
        }
        let program = format!("{}{source}", self.python_prelude());
        let mut cmd = self.command(&self.config.python);
        cmd.arg("-c").arg(program);
        run_process(cmd, &self.config.python, self.config.timeout).await
    }

    /// Lines prepended to every code block so skills are callable by name.
    fn python_prelude(&self) -> String {
        match &self.skills_dir {
            Some(dir) if dir.join("_lib").is_dir() => {
                let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
                let quoted = serde_json::to_string(&dir.display().to_string())
                    .unwrap_or_else(|_| "\".\"".to_string());
                format!("import sys\nsys.path.insert(0, {quoted})\nfrom _lib.tools import *\n")
            }
            _ => String::new(),
        }
    }

    async fn create_file(&self, path: &str, contents: &str) -> Result<ProcessOutput, ExecError> {
        let target = resolve_in_workspace(&self.workspace, path)?;
        let io_err = |source| ExecError::Io {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, contents).await.map_err(io_err)?;
        Ok(ProcessOutput {
            stdout: workspace::display_relative(&self.workspace, &target),
            success: true,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ProcessOutput, ExecError> {
        let bridge = self.bridge.as_ref().ok_or(ExecError::NoBridge)?;
        Ok(match bridge.call(name, arguments).await {
            Ok(value) => ProcessOutput {
                stdout: match value {
                    serde_json::Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other).unwrap_or_default(),
                },
                success: true,
                ..Default::default()
            },
            Err(e) => ProcessOutput {
                stderr: e.to_string(),
                success: false,
                ..Default::default()
            },
        })
    }
}

/// Log an execution at INFO with a short preview of what runs.
fn log_execution(block: &ExecutableBlock) {
    let code = block.display_code();
    let preview: String = code.chars().take(120).collect();
    info!(
        "[exec] {}: {}{}",
        block.kind(),
        preview.replace('\n', "\\n"),
        if code.chars().count() > 120 { "..." } else { "" }
    );
}
