//! A remote tool server backed by shell command templates.
//!
//! Lets the CLI expose a "remote" tool set without a real tool-protocol
//! process: each tool is a command template whose `{param}` placeholders
//! are filled with shell-quoted arguments.
//!
//! ```json
//! {
//!   "server": "files",
//!   "tools": [
//!     {
//!       "name": "read_file",
//!       "description": "Read a file.",
//!       "input_schema": {"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]},
//!       "command": "cat {path}"
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ptc_rs::error::{ExecError, RemoteError};
use ptc_rs::sandbox::run_process;
use ptc_rs::skills::{RemoteFuture, RemoteToolSchema, RemoteToolServer};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
struct CommandToolsFile {
    #[serde(default = "default_server_name")]
    server: String,
    tools: Vec<CommandTool>,
}

fn default_server_name() -> String {
    "commands".into()
}

#[derive(Debug, Clone, Deserialize)]
struct CommandTool {
    #[serde(flatten)]
    schema: RemoteToolSchema,
    command: String,
}

/// Serves tools defined by command templates, run with `sh -c` in a
/// working directory.
#[derive(Debug)]
pub struct CommandToolServer {
    name: String,
    workdir: PathBuf,
    tools: Vec<CommandTool>,
    timeout: Duration,
}

impl CommandToolServer {
    /// Parse a tool definition document.
    pub fn from_json(json: &str, workdir: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let file: CommandToolsFile = serde_json::from_str(json)
            .map_err(|e| RemoteError::Protocol(format!("invalid command tools file: {e}")))?;
        Ok(Self {
            name: file.server,
            workdir: workdir.into(),
            tools: file.tools,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Read and parse a tool definition file.
    pub fn load(path: &Path, workdir: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RemoteError::Protocol(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&json, workdir)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, command: &str) -> Result<Value, RemoteError> {
        debug!("[{}] sh -c {command}", self.name);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.workdir);
        let output = run_process(cmd, "sh", self.timeout).await.map_err(|e| match e {
            ExecError::Timeout(_) => {
                RemoteError::Tool(format!("timed out after {}s", self.timeout.as_secs()))
            }
            other => RemoteError::Protocol(other.to_string()),
        })?;

        if output.success {
            Ok(Value::String(output.stdout))
        } else {
            let code = output.exit_code.unwrap_or(-1);
            Err(RemoteError::Tool(format!("exit {code}: {}", output.stderr.trim())))
        }
    }
}

impl RemoteToolServer for CommandToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_tools(&self) -> RemoteFuture<'_, Vec<RemoteToolSchema>> {
        let schemas = self.tools.iter().map(|t| t.schema.clone()).collect();
        Box::pin(async move { Ok(schemas) })
    }

    fn call_tool<'a>(&'a self, name: &'a str, args: Value) -> RemoteFuture<'a, Value> {
        Box::pin(async move {
            let tool = self
                .tools
                .iter()
                .find(|t| t.schema.name == name)
                .ok_or_else(|| RemoteError::Tool(format!("no tool named '{name}'")))?;
            let command = render_command(&tool.command, &args);
            self.run(&command).await
        })
    }
}

/// Fill `{param}` placeholders with shell-quoted argument values. Missing
/// arguments become an empty string; braces around anything that is not an
/// identifier are left alone.
fn render_command(template: &str, args: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let (before, after) = rest.split_at(open);
        out.push_str(before);
        let tail = after.get(1..).unwrap_or_default();
        let key_len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        let closed = key_len > 0 && tail.get(key_len..key_len + 1) == Some("}");
        if closed {
            let key = tail.get(..key_len).unwrap_or_default();
            out.push_str(&shell_quote(&arg_text(args.get(key))));
            rest = tail.get(key_len + 1..).unwrap_or_default();
        } else {
            out.push('{');
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

fn arg_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
