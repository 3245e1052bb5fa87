//! Error taxonomy for the engine.
//!
//! Two families live here. Wiring errors ([`RegistryError`],
//! [`BridgeError::UnknownTool`], [`TurnError`]) are surfaced to the caller
//! and abort whatever was in progress. Execution errors ([`ExecError`],
//! [`BridgeError::RemoteTool`], [`BridgeError::LocalTool`]) happen inside
//! sandboxed work and are folded into a failed
//! [`ExecutionResult`](crate::sandbox::ExecutionResult) instead.

use std::path::PathBuf;
use std::time::Duration;

use crate::skills::SkillSource;

/// Failure while building a [`Registry`](crate::skills::Registry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two skills claim the same tool name or the same generated identifier.
    #[error("name collision on '{name}': registered by {first} and {second}")]
    NameCollision {
        name: String,
        first: SkillSource,
        second: SkillSource,
    },

    /// A skill name cannot be turned into a callable identifier.
    #[error("invalid tool name '{0}'")]
    InvalidName(String),

    /// A parameter name cannot be turned into a keyword argument.
    #[error("tool '{tool}' has parameter '{param}' with no usable identifier")]
    InvalidParameter { tool: String, param: String },

    /// Two parameters of one tool map onto the same keyword argument, or a
    /// parameter shadows a name the generated stub relies on.
    #[error("tool '{tool}': parameters '{first}' and '{second}' both bind as '{ident}'")]
    ParameterCollision {
        tool: String,
        ident: String,
        first: String,
        second: String,
    },
}

/// Error reported by a remote tool server.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport or protocol failure talking to the server.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server ran the tool and it reported an error payload.
    #[error("{0}")]
    Tool(String),
}

/// Failure of a single bridge call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("remote tool '{name}' failed: {message}")]
    RemoteTool { name: String, message: String },

    #[error("local tool '{name}' failed: {message}")]
    LocalTool { name: String, message: String },
}

impl BridgeError {
    /// Stable machine-readable kind used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::UnknownTool(_) => "unknown_tool",
            BridgeError::RemoteTool { .. } => "remote_tool_error",
            BridgeError::LocalTool { .. } => "local_tool_error",
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            BridgeError::UnknownTool(name) => format!("unknown tool '{name}'"),
            BridgeError::RemoteTool { message, .. } | BridgeError::LocalTool { message, .. } => {
                message.clone()
            }
        }
    }
}

/// Failure inside the sandboxed executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("path '{}' escapes the workspace", .0.display())]
    PathEscape(PathBuf),

    #[error("timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no dispatch bridge is attached to this executor")]
    NoBridge,
}

impl ExecError {
    /// Short reason tag recorded on the failed result.
    pub fn reason(&self) -> &'static str {
        match self {
            ExecError::PathEscape(_) => "path_escape",
            ExecError::Timeout(_) => "timeout",
            ExecError::Spawn { .. } => "spawn",
            ExecError::Io { .. } => "io",
            ExecError::NoBridge => "no_bridge",
        }
    }
}

/// Failure talking to the language model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("OpenRouter API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("script exhausted after {0} responses")]
    ScriptExhausted(usize),
}

impl ModelError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            ModelError::Request(msg) => {
                let lower = msg.to_lowercase();
                ["connection", "timed out", "timeout", "broken pipe", "network"]
                    .iter()
                    .any(|p| lower.contains(p))
            }
            ModelError::Stream(_) | ModelError::ScriptExhausted(_) => false,
        }
    }
}

/// Fatal error that aborts a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The model invoked a tool that the registry does not contain.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("turn cancelled")]
    Cancelled,
}
