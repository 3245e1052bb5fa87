//! Remote tool boundary.
//!
//! A remote tool server (an MCP server, a shell-command adapter, a test
//! double) lists its tools once and then answers calls with a JSON value.
//! Process management and the handshake are the server's business.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::RemoteError;

/// Boxed future returned by [`RemoteToolServer`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// A server that exposes tools over a remote protocol.
///
/// Uses boxed futures so the trait stays object-safe and servers can be
/// stored as `Arc<dyn RemoteToolServer>`.
pub trait RemoteToolServer: Send + Sync {
    /// Server name used to group its tools (`remote/<name>/...`).
    fn name(&self) -> &str;

    /// List the tools this server provides.
    fn list_tools(&self) -> RemoteFuture<'_, Vec<RemoteToolSchema>>;

    /// Call one tool. A tool-level failure is [`RemoteError::Tool`] carrying
    /// the server's message.
    fn call_tool<'a>(&'a self, name: &'a str, args: Value) -> RemoteFuture<'a, Value>;
}

/// One entry of a remote tool listing.
///
/// Deserializes from the flat `{name, description, input_schema}` shape as
/// well as the OpenAI-style `{"type": "function", "function": {...}}`
/// wrapper. The schema may be spelled `input_schema`, `inputSchema`,
/// `parameters` or `params_json_schema`; a missing schema means "no
/// parameters".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawToolSchema")]
pub struct RemoteToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl RemoteToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[derive(Deserialize)]
struct RawToolSchema {
    #[serde(default)]
    function: Option<Box<RawToolSchema>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(
        default,
        alias = "inputSchema",
        alias = "parameters",
        alias = "params_json_schema"
    )]
    input_schema: Option<Value>,
}

impl TryFrom<RawToolSchema> for RemoteToolSchema {
    type Error = String;

    fn try_from(raw: RawToolSchema) -> Result<Self, Self::Error> {
        let raw = match raw.function {
            Some(inner) => *inner,
            None => raw,
        };
        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| "tool schema without a name".to_string())?;
        let input_schema = match raw.input_schema {
            Some(Value::Object(map)) => Value::Object(map),
            Some(Value::Null) | None => json!({"type": "object", "properties": {}}),
            Some(other) => return Err(format!("tool '{name}': input schema must be an object, got {other}")),
        };
        Ok(Self {
            name,
            description: raw.description.unwrap_or_default(),
            input_schema,
        })
    }
}
