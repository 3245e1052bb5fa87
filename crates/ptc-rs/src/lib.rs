//! Programmatic tool calling: let a language model use tools by writing code.
//!
//! Instead of structured JSON tool calls, the model writes executable fences
//! into its ordinary streamed output:
//!
//! ````text
//! Let me look around.
//! ```bash:execute
//! ls -la
//! ```
//! ````
//!
//! `ptc-rs` parses that stream incrementally, pauses generation when a block
//! is complete, runs it inside a workspace, feeds the result back into the
//! conversation, and resumes. Tools from remote servers and in-process Rust
//! functions are merged into one namespace and exposed to model-authored
//! Python as ordinary functions.
//!
//! # Getting started
//!
//! ```ignore
//! use ptc_rs::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(Registry::builder().local(my_function()).build()?);
//!     bindings::materialize(&registry, "workspace/skills")?;
//!
//!     let bridge = Arc::new(Bridge::new(Arc::clone(&registry)));
//!     let executor = Executor::new("workspace", ExecutorConfig::default())
//!         .with_bridge(bridge)
//!         .with_skills_dir("workspace/skills");
//!
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY")?)?;
//!     let model = OpenRouterModel::new(client, ModelConfig::new("anthropic/claude-sonnet-4"));
//!     let config = PtcConfig::default().with_system_prompt(ptc_system_prompt(&registry, Path::new("skills")));
//!
//!     let mut controller = TurnController::new(&model, &executor, config);
//!     let events = controller.run_turn_collect("List the files here.").await?;
//!     for event in events {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`parser`] | Incremental fence and `<invoke>` parser producing [`Segment`](parser::Segment)s |
//! | [`agent`] | [`TurnController`](agent::TurnController) state machine, [`PtcEvent`](agent::PtcEvent), system prompt |
//! | [`sandbox`] | [`Executor`](sandbox::Executor) for shell, code, file creation and tool calls |
//! | [`skills`] | [`Registry`](skills::Registry), local functions, remote servers, binding generator |
//! | [`bridge`] | [`Bridge`](bridge::Bridge) dispatching binding calls to their implementation |
//! | [`model`] | [`ChatModel`](model::ChatModel) boundary, OpenRouter and scripted models |
//! | [`api`] | SSE streaming and retry with backoff |

pub mod agent;
pub mod api;
pub mod bridge;
pub mod error;
pub mod model;
pub mod parser;
pub mod prelude;
pub mod sandbox;
pub mod skills;

use schemars::JsonSchema;
use serde::Serialize;
use std::time::Duration;

use crate::error::ModelError;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for all LLM calls.
pub const DEFAULT_MODEL: &str = "anthropic/claude-haiku-4.5";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema value from a Rust type.
///
/// Used to derive the parameter list of typed
/// [`LocalFunction`](skills::LocalFunction)s.
///
/// ```
/// use ptc_rs::json_schema_for;
/// use schemars::JsonSchema;
///
/// #[derive(JsonSchema)]
/// #[allow(dead_code)]
/// struct GrepArgs {
///     /// Pattern to search for.
///     pattern: String,
///     /// Maximum matches.
///     limit: Option<u32>,
/// }
///
/// let schema = json_schema_for::<GrepArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"pattern".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Streaming chat completion request body. Unused optional fields are
/// omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Execution results. Sent to providers as `user` since the fence
    /// protocol has no tool call ids to attach them to.
    #[serde(rename = "user")]
    ToolResult,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolResult,
            content: content.into(),
        }
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
    pub(crate) endpoint: String,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ModelError> {
        Self::with_headers(api_key, "https://github.com/tacryt-socryp/ptc-rs", "ptc-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ModelError> {
        // No whole-request timeout: a streamed response stays open for as
        // long as the model generates. Connection setup is still bounded.
        let client = reqwest::Client::builder()
            .user_agent("ptc-rs/0.1")
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ModelError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            endpoint: OPENROUTER_URL.to_string(),
        })
    }

    /// Point the client at another OpenAI-compatible completions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}
