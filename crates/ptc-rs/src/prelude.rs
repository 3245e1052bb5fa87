//! Convenience re-exports for common `ptc-rs` types.
//!
//! Meant to be glob-imported when wiring up an engine:
//!
//! ```ignore
//! use ptc_rs::prelude::*;
//! ```
//!
//! This pulls in the client and model types, [`Message`] constructors, the
//! [`TurnController`] and its config, the executor, and the skills registry.
//! Parser internals and wire types are left out; import those from their
//! modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, OpenRouterClient, json_schema_for};

// ── Model ───────────────────────────────────────────────────────────
pub use crate::api::RetryConfig;
pub use crate::model::{ChatModel, ModelConfig, OpenRouterModel, ScriptedModel, TextStream};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{PtcConfig, PtcEvent, SystemPromptBuilder, TurnController, ptc_system_prompt};

// ── Execution ───────────────────────────────────────────────────────
pub use crate::bridge::Bridge;
pub use crate::sandbox::{ExecutionResult, ExecutionStatus, Executor, ExecutorConfig};

// ── Skills ──────────────────────────────────────────────────────────
pub use crate::skills::{
    LocalFunction, Param, ParamType, Registry, RemoteToolSchema, RemoteToolServer, Skill,
    SkillSource, bindings,
};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{BridgeError, ExecError, ModelError, RegistryError, RemoteError, TurnError};
