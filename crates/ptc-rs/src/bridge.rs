//! Dispatch bridge: resolve a binding call to its implementation.
//!
//! The bridge is transport-agnostic. The executor calls it in-process for
//! XML tool invocations; `ptc-bridge` exposes it over loopback HTTP for the
//! generated Python stubs. It keeps no state between calls.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::error::BridgeError;
use crate::skills::Registry;
use crate::skills::local::validate_arguments;
use crate::skills::registry::Backend;

/// Body of a call request: `{"name": ..., "kwargs": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub name: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Reply to a call: `{"result": ...}` or `{"error": kind, "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallReply {
    Ok { result: Value },
    Err { error: String, message: String },
}

impl From<Result<Value, BridgeError>> for CallReply {
    fn from(result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(result) => CallReply::Ok { result },
            Err(e) => CallReply::Err {
                error: e.kind().to_string(),
                message: e.message(),
            },
        }
    }
}

/// Routes calls to remote servers or local functions.
#[derive(Debug, Clone)]
pub struct Bridge {
    registry: Arc<Registry>,
}

impl Bridge {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Call skill `name` with keyword arguments.
    ///
    /// Remote results are returned verbatim. Local arguments are validated
    /// against the skill's input schema before the handler runs.
    pub async fn call(&self, name: &str, kwargs: Map<String, Value>) -> Result<Value, BridgeError> {
        let Some((skill, backend)) = self.registry.backend(name) else {
            warn!("[bridge] unknown tool '{name}'");
            return Err(BridgeError::UnknownTool(name.to_string()));
        };

        log_call(name, &kwargs);
        let start = Instant::now();

        let result = match backend {
            Backend::Remote(server) => server
                .call_tool(&skill.name, Value::Object(kwargs))
                .await
                .map_err(|e| BridgeError::RemoteTool {
                    name: name.to_string(),
                    message: e.to_string(),
                }),
            Backend::Local(function) => {
                let outcome = match validate_arguments(function.input_schema(), &kwargs) {
                    Ok(()) => function.invoke(kwargs).await,
                    Err(e) => Err(e),
                };
                outcome.map_err(|message| BridgeError::LocalTool {
                    name: name.to_string(),
                    message,
                })
            }
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(value) => {
                debug!(
                    "[bridge] {name} completed in {:.0}ms",
                    elapsed.as_secs_f64() * 1000.0
                );
                trace!("[bridge] {name} result: {value}");
            }
            Err(e) => info!("[bridge] {name} failed: {e}"),
        }
        result
    }

    /// Serve one wire request.
    pub async fn handle(&self, request: CallRequest) -> CallReply {
        self.call(&request.name, request.kwargs).await.into()
    }
}

/// Log a call at INFO with a short preview of the arguments.
fn log_call(name: &str, kwargs: &Map<String, Value>) {
    let args = Value::Object(kwargs.clone()).to_string();
    let preview: String = args.chars().take(120).collect();
    info!(
        "[bridge] {name}({preview}{})",
        if args.len() > 120 { "..." } else { "" }
    );
}
