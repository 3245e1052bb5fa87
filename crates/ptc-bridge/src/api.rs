//! Endpoint handlers.
//!
//! `POST /call` is what the generated Python bindings use. The other routes
//! exist for debugging and for clients that are not the bindings.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ptc_rs::bridge::{Bridge, CallReply, CallRequest};
use serde_json::{Map, Value, json};
use tracing::debug;

/// Shared state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

/// HTTP status for a reply. Successful calls are 200; failures are mapped
/// by kind so non-binding clients can tell them apart without the body.
fn status_for(reply: &CallReply) -> StatusCode {
    match reply {
        CallReply::Ok { .. } => StatusCode::OK,
        CallReply::Err { error, .. } => match error.as_str() {
            "unknown_tool" => StatusCode::NOT_FOUND,
            "remote_tool_error" => StatusCode::BAD_GATEWAY,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn respond(reply: CallReply) -> (StatusCode, Json<CallReply>) {
    (status_for(&reply), Json(reply))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<CallReply>) {
    respond(CallReply::Err {
        error: "bad_request".into(),
        message: message.into(),
    })
}

/// POST /call: `{"name": ..., "kwargs": {...}}`.
pub async fn post_call(
    State(app): State<AppState>,
    body: Result<Json<CallRequest>, JsonRejection>,
) -> (StatusCode, Json<CallReply>) {
    match body {
        Ok(Json(request)) => respond(app.bridge.handle(request).await),
        Err(rejection) => {
            debug!("rejected call body: {rejection}");
            bad_request(rejection.body_text())
        }
    }
}

/// POST /call/{name}: the body is the kwargs object itself. An empty body
/// means no arguments.
pub async fn post_call_named(
    State(app): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<CallReply>) {
    let kwargs = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Map<String, Value>>(&body) {
            Ok(kwargs) => kwargs,
            Err(e) => return bad_request(format!("kwargs must be a JSON object: {e}")),
        }
    };
    respond(app.bridge.handle(CallRequest { name, kwargs }).await)
}

/// GET /tools: every skill with its source and input schema.
pub async fn get_tools(State(app): State<AppState>) -> Json<Value> {
    let skills: Vec<_> = app.bridge.registry().skills().collect();
    Json(serde_json::to_value(skills).unwrap_or_default())
}

/// GET /health: liveness plus the number of registered skills.
pub async fn get_health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({"status": "ok", "tools": app.bridge.registry().len()}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let err = |kind: &str| CallReply::Err {
            error: kind.into(),
            message: String::new(),
        };
        assert_eq!(status_for(&CallReply::Ok { result: json!(1) }), StatusCode::OK);
        assert_eq!(status_for(&err("unknown_tool")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&err("remote_tool_error")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&err("local_tool_error")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(&err("bad_request")), StatusCode::BAD_REQUEST);
    }
}
