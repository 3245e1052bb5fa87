//! Axum server setup and router construction.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ptc_rs::bridge::Bridge;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{self, AppState};

/// Build the bridge router.
///
/// - `POST /call` and `POST /call/{name}` dispatch a skill call
/// - `GET /tools` lists skills
/// - `GET /health` reports liveness
pub fn build_router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/call", post(api::post_call))
        .route("/call/{name}", post(api::post_call_named))
        .route("/tools", get(api::get_tools))
        .route("/health", get(api::get_health))
        .with_state(AppState { bridge })
        .layer(TraceLayer::new_for_http())
}

/// Bind `bind_addr` and serve `router` on a background task.
pub async fn start_server(
    router: Router,
    bind_addr: SocketAddr,
) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("bridge listening on http://{addr}");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("bridge server failed: {e}");
        }
    });

    Ok((addr, task))
}
