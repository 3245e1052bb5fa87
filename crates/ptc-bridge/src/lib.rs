//! Loopback HTTP transport for the `ptc-rs` dispatch bridge.
//!
//! Python code run by the executor reaches skills through generated stubs
//! that POST to this server. The server is a thin shell around
//! [`Bridge`](ptc_rs::bridge::Bridge): it owns no state of its own and binds
//! to loopback only.
//!
//! # Quick start
//!
//! ```ignore
//! use ptc_bridge::{BridgeConfig, spawn_bridge};
//!
//! let handle = spawn_bridge(bridge.clone(), BridgeConfig::default()).await?;
//! let executor = Executor::new("workspace", ExecutorConfig::default())
//!     .with_bridge(bridge)
//!     .with_bridge_url(handle.url());
//! ```
//!
//! # Routes
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `POST /call` | `{"name", "kwargs"}` | `{"result"}` or `{"error", "message"}` |
//! | `POST /call/{name}` | kwargs object | same |
//! | `GET /tools` | | skill descriptors |
//! | `GET /health` | | `{"status": "ok", "tools": n}` |
//!
//! Failures carry a status matching their kind: 404 unknown tool, 502
//! remote tool error, 500 local tool error, 400 malformed request.

mod api;
mod server;

pub use server::build_router;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ptc_rs::bridge::Bridge;
use tokio::task::JoinHandle;

/// Configuration for the bridge server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address to bind to. Default: `127.0.0.1:0` (any free port).
    pub bind_addr: SocketAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        }
    }
}

/// A running bridge server. The server stops when the handle is dropped.
#[derive(Debug)]
pub struct BridgeHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to hand to the executor (`PTC_BRIDGE_URL`).
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the bridge server on a Tokio task.
///
/// Refuses non-loopback addresses: the bridge has no authentication.
pub async fn spawn_bridge(bridge: Arc<Bridge>, config: BridgeConfig) -> io::Result<BridgeHandle> {
    if !config.bind_addr.ip().is_loopback() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bridge must bind to loopback, got {}", config.bind_addr),
        ));
    }
    let router = build_router(bridge);
    let (addr, task) = server::start_server(router, config.bind_addr).await?;
    Ok(BridgeHandle { addr, task })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_any_port() {
        let config = BridgeConfig::default();
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 0);
    }

    #[tokio::test]
    async fn non_loopback_bind_is_refused() {
        let bridge = Arc::new(Bridge::new(Arc::new(ptc_rs::skills::Registry::empty())));
        let config = BridgeConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
        };
        let err = spawn_bridge(bridge, config).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
