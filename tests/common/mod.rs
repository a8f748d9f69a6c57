//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lifecycle_server::{LifecycleError, RunState, Server, ServerConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Config bound to an ephemeral loopback port with a short shutdown budget.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.lifecycle.shutdown_timeout_secs = 2;
    config.lifecycle.reload_on_hangup = false;
    config.health.check_timeout_ms = 200;
    config
}

/// Run `server` in the background until `token` is cancelled.
#[allow(dead_code)]
pub fn spawn_server(
    server: Arc<Server>,
    token: CancellationToken,
) -> JoinHandle<Result<(), LifecycleError>> {
    tokio::spawn(async move { server.run(token).await })
}

/// Wait until the server accepts connections and return its address.
pub async fn wait_for_serving(server: &Server) -> SocketAddr {
    let mut state = server.state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s >= RunState::Serving),
    )
    .await
    .expect("server did not start in time")
    .expect("state channel closed");
    assert_eq!(server.run_state(), RunState::Serving);
    server.local_addr().expect("listener address")
}

/// Client without pooling so every request opens a fresh connection.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
