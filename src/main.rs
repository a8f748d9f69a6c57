//! Lifecycle server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   signals ──cancel──▶ ┌──────────────────────────────────────────────┐
//!   SIGHUP ──reload───▶ │                 lifecycle                     │
//!   config file ──────▶ │ start ▶ bind ▶ ready ▶ serve ▶ shutdown ▶ stop │
//!                       └───────┬──────────────────────────┬───────────┘
//!                               ▼                          ▼
//!                       ┌──────────────┐           ┌──────────────┐
//!                       │ http routes  │           │ observability │
//!                       │ + /healthz   │           │ logs, metrics │
//!                       │ + /readyz    │           └──────────────┘
//!                       └──────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::Method;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use lifecycle_server::config::{load_config, reload_on_change, ServerConfig};
use lifecycle_server::lifecycle::signals::cancel_on_shutdown_signal;
use lifecycle_server::lifecycle::{hook_error, BoxError};
use lifecycle_server::observability::logging::init_logging;
use lifecycle_server::observability::metrics::PrometheusProvider;
use lifecycle_server::Server;

#[derive(Parser)]
#[command(name = "lifecycle-server")]
#[command(about = "HTTP server with start, ready, reload and shutdown hooks", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        shutdown_timeout_secs = config.lifecycle.shutdown_timeout_secs,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    let current = Arc::new(ArcSwap::from_pointee(config.clone()));
    let server = Server::new(config.clone());
    server.add_provider(Arc::new(PrometheusProvider::from_config(&config.observability)?));

    server.on_route(|route| tracing::debug!(route = %route, "Route registered"));
    server.on_ready(|| async { tracing::info!("Server ready") });
    server.on_stop(|| tracing::info!("Shutdown complete"));

    if let Some(path) = cli.config.clone() {
        let current = current.clone();
        server.on_reload(move |_ctx| {
            let path = path.clone();
            let current = current.clone();
            async move {
                let config = load_config(&path).map_err(|e| hook_error(e.to_string()))?;
                current.store(Arc::new(config));
                tracing::info!(path = ?path, "Configuration reloaded");
                Ok(())
            }
        });
    }

    let status = current.clone();
    server.route(Method::GET, "/", move || {
        let status = status.clone();
        async move { format!("listening on {}\n", status.load().listener.bind_address) }
    });

    let token = CancellationToken::new();
    let _signals = cancel_on_shutdown_signal(token.clone());

    let _watch = match (&cli.config, config.lifecycle.watch_config) {
        (Some(path), true) => Some(reload_on_change(path, server.reloader().clone(), token.clone())?),
        _ => None,
    };

    server.serve(token).await?;
    Ok(())
}
