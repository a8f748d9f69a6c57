//! OS signal handling.
//!
//! # Responsibilities
//! - Translate SIGTERM/SIGINT into cancellation of the serving token
//! - Translate SIGHUP into a configuration reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers reload, not shutdown, and is only installed when a
//!   reload hook exists
//! - Non-unix targets get Ctrl-C only and no reload bridge

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::context::Context;
use crate::lifecycle::reload::ReloadCoordinator;

/// Resolve on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Cancel `token` when a shutdown signal arrives.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    })
}

/// Run `coordinator.reload` on every SIGHUP until `token` is cancelled.
///
/// Returns `None` when there is nothing to reload or the platform has no SIGHUP.
pub fn spawn_hangup_reload(
    coordinator: Arc<ReloadCoordinator>,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !coordinator.has_hooks() {
        return None;
    }
    hangup_task(coordinator, token)
}

#[cfg(unix)]
fn hangup_task(
    coordinator: Arc<ReloadCoordinator>,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler, reload via signal disabled");
            return None;
        }
    };

    tracing::debug!("SIGHUP reload handler installed");
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("SIGHUP received");
                    // Failures are logged by the coordinator.
                    let _ = coordinator.reload(&Context::background()).await;
                }
                _ = token.cancelled() => break,
            }
        }
    }))
}

#[cfg(not(unix))]
fn hangup_task(
    _coordinator: Arc<ReloadCoordinator>,
    _token: CancellationToken,
) -> Option<JoinHandle<()>> {
    None
}
