//! Shutdown sequencing.
//!
//! # Responsibilities
//! - Derive the shutdown deadline from a fresh, uncancelled base
//! - Run shutdown hooks (LIFO), drain the listener, stop providers, run stop hooks
//!
//! # Design Decisions
//! - Nothing in this phase aborts the sequence; failures are logged
//! - Stop hooks run last and have no deadline

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::context::Context;
use crate::lifecycle::hooks::HookRegistry;
use crate::observability::Provider;

/// Failure to drain in-flight requests.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("drain deadline exceeded with {open_connections} connection(s) still open")]
    DeadlineExceeded { open_connections: usize },
    #[error("server task failed while draining: {0}")]
    Server(String),
}

/// The context handed to shutdown hooks and the drain.
///
/// Always rooted at [`Context::background`]: the serving context is already
/// cancelled by the time shutdown starts and must not bound the budget.
pub fn shutdown_context(timeout: Duration) -> Context {
    Context::background().with_timeout(timeout)
}

/// Run the full shutdown phase.
///
/// `drain` asks the listener to stop accepting and waits for in-flight
/// requests, bounded by the context it is given.
pub async fn run_shutdown<D, Fut>(
    hooks: &HookRegistry,
    providers: &[Arc<dyn Provider>],
    timeout: Duration,
    drain: D,
) where
    D: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<(), DrainError>>,
{
    let ctx = shutdown_context(timeout);
    tracing::info!(timeout_secs = timeout.as_secs_f64(), "Shutting down");

    hooks.run_shutdown(&ctx).await;

    if let Err(e) = drain(ctx.clone()).await {
        metrics::counter!("lifecycle_drain_failures_total").increment(1);
        tracing::error!(error = %e, "Listener did not drain cleanly");
    }

    for provider in providers {
        if let Err(e) = provider.shutdown(ctx.clone()).await {
            tracing::warn!(provider = provider.name(), error = %e, "Observability provider shutdown failed");
        }
    }

    hooks.run_stop();
}
