//! Serialized configuration reloads.
//!
//! # Responsibilities
//! - Run reload hooks on demand
//! - Guarantee at most one reload executes at a time
//!
//! # Design Decisions
//! - A single tokio mutex for the whole coordinator; waiters queue FIFO
//! - Concurrent callers wait, they are never rejected
//! - Failure is reported to the caller; serving continues

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::lifecycle::context::Context;
use crate::lifecycle::hooks::{HookKind, HookRegistry};
use crate::lifecycle::LifecycleError;

/// Serializes reload requests against a hook registry.
#[derive(Debug)]
pub struct ReloadCoordinator {
    hooks: Arc<HookRegistry>,
    in_flight: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self {
            hooks,
            in_flight: Mutex::new(()),
        }
    }

    /// Whether any reload hook is registered.
    pub fn has_hooks(&self) -> bool {
        self.hooks.count(HookKind::Reload) > 0
    }

    /// Run all reload hooks, waiting for any in-flight reload to finish first.
    pub async fn reload(&self, ctx: &Context) -> Result<(), LifecycleError> {
        let _guard = self.in_flight.lock().await;
        tracing::info!("Reloading configuration");

        let result = self.hooks.run_reload(ctx).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("lifecycle_reloads_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(()) => tracing::info!("Reload complete"),
            Err(e) => tracing::error!(error = %e, "Reload failed, continuing with partially applied state"),
        }
        result
    }
}
