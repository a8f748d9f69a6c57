//! Startup orchestration.
//!
//! # Responsibilities
//! - Start observability providers in registration order
//! - Run start hooks in registration order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and returned before the listener opens
//! - Providers come up before hooks so hook failures are observable

use std::sync::Arc;

use crate::lifecycle::context::Context;
use crate::lifecycle::hooks::HookRegistry;
use crate::lifecycle::LifecycleError;
use crate::observability::Provider;

/// Start every provider, then every start hook. The first failure aborts.
pub async fn run_startup(
    ctx: &Context,
    providers: &[Arc<dyn Provider>],
    hooks: &HookRegistry,
) -> Result<(), LifecycleError> {
    for provider in providers {
        tracing::debug!(provider = provider.name(), "Starting observability provider");
        provider
            .start(ctx.clone())
            .await
            .map_err(|source| LifecycleError::Observability {
                name: provider.name().to_string(),
                source,
            })?;
    }

    hooks.run_start(ctx).await
}
