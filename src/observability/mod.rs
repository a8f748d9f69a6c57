//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters through the `metrics` facade)
//!
//! Lifecycle:
//!     startup.rs   → Provider::start   (registration order, first error aborts)
//!     shutdown.rs  → Provider::shutdown (every provider, errors logged)
//! ```
//!
//! # Design Decisions
//! - Providers are collaborators: the lifecycle only sequences them
//! - `start`/`shutdown` must be no-ops when the provider is not configured
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

use futures_util::future::BoxFuture;

use crate::lifecycle::{BoxError, Context};

/// An observability backend whose lifetime is tied to the server's.
pub trait Provider: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Bring the provider up. Called before any start hook.
    fn start(&self, ctx: Context) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Flush and release resources. Called after the listener has drained.
    fn shutdown(&self, ctx: Context) -> BoxFuture<'_, Result<(), BoxError>>;
}
