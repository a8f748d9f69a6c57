//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Observability start → Start hooks → (listener opens in orchestrator.rs)
//!
//! Serving (orchestrator.rs):
//!     Bound + accepting → Ready hooks → wait for cancellation or listener failure
//!
//! Shutdown (shutdown.rs):
//!     Fresh deadline → Shutdown hooks (LIFO) → Drain → Observability shutdown → Stop hooks
//!
//! Reload (reload.rs):
//!     Reload(ctx) / SIGHUP / admin endpoint / config watcher → one reload at a time
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → cancel serving token
//!     SIGHUP → Reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: providers first, then start hooks, then the listener
//! - Start failures are fatal; the listener never opens
//! - Shutdown has its own deadline, independent of the serving token

pub mod context;
pub mod hooks;
pub mod orchestrator;
pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use context::{Context, ContextError};
pub use hooks::{hook_error, FreezeFlag, HookKind, HookRegistry, RouteDescriptor};
pub use orchestrator::RunState;
pub use reload::ReloadCoordinator;

use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;

/// Error type carried by hook, check and provider bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a fallible hook.
pub type HookResult = Result<(), BoxError>;

/// Errors surfaced by the lifecycle core.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// An observability provider failed to start.
    #[error("observability provider `{name}` failed to start: {source}")]
    Observability { name: String, source: BoxError },

    /// A start hook failed; the listener was never opened.
    #[error("start hook {index} failed: {source}")]
    StartHook { index: usize, source: BoxError },

    /// A reload hook failed; the server keeps serving.
    #[error("reload hook {index} failed: {source}")]
    ReloadHook { index: usize, source: BoxError },

    /// The listener could not be bound.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// TLS material could not be loaded.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The accept loop failed while serving.
    #[error("server failed while serving: {0}")]
    Serve(#[source] std::io::Error),

    /// `run` was called on a server that has already left `Configuring`.
    #[error("server has already been started")]
    AlreadyStarted,
}
