//! Lifecycle hook storage and execution.
//!
//! # Responsibilities
//! - Store the six hook categories (start, ready, reload, shutdown, stop, route)
//! - Reject registration once the route table is frozen
//! - Execute each category with its own ordering and failure semantics
//!
//! # Execution Semantics
//! ```text
//! start     sequential, registration order, first error aborts
//! ready     concurrent, fire-and-forget, panics logged at error
//! reload    sequential, registration order, first error returned
//! shutdown  sequential, reverse registration order (LIFO)
//! stop      sequential, each isolated, panics logged at warn
//! route     synchronous at route-add time, disabled after freeze
//! ```
//!
//! # Design Decisions
//! - One mutex guards all six lists; runners snapshot under the lock and
//!   execute after releasing it
//! - Registration after freeze is a programming error and panics

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::Method;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::lifecycle::context::Context;
use crate::lifecycle::{BoxError, HookResult, LifecycleError};

type StartHook = Arc<dyn Fn(Context) -> BoxFuture<'static, HookResult> + Send + Sync>;
type ReadyHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
type ReloadHook = Arc<dyn Fn(Context) -> BoxFuture<'static, HookResult> + Send + Sync>;
type ShutdownHook = Arc<dyn Fn(Context) -> BoxFuture<'static, ()> + Send + Sync>;
type StopHook = Arc<dyn Fn() + Send + Sync>;
type RouteHook = Arc<dyn Fn(&RouteDescriptor) + Send + Sync>;

/// Shared "configuration is over" marker.
///
/// Set once by the route table when it freezes; read by the hook registry
/// to refuse late registrations.
#[derive(Debug, Clone, Default)]
pub struct FreezeFlag(Arc<AtomicBool>);

impl FreezeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Irreversibly mark as frozen. Idempotent.
    pub fn freeze(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A route as seen by route hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Hook category, used in diagnostics and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Start,
    Ready,
    Reload,
    Shutdown,
    Stop,
    Route,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Start => "start",
            HookKind::Ready => "ready",
            HookKind::Reload => "reload",
            HookKind::Shutdown => "shutdown",
            HookKind::Stop => "stop",
            HookKind::Route => "route",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Hooks {
    start: Vec<StartHook>,
    ready: Vec<ReadyHook>,
    reload: Vec<ReloadHook>,
    shutdown: Vec<ShutdownHook>,
    stop: Vec<StopHook>,
    route: Vec<RouteHook>,
}

/// Thread-safe registry of lifecycle hooks.
pub struct HookRegistry {
    hooks: Mutex<Hooks>,
    frozen: FreezeFlag,
}

impl HookRegistry {
    /// Create a registry guarded by `frozen`.
    pub fn new(frozen: FreezeFlag) -> Self {
        Self {
            hooks: Mutex::new(Hooks::default()),
            frozen,
        }
    }

    pub fn freeze_flag(&self) -> &FreezeFlag {
        &self.frozen
    }

    fn lock(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for mutation, panicking if configuration is already over.
    fn lock_for_registration(&self, kind: HookKind) -> MutexGuard<'_, Hooks> {
        let hooks = self.lock();
        if self.frozen.is_frozen() {
            drop(hooks);
            panic!("cannot register {kind} hook: route table is frozen");
        }
        hooks
    }

    /// Register a hook run sequentially before the listener opens.
    pub fn on_start<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let hook: StartHook = Arc::new(move |ctx| hook(ctx).boxed());
        self.lock_for_registration(HookKind::Start).start.push(hook);
    }

    /// Register a hook spawned concurrently once the server is serving.
    pub fn on_ready<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ReadyHook = Arc::new(move || hook().boxed());
        self.lock_for_registration(HookKind::Ready).ready.push(hook);
    }

    /// Register a hook run on every configuration reload.
    pub fn on_reload<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let hook: ReloadHook = Arc::new(move |ctx| hook(ctx).boxed());
        self.lock_for_registration(HookKind::Reload).reload.push(hook);
    }

    /// Register a hook run, in reverse registration order, within the shutdown deadline.
    pub fn on_shutdown<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ShutdownHook = Arc::new(move |ctx| hook(ctx).boxed());
        self.lock_for_registration(HookKind::Shutdown).shutdown.push(hook);
    }

    /// Register a best-effort cleanup run after the listener has closed.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock_for_registration(HookKind::Stop).stop.push(Arc::new(hook));
    }

    /// Register an observer called for every route added during configuration.
    pub fn on_route<F>(&self, hook: F)
    where
        F: Fn(&RouteDescriptor) + Send + Sync + 'static,
    {
        self.lock_for_registration(HookKind::Route).route.push(Arc::new(hook));
    }

    /// Notify route hooks of a newly added route. Silently ignored once frozen.
    pub fn fire_route(&self, route: &RouteDescriptor) {
        if self.frozen.is_frozen() {
            return;
        }
        let hooks = self.lock().route.clone();
        for hook in hooks {
            hook(route);
        }
    }

    /// Run start hooks in order, stopping at the first failure.
    pub async fn run_start(&self, ctx: &Context) -> Result<(), LifecycleError> {
        let hooks = self.lock().start.clone();
        for (index, hook) in hooks.iter().enumerate() {
            tracing::debug!(index, "Running start hook");
            if let Err(source) = hook(ctx.clone()).await {
                record_failure(HookKind::Start);
                tracing::error!(index, error = %source, "Start hook failed");
                return Err(LifecycleError::StartHook { index, source });
            }
        }
        Ok(())
    }

    /// Spawn every ready hook on its own task and return immediately.
    ///
    /// A panicking hook is logged and does not affect its siblings or the caller.
    /// Hooks are detached: shutdown does not cancel them, they live as long as the runtime.
    pub fn run_ready(&self) {
        let hooks = self.lock().ready.clone();
        for (index, hook) in hooks.into_iter().enumerate() {
            tokio::spawn(async move {
                match AssertUnwindSafe(async move { hook().await })
                    .catch_unwind()
                    .await
                {
                    Ok(()) => tracing::debug!(index, "Ready hook finished"),
                    Err(panic) => {
                        record_failure(HookKind::Ready);
                        tracing::error!(
                            index,
                            panic = %panic_message(panic.as_ref()),
                            "Ready hook panicked"
                        );
                    }
                }
            });
        }
    }

    /// Run reload hooks in order; the first failure is returned and later hooks are skipped.
    pub async fn run_reload(&self, ctx: &Context) -> Result<(), LifecycleError> {
        let hooks = self.lock().reload.clone();
        for (index, hook) in hooks.iter().enumerate() {
            tracing::debug!(index, "Running reload hook");
            if let Err(source) = hook(ctx.clone()).await {
                record_failure(HookKind::Reload);
                tracing::error!(index, error = %source, "Reload hook failed");
                return Err(LifecycleError::ReloadHook { index, source });
            }
        }
        Ok(())
    }

    /// Run shutdown hooks last-registered first.
    ///
    /// Hooks receive `ctx` and are expected to honour its deadline; they are
    /// not cancelled by the registry.
    pub async fn run_shutdown(&self, ctx: &Context) {
        let hooks = self.lock().shutdown.clone();
        for (index, hook) in hooks.iter().enumerate().rev() {
            tracing::debug!(index, "Running shutdown hook");
            hook(ctx.clone()).await;
        }
    }

    /// Run stop hooks in order, isolating panics.
    pub fn run_stop(&self) {
        let hooks = self.lock().stop.clone();
        for (index, hook) in hooks.iter().enumerate() {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| hook())) {
                record_failure(HookKind::Stop);
                tracing::warn!(
                    index,
                    panic = %panic_message(panic.as_ref()),
                    "Stop hook panicked"
                );
            }
        }
    }

    /// Number of registered hooks of `kind`.
    pub fn count(&self, kind: HookKind) -> usize {
        let hooks = self.lock();
        match kind {
            HookKind::Start => hooks.start.len(),
            HookKind::Ready => hooks.ready.len(),
            HookKind::Reload => hooks.reload.len(),
            HookKind::Shutdown => hooks.shutdown.len(),
            HookKind::Stop => hooks.stop.len(),
            HookKind::Route => hooks.route.len(),
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.lock();
        f.debug_struct("HookRegistry")
            .field("start", &hooks.start.len())
            .field("ready", &hooks.ready.len())
            .field("reload", &hooks.reload.len())
            .field("shutdown", &hooks.shutdown.len())
            .field("stop", &hooks.stop.len())
            .field("route", &hooks.route.len())
            .field("frozen", &self.frozen.is_frozen())
            .finish()
    }
}

fn record_failure(kind: HookKind) {
    metrics::counter!("lifecycle_hook_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Convenience for hook bodies that want a plain message error.
pub fn hook_error(msg: impl Into<String>) -> BoxError {
    let msg: String = msg.into();
    msg.into()
}
