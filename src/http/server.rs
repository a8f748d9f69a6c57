//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Own the hook registry, route table, health checks and providers
//! - Expose the registration API used during the configuration phase
//! - Pick the transport (plain, TLS, mutual TLS) and hand off to the orchestrator
//! - Build the served Router with the standard middleware stack

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{get, on, MethodFilter, MethodRouter};
use axum::Router;
use axum_server::tls_rustls::RustlsAcceptor;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::ServerConfig;
use crate::health::{handlers, HealthChecks, HealthState, Probe};
use crate::http::routes::RouteTable;
use crate::lifecycle::{
    BoxError, Context, FreezeFlag, HookRegistry, HookResult, LifecycleError, ReloadCoordinator,
    RouteDescriptor, RunState,
};
use crate::net::connection::{Authorize, AuthorizingAcceptor, ConnectionObserver};
use crate::net::tls::{load_mutual_tls_config, load_tls_config, TlsError};
use crate::observability::Provider;

/// An HTTP server with an explicit lifecycle.
///
/// Configure it (hooks, routes, checks, providers), then call one of the
/// `run*` methods exactly once.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) hooks: Arc<HookRegistry>,
    pub(crate) routes: RouteTable,
    pub(crate) checks: Arc<HealthChecks>,
    pub(crate) reloader: Arc<ReloadCoordinator>,
    pub(crate) providers: Mutex<Vec<Arc<dyn Provider>>>,
    pub(crate) state: watch::Sender<RunState>,
    pub(crate) local_addr: OnceLock<SocketAddr>,
    authorizer: Mutex<Option<Arc<dyn Authorize>>>,
    observer: Mutex<Option<ConnectionObserver>>,
}

impl Server {
    /// Create a server in the `Configuring` state.
    pub fn new(config: ServerConfig) -> Self {
        let frozen = FreezeFlag::new();
        let hooks = Arc::new(HookRegistry::new(frozen.clone()));
        let reloader = Arc::new(ReloadCoordinator::new(hooks.clone()));
        let (state, _) = watch::channel(RunState::Configuring);

        Self {
            config,
            hooks,
            routes: RouteTable::new(frozen),
            checks: Arc::new(HealthChecks::new()),
            reloader,
            providers: Mutex::new(Vec::new()),
            state,
            local_addr: OnceLock::new(),
            authorizer: Mutex::new(None),
            observer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn on_start<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.hooks.on_start(hook);
    }

    pub fn on_ready<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_ready(hook);
    }

    pub fn on_reload<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.hooks.on_reload(hook);
    }

    pub fn on_shutdown<F, Fut>(&self, hook: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_shutdown(hook);
    }

    pub fn on_stop<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_stop(hook);
    }

    pub fn on_route<F>(&self, hook: F)
    where
        F: Fn(&RouteDescriptor) + Send + Sync + 'static,
    {
        self.hooks.on_route(hook);
    }

    /// Add a route. Panics once the server has started.
    pub fn route<H, T>(&self, method: Method, path: &str, handler: H) -> RouteDescriptor
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .unwrap_or_else(|_| panic!("unsupported route method {method}"));
        self.mount(method, path, on(filter, handler))
    }

    pub(crate) fn mount(&self, method: Method, path: &str, handler: MethodRouter) -> RouteDescriptor {
        let descriptor = self.routes.add(method, path, handler);
        self.hooks.fire_route(&descriptor);
        descriptor
    }

    /// Routes registered so far, including built-in endpoints once running.
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.routes()
    }

    pub fn frozen(&self) -> bool {
        self.routes.frozen()
    }

    /// Register a check answered by `GET <prefix>/healthz`.
    pub fn liveness_check<F, Fut>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.checks.add(Probe::Liveness, name, check);
    }

    /// Register a check answered by `GET <prefix>/readyz`.
    pub fn readiness_check<F, Fut>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.checks.add(Probe::Readiness, name, check);
    }

    /// Add an observability provider; started before start hooks, stopped after drain.
    pub fn add_provider(&self, provider: Arc<dyn Provider>) {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);
    }

    pub(crate) fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Authorize mutual-TLS peers by certificate.
    pub fn authorize_connections(&self, authorizer: Arc<dyn Authorize>) {
        *self.authorizer.lock().unwrap_or_else(PoisonError::into_inner) = Some(authorizer);
    }

    /// Observe every mutual-TLS authorization decision.
    pub fn observe_connections(&self, observer: ConnectionObserver) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Run the reload hooks, serialized with every other reload.
    pub async fn reload(&self, ctx: &Context) -> Result<(), LifecycleError> {
        self.reloader.reload(ctx).await
    }

    pub fn reloader(&self) -> &Arc<ReloadCoordinator> {
        &self.reloader
    }

    /// Watch lifecycle state transitions.
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn run_state(&self) -> RunState {
        *self.state.borrow()
    }

    /// The bound address, once the listener is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Serve plain HTTP until `token` is cancelled or the listener fails.
    pub async fn run(&self, token: CancellationToken) -> Result<(), LifecycleError> {
        self.run_server(token, "http", |listener, router, handle| {
            async move {
                axum_server::from_tcp(listener)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
            .boxed()
        })
        .await
    }

    /// Serve HTTPS using the configured certificate and key.
    pub async fn run_tls(&self, token: CancellationToken) -> Result<(), LifecycleError> {
        let tls = self.config.listener.tls.as_ref().ok_or(TlsError::NotFound {
            kind: "TLS configuration",
            path: "listener.tls".into(),
        })?;
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;

        self.run_server(token, "https", move |listener, router, handle| {
            async move {
                axum_server::from_tcp_rustls(listener, rustls)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
            .boxed()
        })
        .await
    }

    /// Serve HTTPS requiring client certificates, authorizing each connection.
    pub async fn run_mutual_tls(&self, token: CancellationToken) -> Result<(), LifecycleError> {
        let tls = self.config.listener.tls.as_ref().ok_or(TlsError::NotFound {
            kind: "TLS configuration",
            path: "listener.tls".into(),
        })?;
        let client_ca = tls.client_ca_path.as_deref().ok_or(TlsError::NotFound {
            kind: "Client CA",
            path: "listener.tls.client_ca_path".into(),
        })?;
        let rustls = load_mutual_tls_config(
            Path::new(&tls.cert_path),
            Path::new(&tls.key_path),
            Path::new(client_ca),
        )?;

        let authorizer = self
            .authorizer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut acceptor = AuthorizingAcceptor::new(RustlsAcceptor::new(rustls), authorizer);
        if let Some(observer) = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            acceptor = acceptor.with_observer(observer);
        }

        self.run_server(token, "mtls", move |listener, router, handle| {
            async move {
                axum_server::from_tcp(listener)
                    .acceptor(acceptor)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
            .boxed()
        })
        .await
    }

    /// Pick the transport from config: no TLS, TLS, or TLS with a client CA.
    pub async fn serve(&self, token: CancellationToken) -> Result<(), LifecycleError> {
        match &self.config.listener.tls {
            None => self.run(token).await,
            Some(tls) if tls.client_ca_path.is_some() => self.run_mutual_tls(token).await,
            Some(_) => self.run_tls(token).await,
        }
    }

    /// Mount the endpoints that must exist before freezing.
    pub(crate) fn mount_builtin_routes(&self) {
        let prefix = self.config.health.prefix.as_str();
        let state = HealthState {
            checks: self.checks.clone(),
            timeout: self.config.health.check_timeout(),
        };

        self.mount(
            Method::GET,
            &format!("{prefix}/healthz"),
            get(handlers::healthz).with_state(state.clone()),
        );
        self.mount(
            Method::GET,
            &format!("{prefix}/readyz"),
            get(handlers::readyz).with_state(state),
        );

        if self.config.admin.reload_endpoint {
            self.mount(
                Method::POST,
                &format!("{prefix}/reload"),
                admin::reload_route(self.reloader.clone(), &self.config.admin.api_key),
            );
        }
    }

    /// Freeze the route table and wrap it in the middleware stack.
    #[allow(deprecated)]
    pub(crate) fn freeze_router(&self) -> Router {
        self.routes
            .freeze()
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.run_state())
            .field("hooks", &self.hooks)
            .field("checks", &self.checks)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_hooks_see_user_routes() {
        let server = Server::new(ServerConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        server.on_route(move |route| s.lock().unwrap().push(route.to_string()));

        server.route(Method::GET, "/users", || async { "users" });
        server.route(Method::DELETE, "/users/{id}", || async { "deleted" });

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["GET /users".to_string(), "DELETE /users/{id}".to_string()]
        );
    }

    #[test]
    fn builtin_routes_respect_prefix_and_admin_flag() {
        let mut config = ServerConfig::default();
        config.health.prefix = "/internal".into();
        config.admin.reload_endpoint = true;
        config.admin.api_key = "k".into();
        let server = Server::new(config);

        server.mount_builtin_routes();
        let paths: Vec<_> = server.routes().into_iter().map(|r| r.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "GET /internal/healthz",
                "GET /internal/readyz",
                "POST /internal/reload"
            ]
        );

        let _ = server.freeze_router();
        assert!(server.frozen());
    }

    #[test]
    fn registration_after_freeze_panics() {
        let server = Server::new(ServerConfig::default());
        let _ = server.freeze_router();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            server.on_start(|_ctx| async { Ok(()) });
        }));
        assert!(result.is_err());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            server.route(Method::GET, "/late", || async { "late" });
        }));
        assert!(result.is_err());
    }
}
