//! Server run state machine.
//!
//! # States
//! ```text
//! Configuring → Starting → Serving → ShuttingDown → Stopped
//!                   └──────── (startup failure) ───────┘
//! ```
//!
//! # Sequence
//! 1. Start observability providers, then start hooks (fatal on error)
//! 2. Mount built-in endpoints and freeze the route table
//! 3. Bind the listener and spawn the accept loop
//! 4. Once accepting: `Serving`, spawn ready hooks, install SIGHUP reload
//! 5. Wait for cancellation or a fatal listener error
//! 6. Shutdown phase with a fresh deadline (see `shutdown.rs`)
//!
//! # Design Decisions
//! - No transition is reversible; a server runs at most once
//! - A listener failure while serving still runs the full shutdown phase

use std::fmt;
use std::io;

use axum::Router;
use axum_server::Handle;
use futures_util::future::BoxFuture;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::http::Server;
use crate::lifecycle::context::Context;
use crate::lifecycle::shutdown::{run_shutdown, DrainError};
use crate::lifecycle::signals::spawn_hangup_reload;
use crate::lifecycle::startup::run_startup;
use crate::lifecycle::LifecycleError;
use crate::net::listener::Listener;

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Configuring,
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Configuring => "configuring",
            RunState::Starting => "starting",
            RunState::Serving => "serving",
            RunState::ShuttingDown => "shutting_down",
            RunState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type ServeResult = Result<io::Result<()>, JoinError>;

impl Server {
    fn advance(&self, next: RunState) {
        let moved = self.state.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(state = %next, "Lifecycle state changed");
        }
    }

    /// Drive the server from `Configuring` to `Stopped`.
    ///
    /// `serve` runs the accept loop for one transport on the bound socket.
    pub(crate) async fn run_server<S>(
        &self,
        token: CancellationToken,
        protocol: &'static str,
        serve: S,
    ) -> Result<(), LifecycleError>
    where
        S: FnOnce(std::net::TcpListener, Router, Handle) -> BoxFuture<'static, io::Result<()>> + Send,
    {
        let started = self.state.send_if_modified(|state| {
            if *state == RunState::Configuring {
                *state = RunState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(LifecycleError::AlreadyStarted);
        }
        tracing::info!(protocol, state = %RunState::Starting, "Lifecycle state changed");

        let ctx = Context::from_token(token.clone());
        let providers = self.providers();

        if let Err(e) = run_startup(&ctx, &providers, &self.hooks).await {
            tracing::error!(error = %e, "Startup failed, listener not opened");
            self.advance(RunState::Stopped);
            return Err(e);
        }

        self.mount_builtin_routes();
        let router = self.freeze_router();

        let socket = match Listener::bind(&self.config.listener)
            .await
            .and_then(|listener| {
                let _ = self.local_addr.set(listener.local_addr());
                listener.into_std()
            }) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open listener");
                self.advance(RunState::Stopped);
                return Err(e.into());
            }
        };

        let handle = Handle::new();
        let mut server: JoinHandle<io::Result<()>> =
            tokio::spawn(serve(socket, router, handle.clone()));

        // Owned by the serving phase; cancelled as soon as shutdown begins.
        let serving = token.child_token();
        let mut fatal = None;

        let bound = tokio::select! {
            addr = handle.listening() => addr,
            result = &mut server => {
                fatal = Some(serve_failure(result));
                None
            }
        };

        match bound {
            Some(address) => {
                self.advance(RunState::Serving);
                tracing::info!(address = %address, protocol, "Accepting connections");

                let _hangup = if self.config.lifecycle.reload_on_hangup {
                    spawn_hangup_reload(self.reloader.clone(), serving.clone())
                } else {
                    None
                };
                self.hooks.run_ready();

                tokio::select! {
                    result = &mut server => {
                        let e = serve_failure(result);
                        tracing::error!(error = %e, "Listener failed while serving");
                        fatal = Some(e);
                    }
                    _ = token.cancelled() => {
                        tracing::info!("Shutdown requested");
                    }
                }
            }
            None if fatal.is_none() => {
                fatal = Some(serve_failure((&mut server).await));
            }
            None => {}
        }

        self.advance(RunState::ShuttingDown);
        serving.cancel();

        let server_done = fatal.is_some();
        let drain = move |ctx: Context| async move {
            if server_done {
                return Ok(());
            }
            handle.graceful_shutdown(ctx.remaining());
            match ctx.run(&mut server).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(DrainError::Server(e.to_string())),
                Ok(Err(e)) => Err(DrainError::Server(e.to_string())),
                Err(_) => {
                    let open_connections = handle.connection_count();
                    server.abort();
                    Err(DrainError::DeadlineExceeded { open_connections })
                }
            }
        };

        run_shutdown(
            &self.hooks,
            &providers,
            self.config.lifecycle.shutdown_timeout(),
            drain,
        )
        .await;

        self.advance(RunState::Stopped);
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn serve_failure(result: ServeResult) -> LifecycleError {
    match result {
        Ok(Err(e)) => LifecycleError::Serve(e),
        Ok(Ok(())) => LifecycleError::Serve(io::Error::other("accept loop exited unexpectedly")),
        Err(e) => LifecycleError::Serve(io::Error::other(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use futures_util::FutureExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn loopback_server() -> Server {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.lifecycle.reload_on_hangup = false;
        config.lifecycle.shutdown_timeout_secs = 2;
        Server::new(config)
    }

    #[tokio::test]
    async fn listener_failure_while_serving_still_shuts_down() {
        let server = loopback_server();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        server.on_shutdown(move |_ctx| {
            let e = e.clone();
            async move { e.lock().unwrap().push("shutdown") }
        });
        let e = events.clone();
        server.on_stop(move || e.lock().unwrap().push("stop"));

        let result = server
            .run_server(CancellationToken::new(), "http", |listener, router, handle| {
                async move {
                    let accept = axum_server::from_tcp(listener)
                        .handle(handle.clone())
                        .serve(router.into_make_service());
                    tokio::select! {
                        result = accept => result,
                        _ = async {
                            handle.listening().await;
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        } => Err(io::Error::other("accept failed: too many open files")),
                    }
                }
                .boxed()
            })
            .await;

        assert!(matches!(result, Err(LifecycleError::Serve(_))), "{result:?}");
        assert_eq!(*events.lock().unwrap(), vec!["shutdown", "stop"]);
        assert_eq!(server.run_state(), RunState::Stopped);
        assert!(server.local_addr().is_some());
    }

    #[test]
    fn states_are_ordered() {
        assert!(RunState::Configuring < RunState::Starting);
        assert!(RunState::Starting < RunState::Serving);
        assert!(RunState::Serving < RunState::ShuttingDown);
        assert!(RunState::ShuttingDown < RunState::Stopped);
        assert_eq!(RunState::ShuttingDown.to_string(), "shutting_down");
    }
}
