//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Surface bind failures as fatal-before-serving errors (bound only after start hooks succeed)
//! - Hand the bound socket to the server in non-blocking mode

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The configured address does not parse.
    #[error("invalid bind address `{address}`: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    /// Failed to convert the socket for serving.
    #[error("failed to prepare listener: {0}")]
    Socket(#[source] std::io::Error),
}

/// A bound TCP listener, not yet accepting.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address: SocketAddr =
            config
                .bind_address
                .parse()
                .map_err(|source| ListenerError::Address {
                    address: config.bind_address.clone(),
                    source,
                })?;
        Self::bind_addr(address).await
    }

    /// Bind to `address` directly.
    pub async fn bind_addr(address: SocketAddr) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;
        let local_addr = inner.local_addr().map_err(ListenerError::Socket)?;

        tracing::info!(address = %local_addr, "Listener bound");
        Ok(Self { inner, local_addr })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Convert into the std socket the HTTP server accepts on.
    pub(crate) fn into_std(self) -> Result<std::net::TcpListener, ListenerError> {
        let listener = self.inner.into_std().map_err(ListenerError::Socket)?;
        listener.set_nonblocking(true).map_err(ListenerError::Socket)?;
        Ok(listener)
    }
}
