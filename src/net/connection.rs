//! Per-connection authorization for the mutual-TLS variant.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - After the TLS handshake and before any request is read, map the peer
//!   certificate to a principal and drop connections that are not allowed
//! - Forward every decision to a previously-installed observer, if any
//!
//! # Design Decisions
//! - Authorization is opt-in: no authorizer, or no peer certificate, allows
//! - Rejection drops the TLS stream, so the connection closes unrouted

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use futures_util::future::BoxFuture;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of consulting an authorizer about a peer certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow { principal: String },
    Deny,
}

/// Maps a verified peer certificate to an identity decision.
pub trait Authorize: Send + Sync + 'static {
    fn authorize(&self, cert: &CertificateDer<'_>) -> Authorization;
}

impl<F> Authorize for F
where
    F: Fn(&CertificateDer<'_>) -> Authorization + Send + Sync + 'static,
{
    fn authorize(&self, cert: &CertificateDer<'_>) -> Authorization {
        self(cert)
    }
}

/// What the acceptor decided for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub id: ConnectionId,
    pub principal: Option<String>,
    pub allowed: bool,
}

/// Observer invoked after every authorization decision.
pub type ConnectionObserver = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Decide whether a connection with `peer_certs` may proceed.
///
/// Only the leaf certificate is presented to the authorizer.
pub fn authorize_peer(
    authorizer: Option<&dyn Authorize>,
    peer_certs: Option<&[CertificateDer<'static>]>,
) -> Authorization {
    let Some(authorizer) = authorizer else {
        return Authorization::Allow {
            principal: String::new(),
        };
    };
    match peer_certs.and_then(|chain| chain.first()) {
        Some(leaf) => authorizer.authorize(leaf),
        None => Authorization::Allow {
            principal: String::new(),
        },
    }
}

/// TLS acceptor that authorizes each connection after the handshake.
#[derive(Clone)]
pub struct AuthorizingAcceptor {
    inner: RustlsAcceptor,
    authorizer: Option<Arc<dyn Authorize>>,
    observer: Option<ConnectionObserver>,
}

impl AuthorizingAcceptor {
    pub fn new(inner: RustlsAcceptor, authorizer: Option<Arc<dyn Authorize>>) -> Self {
        Self {
            inner,
            authorizer,
            observer: None,
        }
    }

    /// Chain an existing observer; it still sees every connection.
    pub fn with_observer(mut self, observer: ConnectionObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for AuthorizingAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizingAcceptor")
            .field("authorizer", &self.authorizer.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl<I, S> Accept<I, S> for AuthorizingAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = S;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let tls = self.inner.clone();
        let authorizer = self.authorizer.clone();
        let observer = self.observer.clone();

        Box::pin(async move {
            let (stream, service) = tls.accept(stream, service).await?;
            let id = ConnectionId::new();

            let (_, session) = stream.get_ref();
            let decision = authorize_peer(authorizer.as_deref(), session.peer_certificates());

            let event = match decision {
                Authorization::Allow { principal } => ConnectionEvent {
                    id,
                    principal: (!principal.is_empty()).then_some(principal),
                    allowed: true,
                },
                Authorization::Deny => ConnectionEvent {
                    id,
                    principal: None,
                    allowed: false,
                },
            };

            if let Some(observer) = &observer {
                observer(&event);
            }

            if !event.allowed {
                metrics::counter!("lifecycle_connections_rejected_total").increment(1);
                tracing::warn!(connection_id = %id, "Peer certificate not authorized, closing connection");
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "peer certificate not authorized",
                ));
            }

            tracing::debug!(
                connection_id = %id,
                principal = event.principal.as_deref().unwrap_or("-"),
                "Connection authorized"
            );
            Ok((stream, service))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(bytes: &[u8]) -> CertificateDer<'static> {
        CertificateDer::from(bytes.to_vec())
    }

    fn only_alice(cert: &CertificateDer<'_>) -> Authorization {
        if &cert[..] == b"alice" {
            Authorization::Allow {
                principal: "alice".into(),
            }
        } else {
            Authorization::Deny
        }
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn no_authorizer_allows() {
        let chain = [cert(b"mallory")];
        assert!(matches!(
            authorize_peer(None, Some(&chain[..])),
            Authorization::Allow { .. }
        ));
    }

    #[test]
    fn no_peer_certificate_allows() {
        let authorizer: &dyn Authorize = &only_alice;
        assert!(matches!(
            authorize_peer(Some(authorizer), None),
            Authorization::Allow { .. }
        ));
        assert!(matches!(
            authorize_peer(Some(authorizer), Some(&[][..])),
            Authorization::Allow { .. }
        ));
    }

    #[test]
    fn leaf_certificate_decides() {
        let authorizer: &dyn Authorize = &only_alice;

        let alice = [cert(b"alice"), cert(b"intermediate")];
        assert_eq!(
            authorize_peer(Some(authorizer), Some(&alice[..])),
            Authorization::Allow {
                principal: "alice".into()
            }
        );

        let mallory = [cert(b"mallory"), cert(b"alice")];
        assert_eq!(
            authorize_peer(Some(authorizer), Some(&mallory[..])),
            Authorization::Deny
        );
    }
}
