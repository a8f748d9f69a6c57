//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listener config
//!     → listener.rs (bind, after start hooks succeed)
//!     → tls.rs (optional TLS / mutual-TLS configuration)
//!     → connection.rs (mTLS only: authorize peer certificate per connection)
//!     → Hand off to the HTTP server
//! ```
//!
//! # Design Decisions
//! - Bind errors are fatal before serving
//! - TLS is optional and handled transparently by axum-server
//! - Connection authorization composes with an existing observer

pub mod connection;
pub mod listener;
pub mod tls;
