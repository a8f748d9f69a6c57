//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration phase:
//!     server.rs (register hooks, routes, checks, providers)
//!     → routes.rs (route table, route hooks fire per route)
//!
//! Run:
//!     lifecycle::orchestrator mounts health/admin routes
//!     → routes.rs freezes into an axum Router
//!     → axum-server accepts (plain, TLS, or mutual TLS)
//!     → response.rs renders problem bodies for failures
//! ```

pub mod response;
pub mod routes;
pub mod server;

pub use response::Problem;
pub use routes::RouteTable;
pub use server::Server;
