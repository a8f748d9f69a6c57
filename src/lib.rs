//! HTTP server library with an explicit, hook-driven lifecycle.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServerConfig;
pub use http::Server;
pub use lifecycle::{Context, LifecycleError, RunState};
