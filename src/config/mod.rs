//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! On reload (SIGHUP, admin endpoint, or watcher.rs detecting a change):
//!     ReloadCoordinator → reload hooks
//!     → hooks typically call loader.rs and swap their own Arc'd state
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes flow through reload hooks
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, HealthConfig, LifecycleConfig, ListenerConfig, ObservabilityConfig, ServerConfig,
    TimeoutConfig, TlsConfig,
};
pub use watcher::{reload_on_change, ConfigWatcher};
