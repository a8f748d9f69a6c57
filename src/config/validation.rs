//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check cross-field consistency (admin endpoint needs a key)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("health.prefix `{0}` must be empty or start with `/` and not end with `/`")]
    InvalidPrefix(String),
    #[error("admin.api_key must be set when admin.reload_endpoint is enabled")]
    MissingApiKey,
    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },
}

/// Validate `config`, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyPath {
                field: "listener.tls.cert_path",
            });
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyPath {
                field: "listener.tls.key_path",
            });
        }
        if tls.client_ca_path.as_deref() == Some("") {
            errors.push(ValidationError::EmptyPath {
                field: "listener.tls.client_ca_path",
            });
        }
    }

    if config.lifecycle.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "lifecycle.shutdown_timeout_secs",
        });
    }
    if config.health.check_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "health.check_timeout_ms",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "timeouts.request_secs",
        });
    }

    let prefix = &config.health.prefix;
    if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    if config.admin.reload_endpoint && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
