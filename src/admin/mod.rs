//! Admin endpoints.
//!
//! - `POST <prefix>/reload` → run the reload hooks through the shared coordinator
//!
//! Guarded by a bearer API key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{post, MethodRouter};

use crate::lifecycle::ReloadCoordinator;

use self::auth::{admin_auth_middleware, ApiKey};
use self::handlers::post_reload;

/// The reload endpoint, ready to mount in the route table.
pub fn reload_route(coordinator: Arc<ReloadCoordinator>, api_key: &str) -> MethodRouter {
    post(post_reload)
        .with_state(coordinator)
        .layer(middleware::from_fn_with_state(
            ApiKey::new(api_key),
            admin_auth_middleware,
        ))
}
