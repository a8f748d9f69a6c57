use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::response::Problem;
use crate::lifecycle::{Context, ReloadCoordinator};

#[derive(Serialize)]
pub struct ReloadStatus {
    pub status: &'static str,
}

/// Trigger a reload. Waits for any in-flight reload first.
pub async fn post_reload(State(coordinator): State<Arc<ReloadCoordinator>>) -> Response {
    match coordinator.reload(&Context::background()).await {
        Ok(()) => Json(ReloadStatus { status: "reloaded" }).into_response(),
        Err(e) => Problem::new(StatusCode::INTERNAL_SERVER_ERROR)
            .with_detail(e.to_string())
            .into_response(),
    }
}
