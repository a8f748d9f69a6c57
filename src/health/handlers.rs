//! Probe endpoints.
//!
//! - `GET <prefix>/healthz` → `200 ok`, or `503` problem
//! - `GET <prefix>/readyz`  → `204`, or `503` problem
//!
//! Both responses carry `Cache-Control: no-store`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::health::checks::{run_checks, HealthChecks, Probe};
use crate::http::response::Problem;
use crate::lifecycle::Context;

/// State shared by the probe handlers.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub checks: Arc<HealthChecks>,
    pub timeout: Duration,
}

pub async fn healthz(State(state): State<HealthState>) -> Response {
    probe(&state, Probe::Liveness, (StatusCode::OK, "ok").into_response()).await
}

pub async fn readyz(State(state): State<HealthState>) -> Response {
    probe(&state, Probe::Readiness, StatusCode::NO_CONTENT.into_response()).await
}

async fn probe(state: &HealthState, probe: Probe, healthy: Response) -> Response {
    let checks = state.checks.snapshot(probe);
    let failures = run_checks(&Context::background(), checks, state.timeout).await;

    let mut response = if failures.is_empty() {
        healthy
    } else {
        for (check, reason) in &failures {
            metrics::counter!(
                "lifecycle_health_check_failures_total",
                "probe" => probe.as_str(),
                "check" => check.clone()
            )
            .increment(1);
            tracing::warn!(probe = probe.as_str(), check = %check, reason = %reason, "Health check failed");
        }
        Problem::new(StatusCode::SERVICE_UNAVAILABLE)
            .with_detail(format!("{} check(s) failed", failures.len()))
            .with_checks(failures)
            .into_response()
    };

    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
