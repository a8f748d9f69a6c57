//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder and scrape endpoint on start
//! - Stop the scrape endpoint on shutdown
//!
//! # Metrics
//! - `lifecycle_hook_failures_total` (counter): failed or panicked hooks by kind
//! - `lifecycle_reloads_total` (counter): reloads by outcome
//! - `lifecycle_health_check_failures_total` (counter): failing probes by check
//! - `lifecycle_connections_rejected_total` (counter): mTLS connections denied
//! - `lifecycle_drain_failures_total` (counter): shutdowns whose drain failed or timed out
//!
//! # Design Decisions
//! - An unconfigured provider starts and stops as a no-op
//! - The recorder is process-global; a second install is a start failure

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::task::JoinHandle;

use crate::config::ObservabilityConfig;
use crate::lifecycle::{hook_error, BoxError, Context};
use crate::observability::Provider;

/// Prometheus exporter tied to the server lifecycle.
#[derive(Debug, Default)]
pub struct PrometheusProvider {
    address: Option<SocketAddr>,
    exporter: Mutex<Option<JoinHandle<()>>>,
}

impl PrometheusProvider {
    pub fn new(address: Option<SocketAddr>) -> Self {
        Self {
            address,
            exporter: Mutex::new(None),
        }
    }

    /// Build from config; disabled metrics yield an inert provider.
    pub fn from_config(config: &ObservabilityConfig) -> Result<Self, BoxError> {
        if !config.metrics_enabled {
            return Ok(Self::new(None));
        }
        let address = config.metrics_address.parse()?;
        Ok(Self::new(Some(address)))
    }

    pub fn is_running(&self) -> bool {
        self.exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn install(&self) -> Result<(), BoxError> {
        let Some(address) = self.address else {
            tracing::debug!("Metrics disabled, skipping exporter");
            return Ok(());
        };

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(address)
            .build()?;
        ::metrics::set_global_recorder(recorder)
            .map_err(|_| hook_error("a global metrics recorder is already installed"))?;

        let task = tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });
        *self.exporter.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        tracing::info!(address = %address, "Metrics endpoint listening");
        Ok(())
    }
}

impl Provider for PrometheusProvider {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn start(&self, _ctx: Context) -> BoxFuture<'_, Result<(), BoxError>> {
        self.install().boxed()
    }

    fn shutdown(&self, _ctx: Context) -> BoxFuture<'_, Result<(), BoxError>> {
        async move {
            let task = self
                .exporter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(task) = task {
                task.abort();
                tracing::debug!("Metrics exporter stopped");
            }
            Ok(())
        }
        .boxed()
    }
}
