//! Named liveness/readiness checks and the concurrent runner.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::mpsc;

use crate::lifecycle::{BoxError, Context};

/// A health check body.
pub type CheckFn = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Which probe a check answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Liveness,
    Readiness,
}

impl Probe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Probe::Liveness => "liveness",
            Probe::Readiness => "readiness",
        }
    }
}

/// Registered checks, keyed by name per probe.
#[derive(Default)]
pub struct HealthChecks {
    liveness: Mutex<BTreeMap<String, CheckFn>>,
    readiness: Mutex<BTreeMap<String, CheckFn>>,
}

impl HealthChecks {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, probe: Probe) -> &Mutex<BTreeMap<String, CheckFn>> {
        match probe {
            Probe::Liveness => &self.liveness,
            Probe::Readiness => &self.readiness,
        }
    }

    /// Add (or replace) the check `name` for `probe`.
    pub fn add<F, Fut>(&self, probe: Probe, name: impl Into<String>, check: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let check: CheckFn = Arc::new(move |ctx| check(ctx).boxed());
        self.set(probe)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), check);
    }

    /// Copy of the checks for `probe`, taken under the lock.
    pub fn snapshot(&self, probe: Probe) -> BTreeMap<String, CheckFn> {
        self.set(probe)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self, probe: Probe) -> usize {
        self.set(probe)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for HealthChecks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecks")
            .field("liveness", &self.len(Probe::Liveness))
            .field("readiness", &self.len(Probe::Readiness))
            .finish()
    }
}

/// Run every check concurrently and return the failures by name.
///
/// Each check gets its own `timeout`-bounded child of `ctx`. The call returns
/// once every check has finished or timed out. An empty result means healthy.
pub async fn run_checks(
    ctx: &Context,
    checks: BTreeMap<String, CheckFn>,
    timeout: Duration,
) -> BTreeMap<String, String> {
    let mut failures = BTreeMap::new();
    if checks.is_empty() {
        return failures;
    }

    let expected = checks.len();
    let (tx, mut rx) = mpsc::channel(expected);

    for (name, check) in checks {
        let tx = tx.clone();
        let check_ctx = ctx.with_timeout(timeout);
        tokio::spawn(async move {
            let body_ctx = check_ctx.clone();
            let body = AssertUnwindSafe(async move { check(body_ctx).await }).catch_unwind();
            let failure = match check_ctx.run(body).await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.to_string()),
                Ok(Err(_panic)) => Some("check panicked".to_string()),
                Err(e) => Some(e.to_string()),
            };
            let _ = tx.send((name, failure)).await;
        });
    }
    drop(tx);

    for _ in 0..expected {
        let Some((name, failure)) = rx.recv().await else {
            break;
        };
        if let Some(reason) = failure {
            failures.insert(name, reason);
        }
    }
    failures
}
