//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET <prefix>/healthz | <prefix>/readyz
//!     → handlers.rs (snapshot the probe's checks)
//!     → checks.rs (run all checks concurrently, each with its own timeout)
//!     → 200 "ok" / 204, or 503 problem listing failing checks
//! ```
//!
//! # Design Decisions
//! - No checks registered means healthy
//! - Every check runs to completion or timeout; no early exit on first failure
//! - One slow check cannot eat another check's budget

pub mod checks;
pub mod handlers;

pub use checks::{run_checks, CheckFn, HealthChecks, Probe};
pub use handlers::HealthState;
