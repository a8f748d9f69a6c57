//! Route table.
//!
//! # Responsibilities
//! - Accumulate routes during configuration
//! - Record a descriptor per route for introspection
//! - Freeze into the `axum::Router` that will be served
//!
//! # Design Decisions
//! - Adding a route after freeze is a programming error and panics
//! - `freeze` is idempotent and shares its flag with the hook registry

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;

use crate::lifecycle::{FreezeFlag, RouteDescriptor};

struct Table {
    router: Router,
    routes: Vec<RouteDescriptor>,
}

/// Mutable-until-frozen set of routes.
pub struct RouteTable {
    table: Mutex<Table>,
    frozen: FreezeFlag,
}

impl RouteTable {
    pub fn new(frozen: FreezeFlag) -> Self {
        Self {
            table: Mutex::new(Table {
                router: Router::new(),
                routes: Vec::new(),
            }),
            frozen,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount `handler` at `path`, restricted to `method`.
    ///
    /// # Panics
    /// If the table is frozen or `method` has no axum filter.
    pub fn add(&self, method: Method, path: &str, handler: MethodRouter) -> RouteDescriptor {
        let filter = MethodFilter::try_from(method.clone())
            .unwrap_or_else(|_| panic!("unsupported route method {method}"));

        let mut table = self.lock();
        if self.frozen.is_frozen() {
            drop(table);
            panic!("cannot add route {method} {path}: route table is frozen");
        }

        let descriptor = RouteDescriptor {
            method,
            path: path.to_string(),
        };
        let router = std::mem::take(&mut table.router);
        table.router = router.route(path, MethodRouter::new().on_service(filter, handler));
        table.routes.push(descriptor.clone());

        tracing::debug!(route = %descriptor, "Route added");
        descriptor
    }

    /// Every route added so far, in insertion order.
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.lock().routes.clone()
    }

    pub fn frozen(&self) -> bool {
        self.frozen.is_frozen()
    }

    /// End configuration and return the router to serve.
    pub fn freeze(&self) -> Router {
        let table = self.lock();
        self.frozen.freeze();
        table.router.clone()
    }
}
