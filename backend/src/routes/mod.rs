//! Route definitions
//!
//! Only operational probes are served; ledger operations are called through
//! the library.

use axum::{routing::get, Router};

use crate::{handlers, AppState};

pub fn probe_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
}
