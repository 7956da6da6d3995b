//! deskbroker-api: HTTP gateway for the session broker.
//!
//! Provides axum route handlers that translate JSON requests into
//! scheduler calls. Handlers hold no state of their own.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness check |
//! | POST | `/assign` | Get or create a user's server assignment |
//! | POST | `/release` | Drop a user's assignment |
//! | GET | `/metrics` | Per-node health and load |
//! | GET | `/sessions` | All live assignments |
//! | GET | `/metrics/prometheus` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use deskbroker_scheduler::Scheduler;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
}

/// Build the complete gateway router.
pub fn build_router(scheduler: Arc<Scheduler>) -> Router {
    let state = ApiState { scheduler };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/assign", post(handlers::assign))
        .route("/release", post(handlers::release))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/sessions", get(handlers::sessions))
        .with_state(state)
}
