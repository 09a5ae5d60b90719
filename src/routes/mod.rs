//! HTTP route definitions and handlers.
//!
//! Only the metrics exposition endpoint is served; any other path falls
//! through to axum's default 404.

mod metrics;

use crate::state::AppState;
use axum::Router;

pub use metrics::{EXPOSITION_CONTENT_TYPE, METRICS_PATH};

/// Creates the application router with all configured routes.
pub fn create_router(state: AppState) -> Router {
    Router::new().merge(metrics::routes()).with_state(state)
}
