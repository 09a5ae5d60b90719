//! Metrics exposition endpoint.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error};

pub const METRICS_PATH: &str = "/metrics";

/// Content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Creates the metrics route.
pub fn routes() -> Router<AppState> {
    Router::new().route(METRICS_PATH, get(metrics_handler))
}

/// Handler for the /metrics endpoint.
///
/// Returns all registered families in Prometheus text format. Each sample is
/// read atomically; samples are not read as one consistent set.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(metrics_text) => {
            debug!(bytes = metrics_text.len(), "Serving metrics scrape");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
                metrics_text,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}
