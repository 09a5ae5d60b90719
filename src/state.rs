//! Shared application state.

use crate::metrics::Metrics;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; the metrics registry behind it is shared.
#[derive(Clone)]
pub struct AppState {
    /// Operator metrics rendered by the exposition endpoint.
    pub metrics: Metrics,
}
