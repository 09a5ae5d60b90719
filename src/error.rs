//! Failures that stop the exporter from serving.

use thiserror::Error;

use crate::tls::TlsError;

/// Fatal errors raised while starting or running the metrics server.
///
/// None of these are retried; the caller is expected to report them and
/// exit.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("could not bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
}
