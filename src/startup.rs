//! Application startup and server initialization.
//!
//! The server has two phases. [`Server::bind`] is the starting phase: it
//! prepares the certificate and claims the listening socket, and any failure
//! there is returned to the caller. [`Server::serve`] is the serving phase and
//! accepts connections until the process exits.

use std::net::{SocketAddr, TcpListener};

use axum::Router;
use axum_server::tls_rustls::{from_tcp_rustls, RustlsConfig};
use tracing::info;

use crate::config::ConfigV1;
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::routes;
use crate::state::AppState;
use crate::tls::TlsMaterial;

/// A bound, TLS-ready metrics server that has not started accepting yet.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: RustlsConfig,
    app: Router,
}

impl Server {
    /// Prepares TLS and binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tls`] if the certificate cannot be loaded or
    /// generated, and [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(config: &ConfigV1, metrics: Metrics) -> Result<Self, ServerError> {
        info!(state = "starting", "Preparing metrics server");

        let tls = TlsMaterial::from_config(&config.tls)
            .await?
            .into_rustls_config()
            .await?;

        let address = config.server.bind_address();
        let bind_error = |source: std::io::Error| ServerError::Bind {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind(&address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let app = routes::create_router(AppState { metrics });

        Ok(Server {
            listener,
            local_addr,
            tls,
            app,
        })
    }

    /// The address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts TLS connections and handles each one concurrently.
    ///
    /// Only returns if the accept loop itself fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        info!(
            state = "serving",
            address = %self.local_addr,
            path = routes::METRICS_PATH,
            "Metrics server listening"
        );

        from_tcp_rustls(self.listener, self.tls)
            .serve(self.app.into_make_service())
            .await
            .map_err(ServerError::Serve)
    }
}
