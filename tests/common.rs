#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use registry_operator_metrics::config::{Config, ConfigV1};
use registry_operator_metrics::metrics::Metrics;
use registry_operator_metrics::routes::create_router;
use registry_operator_metrics::scrape::ScrapeClient;
use registry_operator_metrics::startup::Server;
use registry_operator_metrics::state::AppState;

pub const TEST_CONFIG: &str = r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "json"
server:
  host: 127.0.0.1
  port: 0
tls:
  type: self-signed
  subject_alt_names:
    - localhost
    - 127.0.0.1
"#;

pub fn load_test_config() -> ConfigV1 {
    let config: Config = Figment::new()
        .merge(Yaml::string(TEST_CONFIG))
        .extract()
        .expect("Failed to parse test config YAML");

    match config {
        Config::ConfigV1(cfg) => cfg,
    }
}

pub fn build_app(metrics: Metrics) -> Router {
    create_router(AppState { metrics })
}

/// Binds a TLS server on an ephemeral port and serves it in the background.
pub async fn spawn_server(config: &ConfigV1, metrics: Metrics) -> SocketAddr {
    let server = Server::bind(config, metrics)
        .await
        .expect("server should bind");
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    addr
}

pub fn metrics_url(addr: SocketAddr) -> String {
    format!("https://{}/metrics", addr)
}

pub fn insecure_client(addr: SocketAddr) -> ScrapeClient {
    ScrapeClient::new(metrics_url(addr), true).expect("client should build")
}
