//! Client side of the exporter: fetch a metrics endpoint and decode it.

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::exposition::{decode, find_family, DecodeError, MetricFamily};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("could not decode exposition body: {0}")]
    Decode(#[from] DecodeError),
}

/// Scrapes one metrics URL.
#[derive(Clone)]
pub struct ScrapeClient {
    client: reqwest::Client,
    url: String,
}

impl ScrapeClient {
    /// Builds a client for `url`. With `accept_invalid_certs` the server
    /// certificate is not verified, which is what self-signed endpoints need.
    pub fn new(url: impl Into<String>, accept_invalid_certs: bool) -> Result<Self, ScrapeError> {
        crate::tls::install_crypto_provider();
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(ScrapeClient {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the endpoint and decodes every family it exposes.
    pub async fn scrape(&self) -> Result<Vec<MetricFamily>, ScrapeError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status));
        }
        let body = response.text().await?;
        let families = decode(&body)?;
        debug!(url = %self.url, families = families.len(), "Scraped metrics");
        Ok(families)
    }

    /// Fetches the endpoint and returns the family called `name`, if exposed.
    pub async fn find(&self, name: &str) -> Result<Option<MetricFamily>, ScrapeError> {
        let families = self.scrape().await?;
        Ok(find_family(&families, name).cloned())
    }
}
