//! Library exports for the registry operator metrics exporter, shared between
//! the binary and tests.

pub mod config;
pub mod error;
pub mod exposition;
pub mod metrics;
pub mod routes;
pub mod scrape;
pub mod startup;
pub mod state;
pub mod tls;
pub mod utils;
