//! Metrics collection and exposition for Prometheus.
//!
//! `registry` holds the generic counter/gauge table, `recorder` the named
//! operator instruments built on top of it.

mod recorder;
mod registry;

pub use recorder::{
    Metrics, MetricsRecorder, PrunerStatus, AZURE_KEY_CACHE_HITS_TOTAL,
    AZURE_KEY_CACHE_MISSES_TOTAL, IMAGE_PRUNER_INSTALL_STATUS, STORAGE_RECONFIGURED_TOTAL,
    STORAGE_TYPE,
};
pub use registry::{MetricsRegistry, MetricsRegistryBuilder, RegistryError};
