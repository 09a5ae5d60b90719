//! Operator metrics and the recording interface used by callers.

use std::sync::{Arc, Mutex, PoisonError};

use super::registry::{MetricsRegistry, RegistryError};

pub const STORAGE_RECONFIGURED_TOTAL: &str = "image_registry_operator_storage_reconfigured_total";
pub const IMAGE_PRUNER_INSTALL_STATUS: &str = "image_registry_operator_image_pruner_install_status";
pub const AZURE_KEY_CACHE_HITS_TOTAL: &str = "image_registry_operator_azure_key_cache_hits_total";
pub const AZURE_KEY_CACHE_MISSES_TOTAL: &str =
    "image_registry_operator_azure_key_cache_misses_total";
pub const STORAGE_TYPE: &str = "image_registry_operator_storage_type";

/// Installation state of the automatic image pruner, as exposed by
/// [`IMAGE_PRUNER_INSTALL_STATUS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrunerStatus {
    NotInstalled = 0,
    Suspended = 1,
    Enabled = 2,
}

impl PrunerStatus {
    /// A pruner that is not installed is reported as such even if the
    /// enabled flag is set.
    pub fn from_flags(installed: bool, enabled: bool) -> Self {
        match (installed, enabled) {
            (false, _) => PrunerStatus::NotInstalled,
            (true, false) => PrunerStatus::Suspended,
            (true, true) => PrunerStatus::Enabled,
        }
    }

    pub fn as_gauge_value(self) -> f64 {
        self as i32 as f64
    }
}

/// Trait for recording operator metrics.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Records one storage reconfiguration.
    fn storage_reconfigured(&self);

    /// Records the current installation state of the image pruner.
    fn image_pruner_install_status(&self, installed: bool, enabled: bool);

    /// Records a hit in the azure primary account key cache.
    fn azure_key_cache_hit(&self);

    /// Records a miss in the azure primary account key cache.
    fn azure_key_cache_miss(&self);

    /// Records which storage backend is configured. Only the most recent
    /// type stays exposed.
    fn report_storage_type(&self, storage_type: &str);
}

/// Prometheus-backed operator metrics.
///
/// Cloning is cheap; every clone records into the same registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<MetricsRegistry>,
    /// Storage label currently exposed. Held while the gauge is swapped.
    storage_type: Arc<Mutex<Option<String>>>,
}

impl Metrics {
    /// Creates the operator metrics on a fresh registry.
    pub fn new() -> Result<Self, RegistryError> {
        let registry = MetricsRegistry::builder()
            .counter(
                STORAGE_RECONFIGURED_TOTAL,
                "Total times the image registry storage was reconfigured",
                &[],
            )
            .gauge(
                IMAGE_PRUNER_INSTALL_STATUS,
                "Installation status code related to the automatic image pruning feature. \
                 0 = not installed, 1 = suspended, 2 = enabled",
                &[],
            )
            .counter(
                AZURE_KEY_CACHE_HITS_TOTAL,
                "Total number of hits in the azure primary account key cache",
                &[],
            )
            .counter(
                AZURE_KEY_CACHE_MISSES_TOTAL,
                "Total number of misses in the azure primary account key cache",
                &[],
            )
            .gauge(
                STORAGE_TYPE,
                "Storage backend currently configured for the image registry",
                &["storage"],
            )
            .build()?;

        Ok(Metrics {
            registry: Arc::new(registry),
            storage_type: Arc::new(Mutex::new(None)),
        })
    }

    /// The underlying registry, for generic counter and gauge access.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, RegistryError> {
        self.registry.render()
    }
}

impl MetricsRecorder for Metrics {
    fn storage_reconfigured(&self) {
        self.registry.increment_counter(STORAGE_RECONFIGURED_TOTAL);
    }

    fn image_pruner_install_status(&self, installed: bool, enabled: bool) {
        let status = PrunerStatus::from_flags(installed, enabled);
        self.registry
            .set_gauge(IMAGE_PRUNER_INSTALL_STATUS, &[], status.as_gauge_value());
    }

    fn azure_key_cache_hit(&self) {
        self.registry.increment_counter(AZURE_KEY_CACHE_HITS_TOTAL);
    }

    fn azure_key_cache_miss(&self) {
        self.registry.increment_counter(AZURE_KEY_CACHE_MISSES_TOTAL);
    }

    fn report_storage_type(&self, storage_type: &str) {
        let mut current = self
            .storage_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // The new label goes up before the old one comes down, so a scrape
        // never finds the family empty.
        self.registry
            .set_gauge(STORAGE_TYPE, &[("storage", storage_type)], 1.0);
        if let Some(previous) = current.as_deref() {
            if previous != storage_type {
                self.registry
                    .remove_gauge_labels(STORAGE_TYPE, &[("storage", previous)]);
            }
        }
        *current = Some(storage_type.to_string());
    }
}
