//! Named counter and gauge instruments backed by a Prometheus registry.
//!
//! Instruments are declared up front through [`MetricsRegistryBuilder`] and
//! the resulting table never changes afterwards, so lookups need no lock.
//! Every sample is an atomic Prometheus value, which makes increments and
//! sets safe to call from any number of tasks at once.

use std::collections::HashMap;

use prometheus::core::Collector;
use prometheus::proto::{LabelPair, Metric};
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::error;

/// Errors raised while declaring instruments or encoding the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("metric '{0}' is already registered")]
    Duplicate(String),

    #[error("failed to register metric '{name}': {source}")]
    Invalid {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),

    #[error("metrics encoding produced invalid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
}

struct Declaration {
    kind: Kind,
    name: String,
    help: String,
    label_names: Vec<String>,
}

enum Instrument {
    Counter(Counter),
    LabelledCounter(CounterVec),
    Gauge(Gauge),
    LabelledGauge(GaugeVec),
}

impl Instrument {
    fn from_declaration(decl: &Declaration) -> Result<Self, prometheus::Error> {
        let opts = Opts::new(decl.name.clone(), decl.help.clone());
        let label_names: Vec<&str> = decl.label_names.iter().map(String::as_str).collect();

        let instrument = match (decl.kind, label_names.is_empty()) {
            (Kind::Counter, true) => Instrument::Counter(Counter::with_opts(opts)?),
            (Kind::Counter, false) => {
                Instrument::LabelledCounter(CounterVec::new(opts, &label_names)?)
            }
            (Kind::Gauge, true) => Instrument::Gauge(Gauge::with_opts(opts)?),
            (Kind::Gauge, false) => Instrument::LabelledGauge(GaugeVec::new(opts, &label_names)?),
        };
        Ok(instrument)
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Instrument::Counter(c) => Box::new(c.clone()),
            Instrument::LabelledCounter(c) => Box::new(c.clone()),
            Instrument::Gauge(g) => Box::new(g.clone()),
            Instrument::LabelledGauge(g) => Box::new(g.clone()),
        }
    }
}

/// Collects instrument declarations before the registry is frozen.
#[derive(Default)]
pub struct MetricsRegistryBuilder {
    declarations: Vec<Declaration>,
}

impl MetricsRegistryBuilder {
    /// Declares a counter. An empty `label_names` slice makes a single-sample
    /// counter that is exposed as `0` right away.
    pub fn counter(mut self, name: &str, help: &str, label_names: &[&str]) -> Self {
        self.declarations.push(Declaration {
            kind: Kind::Counter,
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        });
        self
    }

    /// Declares a gauge. See [`MetricsRegistryBuilder::counter`] for labels.
    pub fn gauge(mut self, name: &str, help: &str, label_names: &[&str]) -> Self {
        self.declarations.push(Declaration {
            kind: Kind::Gauge,
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        });
        self
    }

    /// Registers every declared instrument.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicate name, or on a metric or label name that
    /// Prometheus rejects.
    pub fn build(self) -> Result<MetricsRegistry, RegistryError> {
        let registry = Registry::new();
        let mut instruments = HashMap::with_capacity(self.declarations.len());

        for decl in &self.declarations {
            if instruments.contains_key(&decl.name) {
                return Err(RegistryError::Duplicate(decl.name.clone()));
            }
            let invalid = |source: prometheus::Error| RegistryError::Invalid {
                name: decl.name.clone(),
                source,
            };
            let instrument = Instrument::from_declaration(decl).map_err(invalid)?;
            registry.register(instrument.collector()).map_err(invalid)?;
            instruments.insert(decl.name.clone(), instrument);
        }

        Ok(MetricsRegistry {
            registry,
            instruments,
        })
    }
}

/// A frozen set of named instruments.
pub struct MetricsRegistry {
    registry: Registry,
    instruments: HashMap<String, Instrument>,
}

impl MetricsRegistry {
    pub fn builder() -> MetricsRegistryBuilder {
        MetricsRegistryBuilder::default()
    }

    /// Increments an unlabelled counter by one.
    pub fn increment_counter(&self, name: &str) {
        self.increment_counter_with(name, &[]);
    }

    /// Increments the counter sample identified by `name` and `labels`.
    ///
    /// Unknown names and mismatched labels are programming errors; they are
    /// logged and the call is otherwise a no-op.
    pub fn increment_counter_with(&self, name: &str, labels: &[(&str, &str)]) {
        match (self.instruments.get(name), labels.is_empty()) {
            (Some(Instrument::Counter(counter)), true) => counter.inc(),
            (Some(Instrument::LabelledCounter(vec)), false) => {
                match vec.get_metric_with(&label_map(labels)) {
                    Ok(counter) => counter.inc(),
                    Err(e) => error!(metric = name, error = %e, "Rejected counter labels"),
                }
            }
            _ => error!(
                metric = name,
                labels = ?labels,
                "No counter registered under this name and label shape"
            ),
        }
    }

    /// Sets the gauge sample identified by `name` and `labels`, overwriting
    /// any previous value.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        match (self.instruments.get(name), labels.is_empty()) {
            (Some(Instrument::Gauge(gauge)), true) => gauge.set(value),
            (Some(Instrument::LabelledGauge(vec)), false) => {
                match vec.get_metric_with(&label_map(labels)) {
                    Ok(gauge) => gauge.set(value),
                    Err(e) => error!(metric = name, error = %e, "Rejected gauge labels"),
                }
            }
            _ => error!(
                metric = name,
                labels = ?labels,
                "No gauge registered under this name and label shape"
            ),
        }
    }

    /// Drops every label combination of a labelled gauge. An unlabelled gauge
    /// goes back to zero.
    pub fn reset_gauge(&self, name: &str) {
        match self.instruments.get(name) {
            Some(Instrument::LabelledGauge(vec)) => vec.reset(),
            Some(Instrument::Gauge(gauge)) => gauge.set(0.0),
            _ => error!(metric = name, "No gauge registered under this name"),
        }
    }

    /// Drops one label combination of a labelled gauge, leaving the others
    /// exposed.
    pub fn remove_gauge_labels(&self, name: &str, labels: &[(&str, &str)]) {
        match self.instruments.get(name) {
            Some(Instrument::LabelledGauge(vec)) => {
                if let Err(e) = vec.remove(&label_map(labels)) {
                    error!(
                        metric = name,
                        labels = ?labels,
                        error = %e,
                        "Failed to remove gauge labels"
                    );
                }
            }
            _ => error!(metric = name, "No labelled gauge registered under this name"),
        }
    }

    /// Current value of one counter sample, or `None` if it is not exposed.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.instruments.get(name)? {
            Instrument::Counter(counter) if labels.is_empty() => Some(counter.get()),
            Instrument::LabelledCounter(_) => self
                .sample(name, labels)
                .map(|m| m.get_counter().get_value()),
            _ => None,
        }
    }

    /// Current value of one gauge sample, or `None` if it is not exposed.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.instruments.get(name)? {
            Instrument::Gauge(gauge) if labels.is_empty() => Some(gauge.get()),
            Instrument::LabelledGauge(_) => {
                self.sample(name, labels).map(|m| m.get_gauge().get_value())
            }
            _ => None,
        }
    }

    /// Names of all registered instruments, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.instruments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Renders all families in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(RegistryError::Encode)?;
        Ok(String::from_utf8(buffer)?)
    }

    // Labelled vectors only expose children that were touched, so point reads
    // go through a gather instead of creating the child.
    fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<Metric> {
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|metric| labels_match(metric.get_label(), labels))
            .cloned()
    }
}

fn label_map<'a>(labels: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
    labels.iter().copied().collect()
}

fn labels_match(pairs: &[LabelPair], labels: &[(&str, &str)]) -> bool {
    pairs.len() == labels.len()
        && labels.iter().all(|(key, value)| {
            pairs
                .iter()
                .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
        })
}
