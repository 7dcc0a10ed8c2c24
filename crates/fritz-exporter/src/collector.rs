//! Collection passes and Prometheus exposition.

use std::collections::BTreeMap;

use prometheus::core::Collector as _;
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType, Untyped};
use prometheus::{Encoder, IntCounter, TextEncoder};
use tracing::{debug, warn};
use upnp_core::ResultRecord;

use crate::backend::{Backend, LuaBackend, UpnpBackend};
use crate::catalog::{Catalog, MetricSpec, ValueType};
use crate::error::ExporterError;
use crate::extract::{extract_sample, Sample};

pub const COLLECT_ERRORS_NAME: &str = "fritzbox_exporter_collect_errors";
pub const COLLECT_ERRORS_HELP: &str = "Number of collection errors.";

/// Counter incremented for every error recorded during a pass.
pub fn collect_errors_counter() -> Result<IntCounter, prometheus::Error> {
    IntCounter::new(COLLECT_ERRORS_NAME, COLLECT_ERRORS_HELP)
}

/// What one pass produced for a single catalog entry.
#[derive(Debug, Clone)]
pub struct MetricReport {
    pub fq_name: String,
    pub records: Vec<ResultRecord>,
    pub samples: Vec<Sample>,
    pub errors: Vec<String>,
}

/// Result of one collection pass, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub metrics: Vec<MetricReport>,
    /// Set when the backend failed the whole pass.
    pub failure: Option<String>,
}

impl PassReport {
    pub fn error_count(&self) -> usize {
        self.metrics.iter().map(|m| m.errors.len()).sum::<usize>() + usize::from(self.failure.is_some())
    }
}

/// Catalog bound to a backend and a gateway label value.
pub struct Collector {
    catalog: Catalog,
    backend: Box<dyn Backend>,
    gateway: String,
    errors: IntCounter,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("backend", &self.backend.name())
            .field("metrics", &self.catalog.metrics.len())
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl Collector {
    /// `errors` may be shared between collectors; clones count into the same value.
    pub fn new(catalog: Catalog, backend: Box<dyn Backend>, gateway: &str, errors: IntCounter) -> Self {
        Self {
            catalog,
            backend,
            gateway: gateway.to_string(),
            errors,
        }
    }

    /// TR-064 collector; runs discovery before returning.
    pub async fn upnp(
        catalog: Catalog,
        url: &str,
        credentials: Option<tr064::Credentials>,
        gateway: &str,
        errors: IntCounter,
    ) -> Result<Self, ExporterError> {
        let backend = UpnpBackend::connect(url, credentials).await?;
        Ok(Self::new(catalog, Box::new(backend), gateway, errors))
    }

    /// Lua collector; logs in lazily on the first pass.
    pub fn lua(
        catalog: Catalog,
        url: &str,
        username: &str,
        password: &str,
        gateway: &str,
        errors: IntCounter,
    ) -> Result<Self, ExporterError> {
        let backend = LuaBackend::connect(url, username, password)?;
        Ok(Self::new(catalog, Box::new(backend), gateway, errors))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn error_counter(&self) -> &IntCounter {
        &self.errors
    }

    /// Run one pass: resolve every metric through the backend and extract
    /// its samples. Every recorded error is logged and counted.
    pub async fn collect_pass(&mut self) -> PassReport {
        let backend = self.backend.name();
        let outcomes = match self.backend.collect(&self.catalog.metrics).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(backend, error = %err, "collection pass failed");
                self.errors.inc();
                return PassReport {
                    metrics: Vec::new(),
                    failure: Some(err.to_string()),
                };
            }
        };

        let mut report = PassReport::default();
        for (metric, outcome) in self.catalog.metrics.iter().zip(outcomes) {
            let mut errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
            let mut samples = Vec::with_capacity(outcome.records.len());
            for record in &outcome.records {
                match extract_sample(metric, record, &self.gateway, &self.catalog.renames) {
                    Ok(sample) => samples.push(sample),
                    Err(err) => errors.push(format!("{}: {err}", metric.prom_desc.fq_name)),
                }
            }
            for err in &errors {
                warn!(backend, metric = %metric.prom_desc.fq_name, error = %err, "metric error");
                self.errors.inc();
            }
            report.metrics.push(MetricReport {
                fq_name: metric.prom_desc.fq_name.clone(),
                records: outcome.records,
                samples,
                errors,
            });
        }
        debug!(backend, metrics = report.metrics.len(), errors = report.error_count(), "pass finished");
        report
    }

    /// Run a pass and build metric families; catalog entries sharing a name
    /// merge into one family and families without samples are dropped.
    pub async fn gather(&mut self) -> Vec<MetricFamily> {
        let report = self.collect_pass().await;
        families(&self.catalog.metrics, &report)
    }
}

/// Build families from a pass report, in first-appearance order.
pub fn families(metrics: &[MetricSpec], report: &PassReport) -> Vec<MetricFamily> {
    let mut out: Vec<MetricFamily> = Vec::new();
    for (metric, result) in metrics.iter().zip(&report.metrics) {
        if result.samples.is_empty() {
            continue;
        }
        let name = &metric.prom_desc.fq_name;
        let idx = match out.iter().position(|f| f.get_name() == name.as_str()) {
            Some(idx) => idx,
            None => {
                let mut family = MetricFamily::default();
                family.set_name(name.clone());
                family.set_help(metric.prom_desc.help.clone());
                family.set_field_type(metric_type(metric.prom_type));
                out.push(family);
                out.len() - 1
            }
        };
        for sample in &result.samples {
            out[idx].mut_metric().push(build_metric(metric, sample));
        }
    }
    out
}

fn metric_type(value_type: ValueType) -> MetricType {
    match value_type {
        ValueType::Counter => MetricType::COUNTER,
        ValueType::Gauge => MetricType::GAUGE,
        ValueType::Untyped => MetricType::UNTYPED,
    }
}

fn build_metric(spec: &MetricSpec, sample: &Sample) -> Metric {
    let mut labels: BTreeMap<String, String> = spec.prom_desc.fixed_labels.clone();
    for (name, value) in spec.prom_desc.var_labels.iter().zip(&sample.labels) {
        labels.insert(name.to_lowercase(), value.clone());
    }

    let mut metric = Metric::default();
    for (name, value) in labels {
        let mut pair = LabelPair::default();
        pair.set_name(name);
        pair.set_value(value);
        metric.mut_label().push(pair);
    }
    match spec.prom_type {
        ValueType::Counter => {
            let mut counter = Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
        }
        ValueType::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
        ValueType::Untyped => {
            let mut untyped = Untyped::default();
            untyped.set_value(sample.value);
            metric.set_untyped(untyped);
        }
    }
    metric
}

/// Concatenate families from several collectors, merging equal names.
pub fn merge_families(families: impl IntoIterator<Item = MetricFamily>) -> Vec<MetricFamily> {
    let mut merged: Vec<MetricFamily> = Vec::new();
    for mut family in families {
        match merged.iter_mut().find(|f| f.get_name() == family.get_name()) {
            Some(existing) => {
                for metric in family.take_metric() {
                    existing.mut_metric().push(metric);
                }
            }
            None => merged.push(family),
        }
    }
    merged
}

/// Families of the shared error counter.
pub fn error_families(errors: &IntCounter) -> Vec<MetricFamily> {
    errors.collect()
}

/// Render families in the Prometheus text format.
pub fn encode_text(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}
