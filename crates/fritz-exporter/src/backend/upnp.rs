use async_trait::async_trait;
use tr064::{Credentials, Tr064Client};
use tracing::debug;

use super::{Backend, MetricError, MetricOutcome};
use crate::cache::PassCache;
use crate::catalog::MetricSpec;
use crate::error::ExporterError;
use crate::resolve::resolve_metric;

/// TR-064 backend; discovery happens once at construction.
#[derive(Debug)]
pub struct UpnpBackend {
    client: Tr064Client,
}

impl UpnpBackend {
    pub fn new(client: Tr064Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str, credentials: Option<Credentials>) -> Result<Self, ExporterError> {
        Ok(Self::new(Tr064Client::connect(url, credentials).await?))
    }

    pub fn client(&self) -> &Tr064Client {
        &self.client
    }
}

#[async_trait]
impl Backend for UpnpBackend {
    fn name(&self) -> &'static str {
        "upnp"
    }

    async fn collect(&mut self, metrics: &[MetricSpec]) -> Result<Vec<MetricOutcome>, ExporterError> {
        let mut cache = PassCache::new();
        let mut outcomes = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let resolution = resolve_metric(&mut self.client, &mut cache, metric).await;
            outcomes.push(MetricOutcome {
                records: resolution.records,
                errors: resolution.errors.into_iter().map(MetricError::from).collect(),
            });
        }
        debug!(metrics = metrics.len(), cached_results = cache.len(), "upnp pass finished");
        Ok(outcomes)
    }
}
