//! Turn a catalog entry into the action calls it needs and collect their
//! result records.
//!
//! Failures are recorded per metric and never abort the pass: a failed
//! provider call yields no records, a failed index is skipped.

use async_trait::async_trait;
use thiserror::Error;
use tr064::{ActionArgument, Tr064Client, Tr064Error};
use tracing::{debug, trace};
use upnp_core::ResultRecord;

use crate::cache::{cache_key, PassCache};
use crate::catalog::{ActionArgSpec, MetricSpec};

/// Invokes an action by service type and name.
#[async_trait]
pub trait ActionInvoker: Send {
    async fn call_action(
        &mut self,
        service: &str,
        action: &str,
        argument: Option<&ActionArgument>,
    ) -> Result<ResultRecord, Tr064Error>;
}

#[async_trait]
impl ActionInvoker for Tr064Client {
    async fn call_action(
        &mut self,
        service: &str,
        action: &str,
        argument: Option<&ActionArgument>,
    ) -> Result<ResultRecord, Tr064Error> {
        self.call(service, action, argument).await
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{service}.{action}: {source}")]
    Call {
        service: String,
        action: String,
        #[source]
        source: Tr064Error,
    },
    #[error("Error getting provider action {provider} result for {service}.{action}: {source}")]
    Provider {
        service: String,
        action: String,
        provider: String,
        #[source]
        source: Tr064Error,
    },
    #[error("provider action {provider} for {service}.{action} has no result {field}")]
    MissingProviderField {
        service: String,
        action: String,
        provider: String,
        field: String,
    },
    #[error("invalid index count '{value}' for {service}.{action}")]
    InvalidCount {
        service: String,
        action: String,
        value: String,
    },
}

/// Records produced for one metric plus every error recorded on the way.
#[derive(Debug, Default)]
pub struct Resolution {
    pub records: Vec<ResultRecord>,
    pub errors: Vec<ResolveError>,
}

impl Resolution {
    fn push(&mut self, result: Result<ResultRecord, ResolveError>) {
        match result {
            Ok(record) => self.records.push(record),
            Err(err) => self.errors.push(err),
        }
    }
}

/// Call through the pass cache; only successful results are cached.
pub async fn cached_call<I>(
    invoker: &mut I,
    cache: &mut PassCache,
    service: &str,
    action: &str,
    argument: Option<&ActionArgument>,
) -> Result<ResultRecord, Tr064Error>
where
    I: ActionInvoker + ?Sized,
{
    let key = cache_key(service, action, argument);
    if let Some(record) = cache.get(&key) {
        trace!(%key, "cache hit");
        return Ok(record.clone());
    }
    let record = invoker.call_action(service, action, argument).await?;
    cache.insert(key, record.clone());
    Ok(record)
}

/// Resolve the argument of `metric`, invoke its action and return the records.
pub async fn resolve_metric<I>(invoker: &mut I, cache: &mut PassCache, metric: &MetricSpec) -> Resolution
where
    I: ActionInvoker + ?Sized,
{
    let mut resolution = Resolution::default();
    let call_error = |source: Tr064Error| ResolveError::Call {
        service: metric.service.clone(),
        action: metric.action.clone(),
        source,
    };

    let Some(spec) = &metric.action_argument else {
        let result = cached_call(invoker, cache, &metric.service, &metric.action, None).await;
        resolution.push(result.map_err(call_error));
        return resolution;
    };

    let value = if spec.has_provider() {
        match provider_value(invoker, cache, metric, spec).await {
            Ok(value) => value,
            Err(err) => {
                resolution.errors.push(err);
                return resolution;
            }
        }
    } else {
        spec.value.clone()
    };

    if !spec.is_index {
        let argument = ActionArgument::new(&spec.name, value);
        let result = cached_call(invoker, cache, &metric.service, &metric.action, Some(&argument)).await;
        resolution.push(result.map_err(call_error));
        return resolution;
    }

    let count = match value.trim().parse::<i64>() {
        Ok(count) => count.max(0),
        Err(_) => {
            resolution.errors.push(ResolveError::InvalidCount {
                service: metric.service.clone(),
                action: metric.action.clone(),
                value,
            });
            0
        }
    };
    debug!(service = %metric.service, action = %metric.action, count, "resolving indexed metric");
    for index in 0..count {
        let argument = ActionArgument::new(&spec.name, index);
        let result = cached_call(invoker, cache, &metric.service, &metric.action, Some(&argument)).await;
        resolution.push(result.map_err(call_error));
    }
    resolution
}

async fn provider_value<I>(
    invoker: &mut I,
    cache: &mut PassCache,
    metric: &MetricSpec,
    spec: &ActionArgSpec,
) -> Result<String, ResolveError>
where
    I: ActionInvoker + ?Sized,
{
    let record = cached_call(invoker, cache, &metric.service, &spec.provider_action, None)
        .await
        .map_err(|source| ResolveError::Provider {
            service: metric.service.clone(),
            action: metric.action.clone(),
            provider: spec.provider_action.clone(),
            source,
        })?;
    record
        .get(&spec.value)
        .map(ToString::to_string)
        .ok_or_else(|| ResolveError::MissingProviderField {
            service: metric.service.clone(),
            action: metric.action.clone(),
            provider: spec.provider_action.clone(),
            field: spec.value.clone(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use upnp_core::Value;

    pub(crate) const WLAN: &str = "urn:dslforum-org:service:WLANConfiguration:1";

    /// Scripted invoker answering from a map and logging every call.
    #[derive(Default)]
    pub(crate) struct FakeInvoker {
        pub(crate) answers: HashMap<String, ResultRecord>,
        pub(crate) calls: Vec<String>,
    }

    impl FakeInvoker {
        pub(crate) fn answer(mut self, key: &str, fields: &[(&str, Value)]) -> Self {
            let record = fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect();
            self.answers.insert(key.to_string(), record);
            self
        }
    }

    #[async_trait]
    impl ActionInvoker for FakeInvoker {
        async fn call_action(
            &mut self,
            service: &str,
            action: &str,
            argument: Option<&ActionArgument>,
        ) -> Result<ResultRecord, Tr064Error> {
            let key = cache_key(service, action, argument);
            self.calls.push(key.clone());
            self.answers.get(&key).cloned().ok_or_else(|| Tr064Error::Status {
                action: action.to_string(),
                status: 500,
                reason: "Internal Server Error".into(),
            })
        }
    }

    pub(crate) fn indexed_metric() -> MetricSpec {
        MetricSpec {
            service: WLAN.into(),
            action: "GetGenericAssociatedDeviceInfo".into(),
            action_argument: Some(ActionArgSpec {
                name: "NewAssociatedDeviceIndex".into(),
                is_index: true,
                provider_action: "GetTotalAssociations".into(),
                value: "TotalAssociations".into(),
            }),
            ..Default::default()
        }
    }

    fn device(mac: &str) -> Vec<(&str, Value)> {
        vec![("AssociatedDeviceMACAddress", Value::from(mac))]
    }

    #[tokio::test]
    async fn provider_count_drives_indexed_calls() {
        let mut invoker = FakeInvoker::default()
            .answer(
                &format!("{WLAN}|GetTotalAssociations"),
                &[("TotalAssociations", Value::UInt(3))],
            )
            .answer(
                &format!("{WLAN}|GetGenericAssociatedDeviceInfo|NewAssociatedDeviceIndex|0"),
                &device("aa"),
            )
            .answer(
                &format!("{WLAN}|GetGenericAssociatedDeviceInfo|NewAssociatedDeviceIndex|1"),
                &device("bb"),
            )
            .answer(
                &format!("{WLAN}|GetGenericAssociatedDeviceInfo|NewAssociatedDeviceIndex|2"),
                &device("cc"),
            );
        let mut cache = PassCache::new();
        let resolution = resolve_metric(&mut invoker, &mut cache, &indexed_metric()).await;

        assert!(resolution.errors.is_empty());
        assert_eq!(resolution.records.len(), 3);
        let indexes: Vec<&str> = invoker
            .calls
            .iter()
            .skip(1)
            .map(|key| key.rsplit('|').next().unwrap())
            .collect();
        assert_eq!(indexes, vec!["0", "1", "2"]);
        assert_eq!(
            resolution.records[2].get("AssociatedDeviceMACAddress"),
            Some(&Value::from("cc"))
        );
    }

    #[tokio::test]
    async fn shared_calls_hit_the_cache() {
        let mut invoker = FakeInvoker::default().answer(
            &format!("{WLAN}|GetInfo"),
            &[("Status", Value::from("Up")), ("Channel", Value::UInt(6))],
        );
        let metric = MetricSpec {
            service: WLAN.into(),
            action: "GetInfo".into(),
            ..Default::default()
        };
        let mut cache = PassCache::new();
        let first = resolve_metric(&mut invoker, &mut cache, &metric).await;
        let second = resolve_metric(&mut invoker, &mut cache, &metric).await;
        assert_eq!(invoker.calls.len(), 1);
        assert_eq!(first.records, second.records);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn literal_argument_is_sent_once() {
        let mut invoker = FakeInvoker::default().answer(
            &format!("{WLAN}|GetHostEntry|NewIndex|4"),
            &[("HostName", Value::from("nas"))],
        );
        let metric = MetricSpec {
            service: WLAN.into(),
            action: "GetHostEntry".into(),
            action_argument: Some(ActionArgSpec {
                name: "NewIndex".into(),
                value: "4".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolution = resolve_metric(&mut invoker, &mut PassCache::new(), &metric).await;
        assert_eq!(resolution.records.len(), 1);
        assert_eq!(invoker.calls, vec![format!("{WLAN}|GetHostEntry|NewIndex|4")]);
    }

    #[tokio::test]
    async fn provider_failure_yields_no_records() {
        let mut invoker = FakeInvoker::default();
        let resolution = resolve_metric(&mut invoker, &mut PassCache::new(), &indexed_metric()).await;
        assert!(resolution.records.is_empty());
        assert_eq!(resolution.errors.len(), 1);
        assert!(matches!(resolution.errors[0], ResolveError::Provider { .. }));
        assert_eq!(invoker.calls.len(), 1);

        let mut invoker = FakeInvoker::default().answer(
            &format!("{WLAN}|GetTotalAssociations"),
            &[("Other", Value::UInt(1))],
        );
        let resolution = resolve_metric(&mut invoker, &mut PassCache::new(), &indexed_metric()).await;
        assert!(matches!(
            resolution.errors[..],
            [ResolveError::MissingProviderField { ref field, .. }] if field == "TotalAssociations"
        ));
    }

    #[tokio::test]
    async fn failing_index_is_skipped() {
        let mut invoker = FakeInvoker::default()
            .answer(
                &format!("{WLAN}|GetTotalAssociations"),
                &[("TotalAssociations", Value::UInt(2))],
            )
            .answer(
                &format!("{WLAN}|GetGenericAssociatedDeviceInfo|NewAssociatedDeviceIndex|1"),
                &device("bb"),
            );
        let resolution = resolve_metric(&mut invoker, &mut PassCache::new(), &indexed_metric()).await;
        assert_eq!(resolution.records.len(), 1);
        assert_eq!(resolution.errors.len(), 1);
        assert!(matches!(resolution.errors[0], ResolveError::Call { .. }));
    }

    #[tokio::test]
    async fn non_numeric_count_is_recorded() {
        let mut invoker = FakeInvoker::default();
        let metric = MetricSpec {
            service: WLAN.into(),
            action: "GetGenericAssociatedDeviceInfo".into(),
            action_argument: Some(ActionArgSpec {
                name: "NewAssociatedDeviceIndex".into(),
                is_index: true,
                value: "many".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolution = resolve_metric(&mut invoker, &mut PassCache::new(), &metric).await;
        assert!(resolution.records.is_empty());
        assert!(matches!(resolution.errors[..], [ResolveError::InvalidCount { .. }]));
        assert!(invoker.calls.is_empty());
    }
}
