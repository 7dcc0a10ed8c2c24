use std::collections::HashMap;

use async_trait::async_trait;
use fritz_lua::LuaSession;
use serde_json::Value as Json;
use tracing::{debug, warn};
use upnp_core::{ResultRecord, Value};

use super::{Backend, MetricError, MetricOutcome};
use crate::catalog::MetricSpec;
use crate::error::ExporterError;
use crate::extract::DEFAULT_RESULT_KEY;

/// Backend reading `data.lua` pages of the web interface.
#[derive(Debug)]
pub struct LuaBackend {
    session: LuaSession,
}

impl LuaBackend {
    pub fn new(session: LuaSession) -> Self {
        Self { session }
    }

    pub fn connect(url: &str, username: &str, password: &str) -> Result<Self, ExporterError> {
        Ok(Self::new(LuaSession::new(url, username, password)?))
    }
}

#[async_trait]
impl Backend for LuaBackend {
    fn name(&self) -> &'static str {
        "lua"
    }

    async fn collect(&mut self, metrics: &[MetricSpec]) -> Result<Vec<MetricOutcome>, ExporterError> {
        self.session.ensure_login().await?;

        // Several metrics usually read the same page.
        let mut pages: HashMap<&str, Json> = HashMap::new();
        let mut outcomes = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let mut outcome = MetricOutcome::default();
            if !pages.contains_key(metric.page.as_str()) {
                match self.session.fetch_page(&metric.page).await {
                    Ok(page) => {
                        pages.insert(metric.page.as_str(), page);
                    }
                    Err(source) => {
                        warn!(page = %metric.page, error = %source, "page fetch failed");
                        outcome.errors.push(MetricError::Page {
                            page: metric.page.clone(),
                            source,
                        });
                        outcomes.push(outcome);
                        continue;
                    }
                }
            }
            if let Some(page) = pages.get(metric.page.as_str()) {
                let selection = fritz_lua::select(page, &metric.result_path).unwrap_or(Json::Null);
                outcome.records =
                    records_from_json(&selection, &metric.result_key, &metric.prom_desc.var_labels);
            }
            outcomes.push(outcome);
        }
        debug!(metrics = metrics.len(), pages = pages.len(), "lua pass finished");
        Ok(outcomes)
    }
}

/// Convert a JSON selection into raw records.
///
/// Arrays yield one record per object element (a nested array is descended
/// into instead). With an empty `key` every element gets `result = 1`;
/// otherwise elements lacking the key are skipped. Any other selection is
/// a single record holding its numeric reading.
pub fn records_from_json(selection: &Json, key: &str, labels: &[String]) -> Vec<ResultRecord> {
    let Json::Array(items) = selection else {
        let key = if key.is_empty() { DEFAULT_RESULT_KEY } else { key };
        let mut record = ResultRecord::new();
        record.insert(key.to_string(), Value::Float(fritz_lua::as_float(selection)));
        add_labels(&mut record, labels, selection);
        return vec![record];
    };

    let mut records = Vec::new();
    for item in items {
        match item {
            Json::Array(_) => return records_from_json(item, key, labels),
            Json::Object(fields) => {
                let mut record = ResultRecord::new();
                if key.is_empty() {
                    record.insert(DEFAULT_RESULT_KEY.to_string(), Value::Float(1.0));
                } else if let Some(value) = fields.get(key) {
                    record.insert(key.to_string(), Value::Float(fritz_lua::as_float(value)));
                } else {
                    continue;
                }
                add_labels(&mut record, labels, item);
                records.push(record);
            }
            _ => {}
        }
    }
    records
}

/// Label names are paths relative to `node`, so `dev.name` reads a nested field.
fn add_labels(record: &mut ResultRecord, labels: &[String], node: &Json) {
    for label in labels {
        let value = fritz_lua::select(node, label)
            .map(|selected| fritz_lua::as_label(&selected))
            .unwrap_or_default();
        record.insert(label.clone(), Value::Str(value));
    }
}
