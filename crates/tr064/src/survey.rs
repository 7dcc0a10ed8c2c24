//! Survey of every action a gateway exposes, for writing metric catalogs.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use upnp_core::{Argument, ResultRecord, Service, Value};

use crate::client::{Tr064Client, Tr064Error};

/// Argument description as it appears in the survey output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyArgument {
    pub name: String,
    pub direction: String,
    pub related_state_variable: String,
}

impl From<&Argument> for SurveyArgument {
    fn from(arg: &Argument) -> Self {
        Self {
            name: arg.name.clone(),
            direction: arg.direction.as_str().to_string(),
            related_state_variable: arg.related_state_variable.clone(),
        }
    }
}

/// One service/action pair with its result or an `error` entry.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyEntry {
    pub service: String,
    pub action: String,
    pub arguments: Vec<SurveyArgument>,
    pub result: ResultRecord,
}

impl SurveyEntry {
    pub fn error(&self) -> Option<&str> {
        self.result.get("error").and_then(Value::as_str)
    }
}

/// Call every get-only action of every discovered service, sorted by
/// service type and action name.
///
/// Individual failures are recorded in the entry; the survey itself only
/// fails when discovery does.
pub async fn collect_all(client: &mut Tr064Client) -> Result<Vec<SurveyEntry>, Tr064Error> {
    if client.services().is_empty() {
        client.load_services().await?;
    }
    let services: Vec<Arc<Service>> = client.services().iter().cloned().collect();

    let mut entries = Vec::new();
    for service in &services {
        info!(service = %service.service_type, url = %service.control_url, "collecting service");
        for action in service.actions() {
            let result = if !action.is_get_only() {
                error_record("... not calling since arguments required or no output".into())
            } else {
                match client.invoke(service, action, None).await {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(service = %service.service_type, action = %action.name, error = %err, "survey call failed");
                        error_record(format!("FAILED:{err}"))
                    }
                }
            };
            entries.push(SurveyEntry {
                service: service.service_type.clone(),
                action: action.name.clone(),
                arguments: action.arguments().iter().map(SurveyArgument::from).collect(),
                result,
            });
        }
    }
    Ok(entries)
}

/// Pretty JSON rendering of a survey.
pub fn render(entries: &[SurveyEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(entries)
}

fn error_record(message: String) -> ResultRecord {
    let mut record = ResultRecord::new();
    record.insert("error".into(), Value::Str(message));
    record
}
