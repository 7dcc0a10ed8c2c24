//! Conversion of raw result records into sample values and label sets.

use thiserror::Error;
use upnp_core::{ResultRecord, Value};

use crate::catalog::{LabelRename, MetricSpec};

/// Result key used when a metric does not name one.
pub const DEFAULT_RESULT_KEY: &str = "result";
/// Label filled with the configured gateway host instead of a record field.
pub const GATEWAY_LABEL: &str = "gateway";

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("result key '{key}' missing from record")]
    MissingResult { key: String },
    #[error("label '{label}' missing from record")]
    MissingLabel { label: String },
    #[error("label '{label}' is not a string: {value}")]
    LabelNotString { label: String, value: String },
}

/// One exposed value with its label values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub labels: Vec<String>,
}

/// Read the result key of `record` as a float; strings compare against `ok_value`.
pub fn result_value(record: &ResultRecord, key: &str, ok_value: &str) -> Result<f64, ExtractError> {
    let key = if key.is_empty() { DEFAULT_RESULT_KEY } else { key };
    let value = record.get(key).ok_or_else(|| ExtractError::MissingResult {
        key: key.to_string(),
    })?;
    Ok(match value {
        Value::Float(v) => *v,
        Value::UInt(v) => *v as f64,
        Value::Int(v) => *v as f64,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Str(s) => {
            if s == ok_value {
                1.0
            } else {
                0.0
            }
        }
    })
}

/// Apply the rules in declaration order, each one to the output of the
/// rules before it.
pub fn rename_label(value: &str, renames: &[LabelRename]) -> String {
    renames.iter().fold(value.to_string(), |current, rule| {
        if rule.pattern.is_match(&current) {
            rule.replacement.clone()
        } else {
            current
        }
    })
}

/// Label values for `names`, renamed and lowercased.
pub fn label_values(
    names: &[String],
    record: &ResultRecord,
    gateway: &str,
    renames: &[LabelRename],
) -> Result<Vec<String>, ExtractError> {
    names
        .iter()
        .map(|name| {
            let raw = if name == GATEWAY_LABEL {
                gateway
            } else {
                match record.get(name) {
                    Some(Value::Str(s)) => s.as_str(),
                    Some(other) => {
                        return Err(ExtractError::LabelNotString {
                            label: name.clone(),
                            value: other.to_string(),
                        })
                    }
                    None => return Err(ExtractError::MissingLabel { label: name.clone() }),
                }
            };
            Ok(rename_label(raw, renames).to_lowercase())
        })
        .collect()
}

/// Full extraction of one record for `metric`.
pub fn extract_sample(
    metric: &MetricSpec,
    record: &ResultRecord,
    gateway: &str,
    renames: &[LabelRename],
) -> Result<Sample, ExtractError> {
    let labels = label_values(&metric.prom_desc.var_labels, record, gateway, renames)?;
    let value = result_value(record, &metric.result_key, &metric.ok_value)?;
    Ok(Sample { value, labels })
}
