//! Metric catalog files: which action or page to read, and how to expose it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::CatalogError;

/// Name, help text and labels of the exposed metric family.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromDesc {
    pub fq_name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub var_labels: Vec<String>,
    #[serde(default)]
    pub fixed_labels: BTreeMap<String, String>,
}

/// Prometheus value type; unrecognised names fall back to untyped.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum ValueType {
    Counter,
    Gauge,
    #[default]
    Untyped,
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "CounterValue" => ValueType::Counter,
            "GaugeValue" => ValueType::Gauge,
            _ => ValueType::Untyped,
        }
    }
}

/// Argument of a UPnP metric: a literal, a field of a provider action's
/// result, and optionally a count to iterate as an index.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ActionArgSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IsIndex", default)]
    pub is_index: bool,
    #[serde(rename = "ProviderAction", default)]
    pub provider_action: String,
    /// Literal value, or the result field to read when `provider_action` is set.
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl ActionArgSpec {
    pub fn has_provider(&self) -> bool {
        !self.provider_action.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub prom_desc: PromDesc,
    #[serde(default)]
    pub prom_type: ValueType,
    #[serde(default)]
    pub result_key: String,
    #[serde(default)]
    pub ok_value: String,
    // Lua target.
    #[serde(default)]
    pub result_path: String,
    #[serde(default)]
    pub page: String,
    // UPnP target.
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub action_argument: Option<ActionArgSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelRenameSpec {
    pub match_regex: String,
    pub rename_label: String,
}

/// On-disk layout of a catalog file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFile {
    #[serde(default)]
    pub label_renames: Vec<LabelRenameSpec>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// Compiled label rename rule.
#[derive(Debug, Clone)]
pub struct LabelRename {
    pub pattern: Regex,
    pub replacement: String,
}

impl TryFrom<&LabelRenameSpec> for LabelRename {
    type Error = CatalogError;

    fn try_from(spec: &LabelRenameSpec) -> Result<Self, Self::Error> {
        let pattern = Regex::new(&spec.match_regex).map_err(|source| CatalogError::Regex {
            pattern: spec.match_regex.clone(),
            source,
        })?;
        Ok(Self {
            pattern,
            replacement: spec.rename_label.clone(),
        })
    }
}

/// Immutable catalog handed to a collector.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub metrics: Vec<MetricSpec>,
    pub renames: Vec<LabelRename>,
}

impl Catalog {
    pub fn from_metrics_file(file: MetricsFile) -> Result<Self, CatalogError> {
        let renames = file
            .label_renames
            .iter()
            .map(LabelRename::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            metrics: file.metrics,
            renames,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: MetricsFile = serde_json::from_str(json)?;
        Self::from_metrics_file(file)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            metrics = catalog.metrics.len(),
            renames = catalog.renames.len(),
            "loaded metric catalog"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "labelRenames": [
            {"matchRegex": "(?i)^eth", "renameLabel": "LAN"}
        ],
        "metrics": [
            {
                "service": "urn:dslforum-org:service:WLANConfiguration:1",
                "action": "GetGenericAssociatedDeviceInfo",
                "actionArgument": {
                    "Name": "NewAssociatedDeviceIndex",
                    "IsIndex": true,
                    "ProviderAction": "GetTotalAssociations",
                    "Value": "TotalAssociations"
                },
                "resultKey": "X_AVM-DE_SignalStrength",
                "promDesc": {
                    "fqName": "gateway_wlan_device_signal",
                    "help": "Signal strength of associated WLAN devices",
                    "varLabels": ["gateway", "AssociatedDeviceMACAddress"],
                    "fixedLabels": {"band": "2.4"}
                },
                "promType": "GaugeValue"
            },
            {
                "page": "overview",
                "resultPath": "data.fritzos.nspver",
                "promDesc": {"fqName": "gateway_version"},
                "promType": "Histogram"
            }
        ]
    }"#;

    #[test]
    fn parses_catalog_fields() {
        let catalog = Catalog::from_json(CATALOG).expect("catalog");
        assert_eq!(catalog.metrics.len(), 2);
        let wlan = &catalog.metrics[0];
        assert_eq!(wlan.prom_type, ValueType::Gauge);
        assert_eq!(wlan.prom_desc.fixed_labels.get("band").map(String::as_str), Some("2.4"));
        let arg = wlan.action_argument.as_ref().expect("argument");
        assert!(arg.is_index && arg.has_provider());
        assert_eq!(arg.value, "TotalAssociations");

        let lua = &catalog.metrics[1];
        assert_eq!(lua.prom_type, ValueType::Untyped);
        assert!(lua.action_argument.is_none());
        assert_eq!(lua.result_key, "");
        assert!(catalog.renames[0].pattern.is_match("ETH0"));
    }

    #[test]
    fn invalid_regex_is_a_construction_error() {
        let err = Catalog::from_json(r#"{"labelRenames":[{"matchRegex":"(","renameLabel":"x"}]}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Regex { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Catalog::load(Path::new("/nonexistent/metrics.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/metrics.json"));
    }
}
