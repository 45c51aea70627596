use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One localized string with its translations keyed by language code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationEntry {
    pub sid: String,
    pub key: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

/// A warehouse/stat template describing a tracked player statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatTemplate {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub template_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
