use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A step in a player flow (tutorial, onboarding, quest chain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub kind: String,
    /// Planning-tree entity this step refers to, if any.
    #[serde(rename = "entityID", default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
}
