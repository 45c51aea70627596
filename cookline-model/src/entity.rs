use crate::config::ConfigValue;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node id of the planning tree root.
pub const ROOT_NODE_ID: &str = "Root";

/// A planning-tree node as authored.
///
/// `main_configs` and `inherited_configs` may be stored either as JSON
/// arrays or as JSON-encoded strings; both forms are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_category: Option<String>,
    #[serde(default)]
    pub is_category: bool,
    #[serde(default, deserialize_with = "config_tree")]
    pub main_configs: Vec<ConfigValue>,
    #[serde(default, deserialize_with = "config_tree")]
    pub inherited_configs: Vec<InheritedConfig>,
}

impl EntityNode {
    pub fn new(node_id: &str, parent: Option<&str>) -> Self {
        Self {
            node_id: node_id.into(),
            name: node_id.into(),
            parent_category: parent.map(Into::into),
            is_category: false,
            main_configs: Vec::new(),
            inherited_configs: Vec::new(),
        }
    }

    /// Whether this node is the tree root.
    pub fn is_root(&self) -> bool {
        self.node_id.eq_ignore_ascii_case(ROOT_NODE_ID)
    }

    /// Parent id, treating an empty string as absent.
    pub fn parent(&self) -> Option<&str> {
        self.parent_category.as_deref().filter(|p| !p.is_empty())
    }
}

/// Overrides declared by a node against one ancestor's configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritedConfig {
    /// The ancestor whose configs are overridden.
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default)]
    pub configs: Vec<ConfigValue>,
}

/// A node after inheritance resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    pub name: String,
    pub parent: Option<String>,
    pub is_category: bool,
    pub config: Vec<ConfigValue>,
    pub children: Vec<String>,
}

fn config_tree<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => serde_json::from_str(&s).map_err(de::Error::custom),
        other => serde_json::from_value(other).map_err(de::Error::custom),
    }
}
