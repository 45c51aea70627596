use crate::config::DerivedType;
use cookline_types::EVERYONE_SEGMENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An author-defined formula input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceVariable {
    #[serde(rename = "variableID")]
    pub variable_id: String,
    pub variable_name: String,
    #[serde(rename = "type", default)]
    pub value_type: String,
}

/// Per-variable override inside a balance segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOverride {
    #[serde(rename = "variableID")]
    pub variable_id: String,
    #[serde(default)]
    pub value: Value,
}

/// A segment's variable overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSegment {
    #[serde(rename = "segmentID")]
    pub segment_id: String,
    #[serde(default)]
    pub overrides: Vec<VariableOverride>,
}

/// An author-written formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceFunction {
    #[serde(rename = "functionID")]
    pub function_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

/// Binds a derived config value to the formula that computes it.
///
/// Unique per `(node_id, value_sid, inherited_from_node_id)`. A link with
/// `inherited_from_node_id == None` is authoritative; the others are copies
/// propagated to descendants of the category that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionLink {
    #[serde(rename = "valueSID")]
    pub value_sid: String,
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(rename = "inheritedFromNodeID", default)]
    pub inherited_from_node_id: Option<String>,
    #[serde(rename = "linkedFunctionID", default)]
    pub linked_function_id: String,
    #[serde(default)]
    pub output_path: String,
    pub value_type: DerivedType,
}

impl FunctionLink {
    pub fn is_authoritative(&self) -> bool {
        self.inherited_from_node_id.is_none()
    }

    /// Uniqueness key `(node_id, value_sid, inherited_from_node_id)`.
    pub fn identity(&self) -> (&str, &str, Option<&str>) {
        (
            &self.node_id,
            &self.value_sid,
            self.inherited_from_node_id.as_deref(),
        )
    }
}

/// Parts of the balance model a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceModelPart {
    Functions,
    Variables,
    Segments,
    Links,
}

impl BalanceModelPart {
    pub const ALL: [BalanceModelPart; 4] = [
        BalanceModelPart::Functions,
        BalanceModelPart::Variables,
        BalanceModelPart::Segments,
        BalanceModelPart::Links,
    ];
}

/// Variables, segments, formulas and links for one game branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceModel {
    #[serde(default)]
    pub functions: Vec<BalanceFunction>,
    #[serde(default)]
    pub variables: Vec<BalanceVariable>,
    #[serde(default)]
    pub segments: Vec<BalanceSegment>,
    #[serde(default)]
    pub links: Vec<FunctionLink>,
}

impl BalanceModel {
    pub fn function(&self, function_id: &str) -> Option<&BalanceFunction> {
        self.functions.iter().find(|f| f.function_id == function_id)
    }

    /// Looks up a link by `(node_id, value_sid)`, preferring the authoritative one.
    pub fn link_for(&self, node_id: &str, value_sid: &str) -> Option<&FunctionLink> {
        let mut matching = self
            .links
            .iter()
            .filter(|l| l.node_id == node_id && l.value_sid == value_sid);
        let first = matching.next()?;
        if first.is_authoritative() {
            return Some(first);
        }
        Some(matching.find(|l| l.is_authoritative()).unwrap_or(first))
    }

    /// Resolves a variable's value for `segment_id`, falling back to the
    /// `everyone` segment. `None` when neither defines it.
    pub fn variable_value(&self, variable_id: &str, segment_id: &str) -> Option<&Value> {
        let in_segment = |seg: &str| {
            self.segments
                .iter()
                .find(|s| s.segment_id == seg)
                .and_then(|s| s.overrides.iter().find(|o| o.variable_id == variable_id))
                .map(|o| &o.value)
        };
        in_segment(segment_id).or_else(|| in_segment(EVERYONE_SEGMENT))
    }

    /// Segment ids to shard artifacts by: `everyone` plus every model
    /// segment, sorted and de-duplicated.
    pub fn segment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .segments
            .iter()
            .map(|s| s.segment_id.clone())
            .chain(std::iter::once(EVERYONE_SEGMENT.to_string()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
