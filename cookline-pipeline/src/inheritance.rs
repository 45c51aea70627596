//! Inheritance resolution for the planning tree.
//!
//! A node's effective configuration is the `main_configs` of every ancestor,
//! root first, with overrides applied at value granularity:
//!
//! 1. each ancestor's `inherited_configs` override the configs of the less
//!    specific ancestors they target, processed root to specific;
//! 2. the node's own `inherited_configs` are applied last.
//!
//! An override replaces the segment entries it names on the value with the
//! same `sid` and appends the ones the value lacks. Values it does not
//! mention keep their inherited segments.

use crate::error::{CookError, CookResult};
use cookline_model::{ConfigValue, EntityNode, InheritedConfig, ResolvedNode, SegmentValue};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Parent links of a planning tree, keyed by node id.
pub struct NodeIndex<'a> {
    nodes: HashMap<&'a str, &'a EntityNode>,
}

impl<'a> NodeIndex<'a> {
    pub fn new(nodes: &'a [EntityNode]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| (n.node_id.as_str(), n)).collect(),
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&'a EntityNode> {
        self.nodes.get(node_id).copied()
    }

    /// Ancestors of `node`, nearest first, excluding the node itself.
    /// Fails on a parent cycle; stops quietly at an unknown parent.
    pub fn ancestors(&self, node: &'a EntityNode) -> CookResult<Vec<&'a EntityNode>> {
        let mut chain = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([node.node_id.as_str()]);
        let mut current = node;
        while !current.is_root() {
            let Some(parent_id) = current.parent() else {
                break;
            };
            let Some(parent) = self.get(parent_id) else {
                warn!(node_id = %current.node_id, parent = %parent_id, "Parent node not found");
                break;
            };
            if !seen.insert(parent.node_id.as_str()) {
                return Err(CookError::Validation(format!(
                    "planning tree has a parent cycle through `{}`",
                    parent.node_id
                )));
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }
}

/// Segment overrides keyed by value sid, gathered from override trees.
fn collect_overrides<'c>(configs: &'c [ConfigValue], out: &mut HashMap<&'c str, &'c [SegmentValue]>) {
    for config in configs {
        if !config.segments.is_empty() && !config.sid.is_empty() {
            out.insert(config.sid.as_str(), config.segments.as_slice());
        }
        collect_overrides(&config.values, out);
    }
}

/// Applies `overrides` onto `targets` using the segment merge rule.
fn merge_overrides(targets: &mut [ConfigValue], overrides: &[ConfigValue]) {
    let mut by_sid = HashMap::new();
    collect_overrides(overrides, &mut by_sid);
    if by_sid.is_empty() {
        return;
    }
    for target in targets {
        target.walk_mut(&mut |value| {
            if let Some(segments) = by_sid.get(value.sid.as_str()) {
                for segment in segments.iter() {
                    value.set_segment(&segment.segment_id, segment.value.clone());
                }
            }
        });
    }
}

/// Applies each override set to the ancestor it targets.
fn apply_inherited(
    resolved: &mut [(&str, Vec<ConfigValue>)],
    inherited: &[InheritedConfig],
    owner: &str,
) {
    for entry in inherited {
        match resolved.iter_mut().find(|(id, _)| *id == entry.node_id) {
            Some((_, configs)) => merge_overrides(configs, &entry.configs),
            None => warn!(
                node_id = %owner,
                target = %entry.node_id,
                "Inherited config targets a node that is not an ancestor"
            ),
        }
    }
}

fn resolve_node(node: &EntityNode, index: &NodeIndex<'_>) -> CookResult<Vec<ConfigValue>> {
    if node.is_root() || node.parent().is_none() {
        return Ok(node.main_configs.clone());
    }

    let mut chain = index.ancestors(node)?;
    chain.reverse();

    let mut resolved: Vec<(&str, Vec<ConfigValue>)> = chain
        .iter()
        .map(|a| (a.node_id.as_str(), a.main_configs.clone()))
        .collect();
    for (position, ancestor) in chain.iter().enumerate() {
        let (less_specific, _) = resolved.split_at_mut(position);
        apply_inherited(less_specific, &ancestor.inherited_configs, &ancestor.node_id);
    }
    apply_inherited(&mut resolved, &node.inherited_configs, &node.node_id);

    let mut config: Vec<ConfigValue> = resolved.into_iter().flat_map(|(_, c)| c).collect();
    config.extend(node.main_configs.iter().cloned());
    Ok(config)
}

fn check_duplicates(node: &EntityNode, config: &[ConfigValue]) -> CookResult<()> {
    let mut seen = HashSet::new();
    for value in config {
        let key = value.key();
        if key.is_empty() {
            continue;
        }
        if !seen.insert(key) {
            return Err(CookError::Validation(format!(
                "entity `{}` has duplicate config `{key}`",
                display_name(node)
            )));
        }
    }
    Ok(())
}

fn display_name(node: &EntityNode) -> &str {
    if node.name.is_empty() {
        &node.node_id
    } else {
        &node.name
    }
}

/// Resolves every node and builds its children index. Output follows input order.
pub fn resolve_inheritance(nodes: &[EntityNode]) -> CookResult<Vec<ResolvedNode>> {
    let index = NodeIndex::new(nodes);
    let mut children: HashMap<&str, Vec<String>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent() {
            children
                .entry(parent)
                .or_default()
                .push(node.node_id.clone());
        }
    }

    nodes
        .iter()
        .map(|node| {
            let config = resolve_node(node, &index)?;
            check_duplicates(node, &config)?;
            Ok(ResolvedNode {
                node_id: node.node_id.clone(),
                name: node.name.clone(),
                parent: node.parent().map(str::to_string),
                is_category: node.is_category,
                config,
                children: children.remove(node.node_id.as_str()).unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ancestors_are_nearest_first() {
        let nodes = vec![
            EntityNode::new("Root", None),
            EntityNode::new("a", Some("Root")),
            EntityNode::new("b", Some("a")),
        ];
        let index = NodeIndex::new(&nodes);
        let chain: Vec<&str> = index
            .ancestors(&nodes[2])
            .unwrap()
            .iter()
            .map(|n| n.node_id.as_str())
            .collect();
        assert_eq!(chain, vec!["a", "Root"]);
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let nodes = vec![EntityNode::new("a", Some("b")), EntityNode::new("b", Some("a"))];
        let index = NodeIndex::new(&nodes);
        assert!(matches!(index.ancestors(&nodes[0]), Err(CookError::Validation(_))));
    }

    #[test]
    fn merge_replaces_and_appends_segments() {
        let mut targets = vec![ConfigValue::group(
            "g",
            "group",
            vec![
                ConfigValue::leaf("a", "a", "number", json!(1)),
                ConfigValue::leaf("b", "b", "number", json!(2)),
            ],
        )];
        let mut override_a = ConfigValue::leaf("a", "a", "number", json!(10));
        override_a.set_segment("whales", json!(99));
        merge_overrides(&mut targets, &[override_a]);

        let a = targets[0].find_by_sid("a").unwrap();
        assert_eq!(a.value_for("everyone"), Some(&json!(10)));
        assert_eq!(a.value_for("whales"), Some(&json!(99)));
        let b = targets[0].find_by_sid("b").unwrap();
        assert_eq!(b.segments.len(), 1);
        assert_eq!(b.value_for("everyone"), Some(&json!(2)));
    }
}
