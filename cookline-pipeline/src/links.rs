//! Function link management.
//!
//! An authoritative link lives on the node that owns the derived value
//! (usually a category). Every descendant carries a propagated copy whose
//! `inherited_from_node_id` names that node, so a lookup on any entity in
//! the subtree finds the formula without walking the tree.

use crate::error::{CookError, CookResult};
use crate::inheritance::NodeIndex;
use cookline_model::{BalanceModel, BalanceModelPart, EntityNode, FunctionLink};
use cookline_storage::{BalanceModelReader, FunctionLinkWriter, NodeReader};
use cookline_types::{BranchName, GameId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::info;

/// Ids of every node below `root`, breadth first.
fn descendants(nodes: &[EntityNode], root: &str) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent() {
            children.entry(parent).or_default().push(&node.node_id);
        }
    }

    let mut out = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([root]);
    let mut queue: VecDeque<&str> = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        for &child in children.get(current).into_iter().flatten() {
            if seen.insert(child) {
                out.push(child.to_string());
                queue.push_back(child);
            }
        }
    }
    out
}

/// Drops the authoritative link for `(node_id, value_sid)` and every copy
/// propagated from it. Returns whether anything was removed.
pub fn remove_function_link(links: &mut Vec<FunctionLink>, node_id: &str, value_sid: &str) -> bool {
    let before = links.len();
    links.retain(|l| {
        let owned = l.value_sid == value_sid
            && match l.inherited_from_node_id.as_deref() {
                None => l.node_id == node_id,
                Some(from) => from == node_id,
            };
        !owned
    });
    links.len() != before
}

/// Installs `link` as the authoritative link on its node and propagates a
/// copy to every descendant, replacing the previous link and its copies.
pub fn set_function_link(
    links: &mut Vec<FunctionLink>,
    nodes: &[EntityNode],
    link: FunctionLink,
) -> CookResult<()> {
    if !link.is_authoritative() {
        return Err(CookError::Validation(format!(
            "link for `{}` on `{}` must not carry an inherited-from node",
            link.value_sid, link.node_id
        )));
    }
    if link.output_path.trim().is_empty() {
        return Err(CookError::Validation(format!(
            "link for `{}` on `{}` has no output path",
            link.value_sid, link.node_id
        )));
    }
    if !nodes.iter().any(|n| n.node_id == link.node_id) {
        return Err(CookError::Validation(format!(
            "cannot link `{}`: node `{}` does not exist",
            link.value_sid, link.node_id
        )));
    }

    remove_function_link(links, &link.node_id, &link.value_sid);
    let copies: Vec<FunctionLink> = descendants(nodes, &link.node_id)
        .into_iter()
        .map(|node_id| FunctionLink {
            node_id,
            inherited_from_node_id: Some(link.node_id.clone()),
            ..link.clone()
        })
        .filter(|copy| !links.iter().any(|l| l.identity() == copy.identity()))
        .collect();
    links.push(link);
    links.extend(copies);
    Ok(())
}

/// Finds the link computing `value_sid` for `node_id`, falling back to the
/// authoritative link of the nearest ancestor that has one.
pub fn find_link<'m>(
    model: &'m BalanceModel,
    index: &NodeIndex<'_>,
    node_id: &str,
    value_sid: &str,
) -> Option<&'m FunctionLink> {
    if let Some(link) = model.link_for(node_id, value_sid) {
        return Some(link);
    }
    let node = index.get(node_id)?;
    index
        .ancestors(node)
        .ok()?
        .into_iter()
        .find_map(|ancestor| {
            model
                .link_for(&ancestor.node_id, value_sid)
                .filter(|l| l.is_authoritative())
        })
}

/// Read-modify-write of a branch's link set through the storage collaborators.
pub struct LinkEditor {
    model: Arc<dyn BalanceModelReader>,
    nodes: Arc<dyn NodeReader>,
    writer: Arc<dyn FunctionLinkWriter>,
}

impl LinkEditor {
    pub fn new(
        model: Arc<dyn BalanceModelReader>,
        nodes: Arc<dyn NodeReader>,
        writer: Arc<dyn FunctionLinkWriter>,
    ) -> Self {
        Self { model, nodes, writer }
    }

    async fn current_links(&self, game: &GameId, branch: &BranchName) -> CookResult<Vec<FunctionLink>> {
        Ok(self
            .model
            .get_balance_model(game, branch, &[BalanceModelPart::Links])
            .await?
            .links)
    }

    pub async fn set_link(&self, game: &GameId, branch: &BranchName, link: FunctionLink) -> CookResult<()> {
        let nodes = self.nodes.planning_nodes(game, branch).await?;
        let mut links = self.current_links(game, branch).await?;
        let (node_id, value_sid) = (link.node_id.clone(), link.value_sid.clone());
        set_function_link(&mut links, &nodes, link)?;
        let count = links.len();
        self.writer.replace_function_links(game, branch, links).await?;
        info!(game_id = %game, branch = %branch, node_id = %node_id, value_sid = %value_sid, links = count, "Function link set");
        Ok(())
    }

    /// Returns `false` when no link existed.
    pub async fn remove_link(
        &self,
        game: &GameId,
        branch: &BranchName,
        node_id: &str,
        value_sid: &str,
    ) -> CookResult<bool> {
        let mut links = self.current_links(game, branch).await?;
        if !remove_function_link(&mut links, node_id, value_sid) {
            return Ok(false);
        }
        self.writer.replace_function_links(game, branch, links).await?;
        info!(game_id = %game, branch = %branch, node_id = %node_id, value_sid = %value_sid, "Function link removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookline_model::DerivedType;

    fn tree() -> Vec<EntityNode> {
        vec![
            EntityNode::new("Root", None),
            EntityNode::new("cat", Some("Root")),
            EntityNode::new("sub", Some("cat")),
            EntityNode::new("leaf", Some("sub")),
            EntityNode::new("other", Some("Root")),
        ]
    }

    fn link(node: &str, function: &str) -> FunctionLink {
        FunctionLink {
            value_sid: "price".into(),
            node_id: node.into(),
            inherited_from_node_id: None,
            linked_function_id: function.into(),
            output_path: "result".into(),
            value_type: DerivedType::Number,
        }
    }

    #[test]
    fn set_propagates_to_descendants() {
        let mut links = Vec::new();
        set_function_link(&mut links, &tree(), link("cat", "f1")).unwrap();
        let mut nodes: Vec<&str> = links.iter().map(|l| l.node_id.as_str()).collect();
        nodes.sort();
        assert_eq!(nodes, vec!["cat", "leaf", "sub"]);
        assert!(links
            .iter()
            .filter(|l| l.node_id != "cat")
            .all(|l| l.inherited_from_node_id.as_deref() == Some("cat")));
    }

    #[test]
    fn resetting_replaces_previous_link_and_copies() {
        let mut links = Vec::new();
        set_function_link(&mut links, &tree(), link("cat", "f1")).unwrap();
        set_function_link(&mut links, &tree(), link("cat", "f2")).unwrap();
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.linked_function_id == "f2"));
    }

    #[test]
    fn remove_drops_link_and_copies() {
        let mut links = Vec::new();
        set_function_link(&mut links, &tree(), link("cat", "f1")).unwrap();
        set_function_link(&mut links, &tree(), link("other", "f3")).unwrap();
        assert!(remove_function_link(&mut links, "cat", "price"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].node_id, "other");
        assert!(!remove_function_link(&mut links, "cat", "price"));
    }

    #[test]
    fn unknown_node_and_empty_path_are_rejected() {
        let mut links = Vec::new();
        assert!(set_function_link(&mut links, &tree(), link("ghost", "f1")).is_err());
        let mut no_path = link("cat", "f1");
        no_path.output_path.clear();
        assert!(set_function_link(&mut links, &tree(), no_path).is_err());
        assert!(links.is_empty());
    }

    #[test]
    fn lookup_falls_back_to_ancestor() {
        let nodes = tree();
        let index = NodeIndex::new(&nodes);
        let model = BalanceModel {
            links: vec![link("cat", "f1")],
            ..Default::default()
        };
        let found = find_link(&model, &index, "leaf", "price").unwrap();
        assert_eq!(found.node_id, "cat");
        assert!(find_link(&model, &index, "other", "price").is_none());
    }
}
