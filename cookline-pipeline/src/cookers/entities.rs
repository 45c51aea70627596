use super::{CookContext, CookedContent};
use crate::error::{CookError, CookResult};
use crate::inheritance::{resolve_inheritance, NodeIndex};
use crate::links::find_link;
use cookline_model::{ArtifactKind, ConfigValue, ROOT_NODE_ID, ResolvedNode};
use cookline_sandbox::FormulaRequest;
use cookline_types::{SegmentId, EVERYONE_SEGMENT};
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Cooked entities plus the resolved tree, which the flows cooker consumes.
#[derive(Debug, Clone)]
pub struct CookedEntities {
    pub content: CookedContent,
    pub resolved: Vec<ResolvedNode>,
}

/// One derived value awaiting its formula result.
struct Pending {
    node: usize,
    sid: String,
    function: String,
    subject: String,
    request: FormulaRequest,
}

fn derived_sids(config: &[ConfigValue]) -> Vec<String> {
    fn walk(value: &ConfigValue, out: &mut Vec<String>) {
        if value.is_derived() {
            out.push(value.sid.clone());
        }
        for child in &value.values {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    for value in config {
        walk(value, &mut out);
    }
    out
}

fn substitute(config: &mut [ConfigValue], sid: &str, result: &Value) {
    for value in config {
        value.walk_mut(&mut |v| {
            if v.sid == sid && v.is_derived() {
                v.set_segment(EVERYONE_SEGMENT, result.clone());
            }
        });
    }
}

fn entity_json(node: &ResolvedNode, segment: &SegmentId) -> Value {
    let mut config = Map::new();
    for value in &node.config {
        config.insert(value.key().to_string(), value.to_segment_json(segment.as_str()));
    }
    json!({
        "nodeID": node.node_id,
        "name": node.name,
        "parent": node.parent,
        "isCategory": node.is_category,
        "children": node.children,
        "config": config,
    })
}

fn subject_name(node: &ResolvedNode) -> String {
    if node.name.is_empty() {
        node.node_id.clone()
    } else {
        node.name.clone()
    }
}

/// Resolves inheritance, computes every derived value for `everyone` and
/// shards the entities per segment.
pub async fn cook_entities(ctx: &CookContext) -> CookResult<CookedEntities> {
    let nodes = ctx.nodes.planning_nodes(&ctx.game, &ctx.branch).await?;
    let mut resolved = resolve_inheritance(&nodes)?;
    resolved.retain(|n| !n.node_id.eq_ignore_ascii_case(ROOT_NODE_ID));

    let index = NodeIndex::new(&nodes);
    let mut pending = Vec::new();
    for (position, node) in resolved.iter().enumerate() {
        let subject = subject_name(node);
        for sid in derived_sids(&node.config) {
            let link = find_link(&ctx.model, &index, &node.node_id, &sid).ok_or_else(|| {
                CookError::Validation(format!("derived value `{sid}` on `{subject}` has no function link"))
            })?;
            let (function, request) = ctx.formula_request(link, &subject)?;
            pending.push(Pending {
                node: position,
                sid,
                function,
                subject: subject.clone(),
                request,
            });
        }
    }

    debug!(game_id = %ctx.game, derived = pending.len(), "Evaluating derived entity values");
    let results = try_join_all(pending.iter().map(|p| async move {
        ctx.executor
            .evaluate(&p.request)
            .await
            .map_err(|e| CookError::from_sandbox(e, &p.function, &p.subject))
    }))
    .await?;

    for (p, result) in pending.iter().zip(&results) {
        substitute(&mut resolved[p.node].config, &p.sid, result);
    }

    let segments: BTreeMap<SegmentId, Value> = ctx
        .segments
        .iter()
        .map(|segment| {
            let entities: Vec<Value> = resolved.iter().map(|n| entity_json(n, segment)).collect();
            (segment.clone(), Value::Array(entities))
        })
        .collect();

    info!(
        game_id = %ctx.game,
        entities = resolved.len(),
        derived = results.len(),
        "Cooked entities"
    );
    Ok(CookedEntities {
        content: CookedContent {
            kind: ArtifactKind::Entities,
            segments,
        },
        resolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values_are_found_in_nested_groups() {
        let config = vec![ConfigValue::group(
            "c1",
            "stats",
            vec![
                ConfigValue::leaf("p", "price", "number (derived)", Value::Null),
                ConfigValue::leaf("h", "hp", "number", json!(10)),
            ],
        )];
        assert_eq!(derived_sids(&config), vec!["p".to_string()]);
    }

    #[test]
    fn substitution_sets_everyone_entry() {
        let mut config = vec![ConfigValue::leaf("p", "price", "number (derived)", Value::Null)];
        substitute(&mut config, "p", &json!(20));
        assert_eq!(config[0].value_for("whales"), Some(&json!(20)));
        assert_eq!(config[0].segments.len(), 1);
    }
}
