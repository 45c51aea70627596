use super::{to_json, CookContext, CookedContent};
use crate::error::{CookError, CookResult};
use cookline_model::{ArtifactKind, Collection, Flow, ResolvedNode};
use cookline_types::EVERYONE_SEGMENT;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;

const KIND: ArtifactKind = ArtifactKind::Flows;

/// Embeds the cooked `everyone` view of each entity a flow step refers to.
/// Runs after the entities cooker; a step naming an unknown entity fails.
pub async fn cook_flows(ctx: &CookContext, entities: &[ResolvedNode]) -> CookResult<CookedContent> {
    let flows: Vec<Flow> = ctx.load(Collection::Flows, KIND).await?;
    let by_id: HashMap<&str, &ResolvedNode> = entities.iter().map(|n| (n.node_id.as_str(), n)).collect();

    let mut cooked = Vec::with_capacity(flows.len());
    for flow in &flows {
        let mut flow_json = to_json(KIND, flow)?;
        if let Some(steps) = flow_json.get_mut("nodes").and_then(Value::as_array_mut) {
            for (step, node) in steps.iter_mut().zip(&flow.nodes) {
                let Some(entity_id) = node.entity_id.as_deref() else {
                    continue;
                };
                let entity = by_id.get(entity_id).ok_or_else(|| {
                    CookError::Validation(format!(
                        "flow `{}` step `{}` references unknown entity `{entity_id}`",
                        flow.id, node.id
                    ))
                })?;
                let mut config = Map::new();
                for value in &entity.config {
                    config.insert(value.key().to_string(), value.to_segment_json(EVERYONE_SEGMENT));
                }
                if let Some(obj) = step.as_object_mut() {
                    obj.insert("entity".into(), json!({ "nodeID": entity.node_id, "name": entity.name, "config": config }));
                }
            }
        }
        cooked.push(flow_json);
    }

    info!(game_id = %ctx.game, flows = cooked.len(), "Cooked flows");
    Ok(CookedContent::everyone(KIND, Value::Array(cooked)))
}
