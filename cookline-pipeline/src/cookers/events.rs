use super::{CookContext, CookedContent};
use crate::error::CookResult;
use crate::schedule::expand_occurrences;
use chrono::TimeDelta;
use cookline_model::{ArtifactKind, Collection, ScheduledEvent};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

const KIND: ArtifactKind = ArtifactKind::Events;

/// Expands active events over the rolling window starting at the run's
/// `now` and shards them by the events' segment allow/deny lists.
pub async fn cook_events(ctx: &CookContext) -> CookResult<CookedContent> {
    let events: Vec<ScheduledEvent> = ctx.load(Collection::Events, KIND).await?;
    let window_start = ctx.now;
    let window_end = ctx.now + TimeDelta::days(ctx.window_days.max(0));

    let expanded: Vec<(&ScheduledEvent, Value)> = events
        .iter()
        .filter(|e| e.is_active())
        .map(|event| {
            let occurrences: Vec<Value> = expand_occurrences(event, window_start, window_end)
                .into_iter()
                .map(|o| json!({ "start": o.start, "end": o.end }))
                .collect();
            let config = json!({
                "id": event.id,
                "name": event.name,
                "durationSecs": event.duration_secs,
                "occurrences": occurrences,
            });
            (event, config)
        })
        .collect();

    let segments: BTreeMap<_, _> = ctx
        .segments
        .iter()
        .map(|segment| {
            let visible: Vec<Value> = expanded
                .iter()
                .filter(|(event, _)| event.segments.admits(segment.as_str()))
                .map(|(_, config)| config.clone())
                .collect();
            (segment.clone(), Value::Array(visible))
        })
        .collect();

    info!(
        game_id = %ctx.game,
        events = expanded.len(),
        window_days = ctx.window_days,
        "Cooked events"
    );
    Ok(CookedContent { kind: KIND, segments })
}
