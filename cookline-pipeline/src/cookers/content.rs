//! Cookers for content that needs no derived values.

use super::{to_json, CookContext, CookedContent};
use crate::error::CookResult;
use cookline_model::{AbTest, ArtifactKind, Collection, LocalizationEntry, PositionedOffer, StatTemplate};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

pub async fn cook_positioned_offers(ctx: &CookContext) -> CookResult<CookedContent> {
    const KIND: ArtifactKind = ArtifactKind::PositionedOffers;
    let positions: Vec<PositionedOffer> = ctx.load(Collection::PositionedOffers, KIND).await?;

    let mut segments = BTreeMap::new();
    for segment in &ctx.segments {
        let visible: Vec<Value> = positions
            .iter()
            .filter(|p| p.visible_to(segment.as_str()))
            .map(|p| to_json(KIND, p))
            .collect::<CookResult<_>>()?;
        segments.insert(segment.clone(), Value::Array(visible));
    }
    info!(game_id = %ctx.game, positions = positions.len(), "Cooked positioned offers");
    Ok(CookedContent { kind: KIND, segments })
}

/// Non-archived tests, published under `everyone`.
pub async fn cook_ab_tests(ctx: &CookContext) -> CookResult<CookedContent> {
    const KIND: ArtifactKind = ArtifactKind::AbTests;
    let tests: Vec<AbTest> = ctx.load(Collection::AbTests, KIND).await?;
    let active: Vec<Value> = tests
        .iter()
        .filter(|t| !t.archived)
        .map(|t| to_json(KIND, t))
        .collect::<CookResult<_>>()?;
    info!(game_id = %ctx.game, tests = active.len(), "Cooked AB tests");
    Ok(CookedContent::everyone(KIND, Value::Array(active)))
}

pub async fn cook_stat_templates(ctx: &CookContext) -> CookResult<CookedContent> {
    const KIND: ArtifactKind = ArtifactKind::StatTemplates;
    let templates: Vec<StatTemplate> = ctx.load(Collection::StatTemplates, KIND).await?;
    let config = to_json(KIND, &templates)?;
    info!(game_id = %ctx.game, templates = templates.len(), "Cooked stat templates");
    Ok(CookedContent::everyone(KIND, config))
}

/// Localization table keyed by string key, then language.
pub async fn cook_localization(ctx: &CookContext) -> CookResult<CookedContent> {
    const KIND: ArtifactKind = ArtifactKind::Localization;
    let entries: Vec<LocalizationEntry> = ctx.load(Collection::Localization, KIND).await?;
    let mut table = Map::new();
    for entry in &entries {
        table.insert(entry.key.clone(), to_json(KIND, &entry.translations)?);
    }
    info!(game_id = %ctx.game, keys = table.len(), "Cooked localization");
    Ok(CookedContent::everyone(KIND, Value::Object(table)))
}
