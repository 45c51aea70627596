use super::{to_json, CookContext, CookedContent};
use crate::error::{CookError, CookResult};
use crate::variants::expand_variants;
use cookline_model::{AbTest, ArtifactKind, Collection, DerivedType, Offer, ScheduledEvent};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// Value id the derived price link of an offer is keyed by.
pub const PRICE_AMOUNT_SID: &str = "priceAmount";

const KIND: ArtifactKind = ArtifactKind::Offers;

/// Expands AB-test and event variants, resolves derived prices and shards
/// offers by segment visibility.
pub async fn cook_offers(ctx: &CookContext) -> CookResult<CookedContent> {
    let (offers, ab_tests, events) = futures::try_join!(
        ctx.load::<Offer>(Collection::Offers, KIND),
        ctx.load::<AbTest>(Collection::AbTests, KIND),
        ctx.load::<ScheduledEvent>(Collection::Events, KIND),
    )?;
    let mut offers = expand_variants(&offers, &ab_tests, &events);

    let mut pending = Vec::new();
    for (position, offer) in offers.iter().enumerate() {
        if !offer.pricing.needs_derived_amount() {
            continue;
        }
        let link = ctx
            .model
            .link_for(offer.canonical_id(), PRICE_AMOUNT_SID)
            .ok_or_else(|| {
                CookError::Validation(format!("offer `{}` has a derived price but no function link", offer.offer_id))
            })?;
        let (function, mut request) = ctx.formula_request(link, &offer.offer_id)?;
        // A price is a whole amount whatever type the link was saved with.
        request.value_type = DerivedType::PriceAmount;
        pending.push((position, function, offer.offer_id.clone(), request));
    }

    let prices = try_join_all(pending.iter().map(|(_, function, subject, request)| async move {
        ctx.executor
            .evaluate(request)
            .await
            .map_err(|e| CookError::from_sandbox(e, function, subject))
    }))
    .await?;

    for ((position, ..), price) in pending.iter().zip(prices) {
        offers[*position].pricing.amount = price;
    }

    let mut segments = BTreeMap::new();
    for segment in &ctx.segments {
        let visible: Vec<Value> = offers
            .iter()
            .filter(|o| o.visible_to(segment.as_str()))
            .map(|o| to_json(KIND, o))
            .collect::<CookResult<_>>()?;
        segments.insert(segment.clone(), Value::Array(visible));
    }

    info!(
        game_id = %ctx.game,
        offers = offers.len(),
        derived_prices = pending.len(),
        "Cooked offers"
    );
    Ok(CookedContent { kind: KIND, segments })
}
