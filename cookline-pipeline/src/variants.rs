//! AB-test and event offer variants.
//!
//! Every live AB test and every active event that names affected offers
//! yields a clone of each referenced offer with the test's or event's field
//! overrides applied, under the id `<offerID>|<testOrEventID>`. Variants are
//! appended after the canonical offers so they go through derived-value
//! resolution exactly like them.

use cookline_model::{AbTest, Offer, OfferOverride, ScheduledEvent};
use std::collections::HashMap;
use tracing::{debug, warn};

fn apply_override(offer: &Offer, patch: &OfferOverride, source_id: &str) -> Offer {
    let mut variant = offer.clone();
    variant.offer_id = format!("{}|{}", offer.offer_id, source_id);
    if let Some(icon) = &patch.icon {
        variant.icon = icon.clone();
    }
    if let Some(content) = &patch.content {
        variant.content = content.clone();
    }
    if let Some(price) = &patch.price {
        if let Some(amount) = &price.amount {
            variant.pricing.amount = amount.clone();
        }
        if let Some(money) = &price.money_curr {
            variant.pricing.money_curr = money.clone();
        }
    }
    variant
}

/// Canonical offers followed by one variant per (test or event, affected offer).
pub fn expand_variants(offers: &[Offer], ab_tests: &[AbTest], events: &[ScheduledEvent]) -> Vec<Offer> {
    let canonical: HashMap<&str, &Offer> = offers
        .iter()
        .filter(|o| !o.is_variant())
        .map(|o| (o.offer_id.as_str(), o))
        .collect();

    let sources = ab_tests
        .iter()
        .filter(|t| t.is_live())
        .map(|t| (t.id.as_str(), t.offers.as_slice()))
        .chain(
            events
                .iter()
                .filter(|e| e.is_active() && !e.affected_offers.is_empty())
                .map(|e| (e.id.as_str(), e.affected_offers.as_slice())),
        );

    let mut expanded = offers.to_vec();
    for (source_id, patches) in sources {
        for patch in patches {
            match canonical.get(patch.offer_id.as_str()) {
                Some(offer) => expanded.push(apply_override(offer, patch, source_id)),
                None => warn!(
                    offer_id = %patch.offer_id,
                    source = %source_id,
                    "Variant references an unknown offer"
                ),
            }
        }
    }
    debug!(canonical = offers.len(), total = expanded.len(), "Expanded offer variants");
    expanded
}
