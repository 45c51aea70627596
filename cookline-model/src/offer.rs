use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Currency an offer is priced in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCurrency {
    /// Real money, priced per currency in `money_curr`.
    #[default]
    Money,
    /// An in-game entity (soft currency) referenced by `node_id`.
    Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyPrice {
    pub cur: String,
    pub amount: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(default)]
    pub target_currency: TargetCurrency,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub is_derived_amount: bool,
    #[serde(rename = "nodeID", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub money_curr: Vec<MoneyPrice>,
}

impl Pricing {
    /// Whether the amount is computed by a linked formula at cook time.
    pub fn needs_derived_amount(&self) -> bool {
        self.target_currency == TargetCurrency::Entity && self.is_derived_amount
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferContent {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default)]
    pub amount: i64,
}

/// A purchasable bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    #[serde(rename = "offerID")]
    pub offer_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub content: Vec<OfferContent>,
    #[serde(default)]
    pub pricing: Pricing,
    /// Segments that may see this offer; empty means everyone.
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Offer {
    /// Id of the canonical offer this record derives from. Variants carry
    /// `<offerID>|<testOrEventID>`.
    pub fn canonical_id(&self) -> &str {
        self.offer_id
            .split_once('|')
            .map(|(base, _)| base)
            .unwrap_or(&self.offer_id)
    }

    pub fn is_variant(&self) -> bool {
        self.offer_id.contains('|')
    }

    pub fn visible_to(&self, segment_id: &str) -> bool {
        self.segments.is_empty() || self.segments.iter().any(|s| s == segment_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceOverride {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub money_curr: Option<Vec<MoneyPrice>>,
}

/// Field overrides an AB test or event applies to one offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferOverride {
    #[serde(rename = "offerID")]
    pub offer_id: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub content: Option<Vec<OfferContent>>,
    #[serde(default)]
    pub price: Option<PriceOverride>,
}

/// An offer placement (shop slot) listing offers by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedOffer {
    #[serde(rename = "positionID")]
    pub position_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PositionedOffer {
    pub fn visible_to(&self, segment_id: &str) -> bool {
        self.segments.is_empty() || self.segments.iter().any(|s| s == segment_id)
    }
}

/// An AB test over offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_segment: Option<String>,
    #[serde(default)]
    pub offers: Vec<OfferOverride>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AbTest {
    /// Non-archived, started and not paused.
    pub fn is_live(&self) -> bool {
        !self.archived && !self.paused && self.start_date.is_some()
    }
}
