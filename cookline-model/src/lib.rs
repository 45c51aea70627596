//! Content model for cookline.
//!
//! Defines the typed records the cook pipeline reads out of raw content
//! collections and the artifacts it produces:
//! - [`ConfigValue`]: a node in a segmented configuration tree
//! - [`EntityNode`] / [`ResolvedNode`]: planning-tree nodes before and after inheritance
//! - [`BalanceModel`]: variables, segments, formulas and [`FunctionLink`]s
//! - [`Offer`], [`PositionedOffer`], [`AbTest`], [`ScheduledEvent`], [`Flow`]
//! - [`CookedArtifact`]: the publishable unit, one per (kind, segment)
//!
//! Every record accepts the camelCase field names used by the authoring
//! tools and keeps unknown fields so cooked output does not drop data.

mod artifact;
mod balance;
mod config;
mod content;
mod entity;
mod event;
mod flow;
mod offer;

pub use artifact::{ArtifactKind, Collection, CookedArtifact};
pub use balance::{
    BalanceFunction, BalanceModel, BalanceModelPart, BalanceSegment, BalanceVariable,
    FunctionLink, VariableOverride,
};
pub use config::{ConfigValue, DerivedType, SegmentValue, is_derived_type};
pub use content::{LocalizationEntry, StatTemplate};
pub use entity::{EntityNode, InheritedConfig, ROOT_NODE_ID, ResolvedNode};
pub use event::{DayRule, EventSegments, Recurrence, RecurrenceMode, ScheduledEvent};
pub use flow::{Flow, FlowNode};
pub use offer::{
    AbTest, MoneyPrice, Offer, OfferContent, OfferOverride, PositionedOffer, PriceOverride,
    Pricing, TargetCurrency,
};

/// Decodes a typed record out of a raw JSON document.
pub fn decode<T: serde::de::DeserializeOwned>(doc: &serde_json::Value) -> serde_json::Result<T> {
    T::deserialize(doc)
}
