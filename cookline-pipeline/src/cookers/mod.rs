//! Per-type cookers.
//!
//! Each cooker reads its raw collection from the source branch, transforms
//! it and returns one config per segment. Cookers never write; publishing is
//! the orchestrator's job once every cooker has succeeded.

mod content;
mod entities;
mod events;
mod flows;
mod offers;

pub use content::{cook_ab_tests, cook_localization, cook_positioned_offers, cook_stat_templates};
pub use entities::{cook_entities, CookedEntities};
pub use events::cook_events;
pub use flows::cook_flows;
pub use offers::cook_offers;

use crate::error::{CookError, CookResult};
use chrono::{DateTime, Utc};
use cookline_model::{decode, ArtifactKind, BalanceFunction, BalanceModel, Collection, FunctionLink};
use cookline_sandbox::{FormulaExecutor, FormulaRequest};
use cookline_storage::{strip_internal, ContentStore, NodeReader};
use cookline_types::{BranchName, GameId, SegmentId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inputs shared by every cooker of one run.
#[derive(Clone)]
pub struct CookContext {
    pub game: GameId,
    /// Branch the raw content is read from.
    pub branch: BranchName,
    pub now: DateTime<Utc>,
    /// `everyone` plus every balance-model segment, sorted.
    pub segments: Vec<SegmentId>,
    pub model: Arc<BalanceModel>,
    pub executor: FormulaExecutor,
    pub store: Arc<dyn ContentStore>,
    pub nodes: Arc<dyn NodeReader>,
    pub window_days: i64,
}

impl CookContext {
    /// Reads and decodes every document of `collection` on the source branch.
    pub(crate) async fn load<T: DeserializeOwned>(
        &self,
        collection: Collection,
        kind: ArtifactKind,
    ) -> CookResult<Vec<T>> {
        let docs = self.store.find(collection, &self.game, &self.branch).await?;
        docs.into_iter()
            .map(|mut doc| {
                strip_internal(&mut doc);
                decode(&doc).map_err(|e| CookError::CookerFailed {
                    kind,
                    message: format!("malformed {collection} document: {e}"),
                })
            })
            .collect()
    }

    /// A formula request for the `everyone` segment, attributed to `subject`
    /// on failure.
    pub(crate) fn formula_request(
        &self,
        link: &FunctionLink,
        subject: &str,
    ) -> CookResult<(String, FormulaRequest)> {
        let function = self.linked_function(link, subject)?;
        let request = FormulaRequest::new(function, link, &self.model, &SegmentId::everyone(), self.now)
            .map_err(|e| CookError::from_sandbox(e, function_label(function), subject))?;
        Ok((function_label(function).to_string(), request))
    }

    fn linked_function(&self, link: &FunctionLink, subject: &str) -> CookResult<&BalanceFunction> {
        if link.linked_function_id.is_empty() {
            return Err(CookError::Validation(format!(
                "`{}` on `{subject}` is linked to no function",
                link.value_sid
            )));
        }
        self.model.function(&link.linked_function_id).ok_or_else(|| {
            CookError::Validation(format!(
                "`{}` on `{subject}` is linked to unknown function `{}`",
                link.value_sid, link.linked_function_id
            ))
        })
    }
}

fn function_label(function: &BalanceFunction) -> &str {
    if function.name.is_empty() {
        &function.function_id
    } else {
        &function.name
    }
}

/// Cooked output of one cooker: a config per segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CookedContent {
    pub kind: ArtifactKind,
    pub segments: BTreeMap<SegmentId, Value>,
}

impl CookedContent {
    /// Content published under `everyone` only.
    pub fn everyone(kind: ArtifactKind, config: Value) -> Self {
        Self {
            kind,
            segments: BTreeMap::from([(SegmentId::everyone(), config)]),
        }
    }
}

pub(crate) fn to_json<T: Serialize>(kind: ArtifactKind, value: &T) -> CookResult<Value> {
    serde_json::to_value(value).map_err(|e| CookError::CookerFailed {
        kind,
        message: e.to_string(),
    })
}
