use cookline_types::{BranchName, GameId, SegmentId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Raw content collections duplicated by a branch snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Offers,
    PositionedOffers,
    PlanningNodes,
    AbTests,
    Events,
    StatTemplates,
    Localization,
    Flows,
    BalanceFunctions,
    BalanceVariables,
    BalanceSegments,
    FunctionLinks,
}

impl Collection {
    pub const ALL: [Collection; 12] = [
        Collection::Offers,
        Collection::PositionedOffers,
        Collection::PlanningNodes,
        Collection::AbTests,
        Collection::Events,
        Collection::StatTemplates,
        Collection::Localization,
        Collection::Flows,
        Collection::BalanceFunctions,
        Collection::BalanceVariables,
        Collection::BalanceSegments,
        Collection::FunctionLinks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offers => "offers",
            Self::PositionedOffers => "positioned_offers",
            Self::PlanningNodes => "planning_nodes",
            Self::AbTests => "ab_tests",
            Self::Events => "events",
            Self::StatTemplates => "stat_templates",
            Self::Localization => "localization",
            Self::Flows => "flows",
            Self::BalanceFunctions => "balance_functions",
            Self::BalanceVariables => "balance_variables",
            Self::BalanceSegments => "balance_segments",
            Self::FunctionLinks => "function_links",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of cooked artifacts, one cooker each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Offers,
    PositionedOffers,
    Entities,
    AbTests,
    StatTemplates,
    Localization,
    Events,
    Flows,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 8] = [
        ArtifactKind::Offers,
        ArtifactKind::PositionedOffers,
        ArtifactKind::Entities,
        ArtifactKind::AbTests,
        ArtifactKind::StatTemplates,
        ArtifactKind::Localization,
        ArtifactKind::Events,
        ArtifactKind::Flows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offers => "offers",
            Self::PositionedOffers => "positioned_offers",
            Self::Entities => "entities",
            Self::AbTests => "ab_tests",
            Self::StatTemplates => "stat_templates",
            Self::Localization => "localization",
            Self::Events => "events",
            Self::Flows => "flows",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The publishable unit: one cooked config per (kind, segment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookedArtifact {
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    pub branch: BranchName,
    #[serde(rename = "segmentID")]
    pub segment_id: SegmentId,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub config: Value,
}
