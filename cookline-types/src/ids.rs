//! Identifier types used throughout the cook pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Segment every player belongs to; the fallback for all segmented values.
pub const EVERYONE_SEGMENT: &str = "everyone";

/// Identifier of a game (tenant) whose content is being cooked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Player cohort identifier. `everyone` is the universal fallback.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `everyone` segment.
    pub fn everyone() -> Self {
        Self(EVERYONE_SEGMENT.to_string())
    }

    pub fn is_everyone(&self) -> bool {
        self.0 == EVERYONE_SEGMENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State suffix carried by a stored branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchState {
    /// Mutable draft copy (`<name>_working`).
    Working,
    /// Read-only audit copy (`<name>_reference`).
    Reference,
    /// Unsuffixed, published content.
    Published,
}

impl BranchState {
    /// Suffix appended to the base branch name, including the separator.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Working => "_working",
            Self::Reference => "_reference",
            Self::Published => "",
        }
    }
}

/// A content branch name, optionally carrying a state suffix.
///
/// `BranchName::parse("1.4_working")` yields base `1.4` with state
/// [`BranchState::Working`]; a name without a known suffix is published.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a branch name from its stored form. Empty names are rejected.
    pub fn parse(name: &str) -> crate::Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidBranch("branch name is empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the stored form, suffix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the branch state derived from the suffix.
    pub fn state(&self) -> BranchState {
        if self.0.ends_with(BranchState::Working.suffix()) {
            BranchState::Working
        } else if self.0.ends_with(BranchState::Reference.suffix()) {
            BranchState::Reference
        } else {
            BranchState::Published
        }
    }

    /// Returns the branch name without its state suffix.
    pub fn base(&self) -> &str {
        let suffix = self.state().suffix();
        &self.0[..self.0.len() - suffix.len()]
    }

    /// Returns the sibling branch with the given state (`1.4` -> `1.4_reference`).
    pub fn with_state(&self, state: BranchState) -> Self {
        Self(format!("{}{}", self.base(), state.suffix()))
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Unique identifier for one cook run.
/// Uses UUID v7 which embeds a timestamp for natural ordering in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
