//! Collaborator interfaces consumed and produced by the cook pipeline.
//!
//! Each capability is its own trait so components receive exactly the
//! stores they need. [`crate::ContentDb`] implements all of them.

use crate::StorageResult;
use async_trait::async_trait;
use cookline_model::{ArtifactKind, BalanceModel, BalanceModelPart, Collection, EntityNode, FunctionLink};
use cookline_types::{BranchName, ChecksumRecord, GameId, SegmentId};
use serde_json::Value;

/// Raw content collections scoped to `(game, branch)`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns every document in `collection` for the branch, in insertion
    /// order. Documents carry the internal `_id` and `branch` fields.
    async fn find(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<Value>>;

    /// Appends documents to `collection` under the branch. Returns the count written.
    async fn insert_many(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
        docs: Vec<Value>,
    ) -> StorageResult<u64>;

    /// Removes every document in `collection` for the branch. Returns the count removed.
    async fn clear(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<u64>;
}

/// Read access to the balance model of a branch.
#[async_trait]
pub trait BalanceModelReader: Send + Sync {
    /// Loads the requested parts; parts not asked for are left empty.
    async fn get_balance_model(
        &self,
        game: &GameId,
        branch: &BranchName,
        parts: &[BalanceModelPart],
    ) -> StorageResult<BalanceModel>;
}

/// Read access to the planning tree.
#[async_trait]
pub trait NodeReader: Send + Sync {
    async fn planning_nodes(&self, game: &GameId, branch: &BranchName) -> StorageResult<Vec<EntityNode>>;
}

/// Destination for cooked artifacts.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Stores one cooked config, replacing any previous one for the same
    /// `(game, branch, kind, segment)`.
    async fn insert_data(
        &self,
        kind: ArtifactKind,
        config: Value,
        game: &GameId,
        branch: &BranchName,
        segment: &SegmentId,
    ) -> StorageResult<()>;
}

/// Persistence for per-branch checksum records.
#[async_trait]
pub trait ChecksumStore: Send + Sync {
    async fn upsert(&self, record: &ChecksumRecord) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Option<ChecksumRecord>>;
}

/// Write access to function links.
#[async_trait]
pub trait FunctionLinkWriter: Send + Sync {
    /// Replaces the full link set of the branch.
    async fn replace_function_links(
        &self,
        game: &GameId,
        branch: &BranchName,
        links: Vec<FunctionLink>,
    ) -> StorageResult<()>;
}
