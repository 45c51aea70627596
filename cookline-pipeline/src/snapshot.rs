//! Branch snapshots: copies every raw collection of a source branch into the
//! target's `_reference` and `_working` branches and checksums what was copied.
//!
//! Collections are copied independently. A failure part-way through leaves
//! the collections already copied in place; nothing is rolled back.

use crate::error::CookResult;
use cookline_model::Collection;
use cookline_storage::{strip_internal, ContentStore};
use cookline_types::{canonical_checksum, BranchName, BranchState, GameId};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SnapshotManager {
    store: Arc<dyn ContentStore>,
    max_parallel: usize,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn ContentStore>, max_parallel: usize) -> Self {
        Self {
            store,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Duplicates every known collection and returns its checksum.
    pub async fn duplicate_branch(
        &self,
        game: &GameId,
        source: &BranchName,
        target: &BranchName,
    ) -> CookResult<BTreeMap<Collection, u64>> {
        info!(game_id = %game, source = %source, target = %target, "Snapshotting branch");
        let reference = target.with_state(BranchState::Reference);
        let working = target.with_state(BranchState::Working);

        let checksums: Vec<(Collection, u64)> = stream::iter(Collection::ALL)
            .map(|collection| self.duplicate_collection(collection, game, source, &reference, &working))
            .buffer_unordered(self.max_parallel)
            .try_collect()
            .await?;

        info!(game_id = %game, target = %target, collections = checksums.len(), "Snapshot complete");
        Ok(checksums.into_iter().collect())
    }

    async fn duplicate_collection(
        &self,
        collection: Collection,
        game: &GameId,
        source: &BranchName,
        reference: &BranchName,
        working: &BranchName,
    ) -> CookResult<(Collection, u64)> {
        let mut docs = self.store.find(collection, game, source).await?;
        for doc in &mut docs {
            strip_internal(doc);
        }
        let checksum = canonical_checksum(&Value::Array(docs.clone()));

        for branch in [reference, working] {
            self.store.clear(collection, game, branch).await?;
            self.store
                .insert_many(collection, game, branch, docs.clone())
                .await?;
        }

        debug!(
            collection = %collection,
            game_id = %game,
            count = docs.len(),
            checksum,
            "Duplicated collection"
        );
        Ok((collection, checksum))
    }
}
