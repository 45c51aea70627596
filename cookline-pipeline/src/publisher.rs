//! The commit point of a cook run.

use crate::cookers::CookedContent;
use crate::error::CookResult;
use cookline_model::Collection;
use cookline_storage::{ChecksumStore, ContentCache};
use cookline_types::{BranchName, ChecksumRecord, GameId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) fn checksum_record(
    game: &GameId,
    branch: &BranchName,
    checksums: &BTreeMap<Collection, u64>,
) -> ChecksumRecord {
    checksums
        .iter()
        .fold(ChecksumRecord::new(game, branch), |record, (collection, sum)| {
            record.with_checksum(collection.as_str(), *sum)
        })
}

/// Writes cooked artifacts, then the checksum record of the target branch.
///
/// Artifacts are written one `(kind, segment)` at a time; a failure midway
/// leaves the ones already written in place and skips the checksum record.
pub struct ArtifactPublisher {
    cache: Arc<dyn ContentCache>,
    checksums: Arc<dyn ChecksumStore>,
}

impl ArtifactPublisher {
    pub fn new(cache: Arc<dyn ContentCache>, checksums: Arc<dyn ChecksumStore>) -> Self {
        Self { cache, checksums }
    }

    pub async fn publish(
        &self,
        game: &GameId,
        target: &BranchName,
        cooked: &[CookedContent],
        checksums: &BTreeMap<Collection, u64>,
    ) -> CookResult<()> {
        let mut written = 0usize;
        for content in cooked {
            for (segment, config) in &content.segments {
                self.cache
                    .insert_data(content.kind, config.clone(), game, target, segment)
                    .await?;
                written += 1;
            }
            debug!(game_id = %game, branch = %target, kind = %content.kind, segments = content.segments.len(), "Published artifact");
        }

        self.checksums
            .upsert(&checksum_record(game, target, checksums))
            .await?;

        info!(game_id = %game, branch = %target, artifacts = written, "Published cooked content");
        Ok(())
    }
}
