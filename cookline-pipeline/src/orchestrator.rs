//! Cook orchestration: snapshot, run every cooker, publish on total success.

use crate::config::CookConfig;
use crate::cookers::{
    cook_ab_tests, cook_entities, cook_events, cook_flows, cook_localization, cook_offers,
    cook_positioned_offers, cook_stat_templates, CookContext, CookedContent,
};
use crate::error::{CookError, CookResult};
use crate::publisher::{checksum_record, ArtifactPublisher};
use crate::snapshot::SnapshotManager;
use chrono::{DateTime, Utc};
use cookline_model::{ArtifactKind, BalanceModelPart, Collection};
use cookline_sandbox::FormulaExecutor;
use cookline_storage::{BalanceModelReader, ChecksumStore, ContentCache, ContentDb, ContentStore, NodeReader};
use cookline_types::{BranchName, ChecksumRecord, GameId, RunId, SegmentId};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// One cook run: cook `source` into `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct CookRequest {
    pub game: GameId,
    pub source: BranchName,
    pub target: BranchName,
    /// Instant the formula clock is frozen to and the event window starts at.
    pub now: DateTime<Utc>,
}

impl CookRequest {
    pub fn new(game: GameId, source: BranchName, target: BranchName) -> Self {
        Self {
            game,
            source,
            target,
            now: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// What a successful run published.
#[derive(Debug, Clone)]
pub struct CookReport {
    pub run_id: RunId,
    /// Pre-cook checksums of the source branch.
    pub checksums: BTreeMap<Collection, u64>,
    /// Artifacts published per kind (one per segment).
    pub artifact_counts: BTreeMap<ArtifactKind, usize>,
    pub segments: Vec<SegmentId>,
    /// Collections whose checksum changed since the last publish of the target.
    pub changed_collections: Vec<String>,
    pub duration: Duration,
}

/// The stores a run reads from and publishes to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ContentStore>,
    pub model: Arc<dyn BalanceModelReader>,
    pub nodes: Arc<dyn NodeReader>,
    pub cache: Arc<dyn ContentCache>,
    pub checksums: Arc<dyn ChecksumStore>,
}

impl Collaborators {
    /// Every collaborator served by one database.
    pub fn from_db(db: ContentDb) -> Self {
        let db = Arc::new(db);
        Self {
            store: db.clone(),
            model: db.clone(),
            nodes: db.clone(),
            cache: db.clone(),
            checksums: db,
        }
    }
}

/// Releases the target-branch key when a run ends.
struct RunGuard {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct CookOrchestrator {
    config: CookConfig,
    collaborators: Collaborators,
    executor: FormulaExecutor,
    publisher: ArtifactPublisher,
    active: Arc<Mutex<HashSet<String>>>,
}

impl CookOrchestrator {
    pub fn new(config: CookConfig, collaborators: Collaborators) -> Self {
        let executor = FormulaExecutor::new(config.sandbox.clone());
        let publisher = ArtifactPublisher::new(collaborators.cache.clone(), collaborators.checksums.clone());
        Self {
            config,
            collaborators,
            executor,
            publisher,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn from_db(db: ContentDb, config: CookConfig) -> Self {
        Self::new(config, Collaborators::from_db(db))
    }

    pub fn config(&self) -> &CookConfig {
        &self.config
    }

    fn acquire(&self, key: &str) -> CookResult<Option<RunGuard>> {
        if !self.config.run.branch_lock {
            return Ok(None);
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.to_string()) {
            return Err(CookError::RunInProgress { key: key.to_string() });
        }
        Ok(Some(RunGuard {
            active: self.active.clone(),
            key: key.to_string(),
        }))
    }

    /// Snapshots `source` into `target`, cooks every content type from
    /// `source` and publishes the result under `target`. Nothing is
    /// published unless every cooker succeeds.
    pub async fn cook_branch_content(&self, request: CookRequest) -> CookResult<CookReport> {
        let key = ChecksumRecord::key_for(&request.game, &request.target);
        let _guard = self.acquire(&key)?;

        let run_id = RunId::new();
        let started = Instant::now();
        info!(
            run_id = %run_id,
            game_id = %request.game,
            source = %request.source,
            target = %request.target,
            "Cook run started"
        );

        let result = self.run(&request, run_id, started).await;
        if let Err(e) = &result {
            error!(run_id = %run_id, game_id = %request.game, target = %request.target, error = %e, kind = e.label(), "Cook run failed");
        }
        result
    }

    async fn run(&self, request: &CookRequest, run_id: RunId, started: Instant) -> CookResult<CookReport> {
        let snapshot = SnapshotManager::new(
            self.collaborators.store.clone(),
            self.config.snapshot.max_parallel_collections,
        );
        let checksums = snapshot
            .duplicate_branch(&request.game, &request.source, &request.target)
            .await?;

        let model = self
            .collaborators
            .model
            .get_balance_model(&request.game, &request.source, &BalanceModelPart::ALL)
            .await?;
        let segments: Vec<SegmentId> = model.segment_ids().into_iter().map(SegmentId::new).collect();
        debug!(run_id = %run_id, functions = model.functions.len(), links = model.links.len(), segments = segments.len(), "Loaded balance model");

        let ctx = CookContext {
            game: request.game.clone(),
            branch: request.source.clone(),
            now: request.now,
            segments: segments.clone(),
            model: Arc::new(model),
            executor: self.executor.clone(),
            store: self.collaborators.store.clone(),
            nodes: self.collaborators.nodes.clone(),
            window_days: self.config.events.window_days,
        };

        let cooked = cook_all(&ctx).await?;

        let current = checksum_record(&request.game, &request.target, &checksums);
        let changed_collections = match self.collaborators.checksums.get(&current.key).await? {
            Some(previous) => current.changed_collections(&previous),
            None => current.checksums.keys().cloned().collect(),
        };
        info!(run_id = %run_id, changed = ?changed_collections, "Checksum diff against last publish");

        self.publisher
            .publish(&request.game, &request.target, &cooked, &checksums)
            .await?;

        let report = CookReport {
            run_id,
            checksums,
            artifact_counts: cooked.iter().map(|c| (c.kind, c.segments.len())).collect(),
            segments,
            changed_collections,
            duration: started.elapsed(),
        };
        info!(
            run_id = %run_id,
            game_id = %request.game,
            target = %request.target,
            elapsed_ms = report.duration.as_millis() as u64,
            "Cook run complete"
        );
        Ok(report)
    }
}

async fn timed<T, F>(kind: ArtifactKind, cooker: F) -> CookResult<T>
where
    F: Future<Output = CookResult<T>>,
{
    debug!(kind = %kind, "Cooker started");
    let started = Instant::now();
    let result = cooker.await;
    match &result {
        Ok(_) => debug!(
            kind = %kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cooker finished"
        ),
        Err(e) => error!(kind = %kind, error = %e, "Cooker failed"),
    }
    result
}

/// Runs every cooker to completion. Entities and flows run in sequence,
/// concurrently with the rest. Returns the first failure in kind order.
async fn cook_all(ctx: &CookContext) -> CookResult<Vec<CookedContent>> {
    let entities_then_flows = async {
        match timed(ArtifactKind::Entities, cook_entities(ctx)).await {
            Ok(entities) => {
                let flows = timed(ArtifactKind::Flows, cook_flows(ctx, &entities.resolved)).await;
                (Ok(entities.content), Some(flows))
            }
            Err(e) => (Err(e), None),
        }
    };

    let (offers, positioned, (entities, flows), ab_tests, templates, localization, events) = tokio::join!(
        timed(ArtifactKind::Offers, cook_offers(ctx)),
        timed(ArtifactKind::PositionedOffers, cook_positioned_offers(ctx)),
        entities_then_flows,
        timed(ArtifactKind::AbTests, cook_ab_tests(ctx)),
        timed(ArtifactKind::StatTemplates, cook_stat_templates(ctx)),
        timed(ArtifactKind::Localization, cook_localization(ctx)),
        timed(ArtifactKind::Events, cook_events(ctx)),
    );

    let mut results = vec![offers, positioned, entities, ab_tests, templates, localization, events];
    results.extend(flows);
    results.into_iter().collect()
}
