//! DuckDB-backed content store.
//!
//! One connection behind a mutex serves raw content, cooked artifacts and
//! checksum records. Raw documents are stored as JSON text per
//! `(collection, game, branch)`; cooked artifacts are keyed by
//! `(game, branch, kind, segment)` so a later publish replaces them.

use crate::traits::{
    BalanceModelReader, ChecksumStore, ContentCache, ContentStore, FunctionLinkWriter, NodeReader,
};
use crate::{StorageError, StorageResult, open_duckdb_with_wal_recovery, strip_internal};
use async_trait::async_trait;
use cookline_model::{
    ArtifactKind, BalanceModel, BalanceModelPart, Collection, CookedArtifact, EntityNode,
    FunctionLink, decode,
};
use cookline_types::{BranchName, ChecksumRecord, GameId, SegmentId};
use duckdb::{Connection, params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Content store backed by a single DuckDB connection.
#[derive(Clone)]
pub struct ContentDb {
    conn: Arc<Mutex<Connection>>,
}

impl ContentDb {
    /// Opens (or creates) a store at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_duckdb_with_wal_recovery(path)?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Wraps an existing shared connection, creating tables if needed.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE SEQUENCE IF NOT EXISTS content_seq START 1;

            CREATE TABLE IF NOT EXISTS content_items (
                row_id BIGINT PRIMARY KEY DEFAULT nextval('content_seq'),
                collection VARCHAR NOT NULL,
                game_id VARCHAR NOT NULL,
                branch VARCHAR NOT NULL,
                body VARCHAR NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cooked_content (
                game_id VARCHAR NOT NULL,
                branch VARCHAR NOT NULL,
                content_type VARCHAR NOT NULL,
                segment_id VARCHAR NOT NULL,
                config VARCHAR NOT NULL,
                PRIMARY KEY (game_id, branch, content_type, segment_id)
            );

            CREATE TABLE IF NOT EXISTS checksums (
                key VARCHAR PRIMARY KEY,
                checksums VARCHAR NOT NULL,
                updated_at VARCHAR NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Storage("content db mutex poisoned".into()))
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ContentDb) -> StorageResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // ── Raw content ──────────────────────────────────────────────

    /// Returns every document of a collection for `(game, branch)` with
    /// `_id`, `gameID` and `branch` filled in, in insertion order.
    pub fn find_items(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT row_id, body FROM content_items
             WHERE collection = ? AND game_id = ? AND branch = ?
             ORDER BY row_id",
        )?;
        let rows = stmt
            .query_map(
                params![collection.as_str(), game.as_str(), branch.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(row_id, body)| {
                let mut doc: Value = serde_json::from_str(&body)?;
                let obj = doc.as_object_mut().ok_or_else(|| {
                    StorageError::InvalidData(format!("{collection} row {row_id} is not an object"))
                })?;
                obj.insert("_id".into(), Value::from(row_id));
                obj.insert("gameID".into(), Value::from(game.as_str()));
                obj.insert("branch".into(), Value::from(branch.as_str()));
                Ok(doc)
            })
            .collect()
    }

    /// Appends documents in one transaction. Internal fields on the input
    /// are dropped; the row's own game and branch take their place.
    pub fn insert_items(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
        docs: &[Value],
    ) -> StorageResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO content_items (collection, game_id, branch, body) VALUES (?, ?, ?, ?)",
            )?;
            for doc in docs {
                if !doc.is_object() {
                    return Err(StorageError::InvalidData(format!(
                        "{collection} documents must be JSON objects"
                    )));
                }
                let mut body = doc.clone();
                strip_internal(&mut body);
                stmt.execute(params![
                    collection.as_str(),
                    game.as_str(),
                    branch.as_str(),
                    serde_json::to_string(&body)?,
                ])?;
            }
        }
        tx.commit()?;
        debug!(collection = %collection, game_id = %game, branch = %branch, count = docs.len(), "inserted content items");
        Ok(docs.len() as u64)
    }

    /// Deletes a collection's documents for one branch. Returns the number removed.
    pub fn clear_items(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM content_items WHERE collection = ? AND game_id = ? AND branch = ?",
            params![collection.as_str(), game.as_str(), branch.as_str()],
        )?;
        Ok(removed)
    }

    fn decode_items<T: DeserializeOwned>(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<T>> {
        self.find_items(collection, game, branch)?
            .into_iter()
            .map(|mut doc| {
                strip_internal(&mut doc);
                decode(&doc).map_err(StorageError::from)
            })
            .collect()
    }

    /// Loads the requested balance-model parts of a branch.
    pub fn load_balance_model(
        &self,
        game: &GameId,
        branch: &BranchName,
        parts: &[BalanceModelPart],
    ) -> StorageResult<BalanceModel> {
        let mut model = BalanceModel::default();
        for part in parts {
            match part {
                BalanceModelPart::Functions => {
                    model.functions = self.decode_items(Collection::BalanceFunctions, game, branch)?
                }
                BalanceModelPart::Variables => {
                    model.variables = self.decode_items(Collection::BalanceVariables, game, branch)?
                }
                BalanceModelPart::Segments => {
                    model.segments = self.decode_items(Collection::BalanceSegments, game, branch)?
                }
                BalanceModelPart::Links => {
                    model.links = self.decode_items(Collection::FunctionLinks, game, branch)?
                }
            }
        }
        Ok(model)
    }

    pub fn load_planning_nodes(
        &self,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<EntityNode>> {
        self.decode_items(Collection::PlanningNodes, game, branch)
    }

    /// Replaces the branch's function links atomically.
    pub fn write_function_links(
        &self,
        game: &GameId,
        branch: &BranchName,
        links: &[FunctionLink],
    ) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM content_items WHERE collection = ? AND game_id = ? AND branch = ?",
            params![Collection::FunctionLinks.as_str(), game.as_str(), branch.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO content_items (collection, game_id, branch, body) VALUES (?, ?, ?, ?)",
            )?;
            for link in links {
                stmt.execute(params![
                    Collection::FunctionLinks.as_str(),
                    game.as_str(),
                    branch.as_str(),
                    serde_json::to_string(link)?,
                ])?;
            }
        }
        tx.commit()?;
        debug!(game_id = %game, branch = %branch, count = links.len(), "replaced function links");
        Ok(())
    }

    // ── Cooked content ───────────────────────────────────────────

    pub fn store_artifact(
        &self,
        kind: ArtifactKind,
        config: &Value,
        game: &GameId,
        branch: &BranchName,
        segment: &SegmentId,
    ) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cooked_content (game_id, branch, content_type, segment_id, config)
             VALUES (?, ?, ?, ?, ?)",
            params![
                game.as_str(),
                branch.as_str(),
                kind.as_str(),
                segment.as_str(),
                serde_json::to_string(config)?,
            ],
        )?;
        Ok(())
    }

    /// The cooked config for one `(kind, segment)`, if published.
    pub fn cooked_config(
        &self,
        game: &GameId,
        branch: &BranchName,
        kind: ArtifactKind,
        segment: &SegmentId,
    ) -> StorageResult<Option<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT config FROM cooked_content
             WHERE game_id = ? AND branch = ? AND content_type = ? AND segment_id = ?",
        )?;
        let mut rows = stmt.query_map(
            params![game.as_str(), branch.as_str(), kind.as_str(), segment.as_str()],
            |row| row.get::<_, String>(0),
        )?;
        match rows.next() {
            Some(body) => Ok(Some(serde_json::from_str(&body?)?)),
            None => Ok(None),
        }
    }

    /// Every cooked artifact of a branch, ordered by kind then segment.
    pub fn cooked_artifacts(
        &self,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<CookedArtifact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT content_type, segment_id, config FROM cooked_content
             WHERE game_id = ? AND branch = ?
             ORDER BY content_type, segment_id",
        )?;
        let rows = stmt
            .query_map(params![game.as_str(), branch.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(kind, segment, config)| {
                let kind = ArtifactKind::parse(&kind)
                    .ok_or_else(|| StorageError::InvalidData(format!("unknown content type: {kind}")))?;
                Ok(CookedArtifact {
                    game_id: game.clone(),
                    branch: branch.clone(),
                    segment_id: SegmentId::new(segment),
                    kind,
                    config: serde_json::from_str(&config)?,
                })
            })
            .collect()
    }

    // ── Checksums ────────────────────────────────────────────────

    pub fn save_checksums(&self, record: &ChecksumRecord) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO checksums (key, checksums, updated_at) VALUES (?, ?, ?)",
            params![
                record.key,
                serde_json::to_string(&record.checksums)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_checksums(&self, key: &str) -> StorageResult<Option<ChecksumRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT checksums FROM checksums WHERE key = ?")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(body) => {
                let checksums: BTreeMap<String, u64> = serde_json::from_str(&body?)?;
                Ok(Some(ChecksumRecord {
                    key: key.to_string(),
                    checksums,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ContentStore for ContentDb {
    async fn find(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<Vec<Value>> {
        let (game, branch) = (game.clone(), branch.clone());
        self.blocking(move |db| db.find_items(collection, &game, &branch))
            .await
    }

    async fn insert_many(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
        docs: Vec<Value>,
    ) -> StorageResult<u64> {
        let (game, branch) = (game.clone(), branch.clone());
        self.blocking(move |db| db.insert_items(collection, &game, &branch, &docs))
            .await
    }

    async fn clear(
        &self,
        collection: Collection,
        game: &GameId,
        branch: &BranchName,
    ) -> StorageResult<u64> {
        let (game, branch) = (game.clone(), branch.clone());
        self.blocking(move |db| db.clear_items(collection, &game, &branch))
            .await
            .map(|removed| removed as u64)
    }
}

#[async_trait]
impl BalanceModelReader for ContentDb {
    async fn get_balance_model(
        &self,
        game: &GameId,
        branch: &BranchName,
        parts: &[BalanceModelPart],
    ) -> StorageResult<BalanceModel> {
        let (game, branch, parts) = (game.clone(), branch.clone(), parts.to_vec());
        self.blocking(move |db| db.load_balance_model(&game, &branch, &parts))
            .await
    }
}

#[async_trait]
impl NodeReader for ContentDb {
    async fn planning_nodes(&self, game: &GameId, branch: &BranchName) -> StorageResult<Vec<EntityNode>> {
        let (game, branch) = (game.clone(), branch.clone());
        self.blocking(move |db| db.load_planning_nodes(&game, &branch))
            .await
    }
}

#[async_trait]
impl ContentCache for ContentDb {
    async fn insert_data(
        &self,
        kind: ArtifactKind,
        config: Value,
        game: &GameId,
        branch: &BranchName,
        segment: &SegmentId,
    ) -> StorageResult<()> {
        let (game, branch, segment) = (game.clone(), branch.clone(), segment.clone());
        self.blocking(move |db| db.store_artifact(kind, &config, &game, &branch, &segment))
            .await
    }
}

#[async_trait]
impl ChecksumStore for ContentDb {
    async fn upsert(&self, record: &ChecksumRecord) -> StorageResult<()> {
        let record = record.clone();
        self.blocking(move |db| db.save_checksums(&record)).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ChecksumRecord>> {
        let key = key.to_string();
        self.blocking(move |db| db.load_checksums(&key)).await
    }
}

#[async_trait]
impl FunctionLinkWriter for ContentDb {
    async fn replace_function_links(
        &self,
        game: &GameId,
        branch: &BranchName,
        links: Vec<FunctionLink>,
    ) -> StorageResult<()> {
        let (game, branch) = (game.clone(), branch.clone());
        self.blocking(move |db| db.write_function_links(&game, &branch, &links))
            .await
    }
}
