//! Storage layer for the cookline pipeline.
//!
//! Collaborator traits describe what the pipeline reads (raw content,
//! balance model, planning tree) and writes (cooked artifacts, checksum
//! records, function links). [`ContentDb`] implements all of them over
//! DuckDB; its async trait methods run the blocking queries on
//! `tokio::task::spawn_blocking`.

mod content_db;
mod error;
mod traits;

pub use content_db::ContentDb;
pub use error::{StorageError, StorageResult};
pub use traits::{
    BalanceModelReader, ChecksumStore, ContentCache, ContentStore, FunctionLinkWriter, NodeReader,
};

use serde_json::Value;
use tracing::warn;

/// Fields added by the store or the authoring tools that are not content.
pub const INTERNAL_FIELDS: [&str; 4] = ["_id", "__v", "branch", "gameID"];

/// Removes internal identifiers and branch scoping from a document.
pub fn strip_internal(doc: &mut Value) {
    if let Some(obj) = doc.as_object_mut() {
        for field in INTERNAL_FIELDS {
            obj.remove(field);
        }
    }
}

/// Open a DuckDB connection with stale WAL recovery.
///
/// If the initial open fails and a `.wal` file exists alongside the database,
/// it is removed and the open is retried once.
pub fn open_duckdb_with_wal_recovery(path: &std::path::Path) -> StorageResult<duckdb::Connection> {
    match duckdb::Connection::open(path) {
        Ok(conn) => Ok(conn),
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                warn!(wal = %wal_path.display(), "DuckDB open failed, removing stale WAL and retrying");
                if std::fs::remove_file(&wal_path).is_ok() {
                    return duckdb::Connection::open(path).map_err(Into::into);
                }
            }
            Err(first_err.into())
        }
    }
}
