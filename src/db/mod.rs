//! Vector store on SQLite + sqlite-vec.
//!
//! Each collection binds one embedding model, dimensionality and distance
//! metric. Record rows live in `records`; their vectors live in a per-
//! collection `vec0` table keyed by the record's rowid.
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, info};

pub mod collections;
pub mod index;
pub mod models;
pub mod records;
pub mod search;

pub use index::{IndexError, VectorIndex};
pub use models::{Collection, CollectionStats, MetadataFilter, RecordMetadata, SearchHit};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    embedding_model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    distance_metric TEXT NOT NULL DEFAULT 'cosine',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL,
    record_id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
    UNIQUE (collection_id, record_id)
);

CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection_id);
"#;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "collection '{name}' is bound to {existing_model} ({existing_dims} dims), not {model} ({dims} dims)"
    )]
    CollectionMismatch {
        name: String,
        existing_model: String,
        existing_dims: usize,
        model: String,
        dims: usize,
    },

    #[error("{records} records but {embeddings} embeddings")]
    LengthMismatch { records: usize, embeddings: usize },
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection with sqlite-vec loaded and the schema applied.
pub struct Db {
    pub(crate) conn: Connection,
    location: String,
}

impl Db {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        info!("Opening vector store: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, path.display().to_string())
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, DbError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self { conn, location })
    }

    /// Where the data lives: a file path or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }
}

/// Serialize a float32 vector into the little-endian blob vec0 expects.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory().expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('collections', 'records')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
        assert_eq!(db.location(), ":memory:");
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store/coderag.db");
        let db = Db::open(&path).unwrap();
        assert!(path.exists());
        assert!(db.location().ends_with("coderag.db"));
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
