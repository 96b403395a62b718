//! SQLite-backed storage engine for the Plexus property graph.
//!
//! The substrate provides ACID transactions, B-tree indexes and FTS5; this
//! crate layers the property graph model on top: interned labels and types,
//! JSON-encoded property maps, adjacency indexes, property/full-text/vector
//! index registries and constraint enforcement.

mod dictionary;
mod fts;
mod indexes;
mod matching;
mod nodes;
mod relationships;
mod schema;
mod traverse;
mod txn;
mod vector;

use std::cell::Cell;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use plexus_core::{Error, Result};

use dictionary::Dictionary;
pub use nodes::PatchMode;
pub use txn::TxnStatus;
pub use vector::{SearchFilter, SemanticSearchOptions, VectorIndexMeta};

/// Tuning knobs for a store instance.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upper bound for variable-length expansion and path searches when the
    /// caller gives none.
    pub max_traversal_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_traversal_depth: 8,
        }
    }
}

/// The storage engine. One instance per database; the caller serializes
/// writers (the facade holds this behind a mutex).
pub struct GraphStore {
    conn: Connection,
    path: Option<PathBuf>,
    options: StoreOptions,
    labels: Dictionary,
    rel_types: Dictionary,
    txn: TxnStatus,
    vectors: vector::VectorRegistry,
    fts5_available: Cell<Option<bool>>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("path", &self.path)
            .field("txn", &self.txn)
            .finish()
    }
}

impl GraphStore {
    /// Opens an on-disk store, creating the file and schema when absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::init(conn, Some(path.to_path_buf()), options)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn, None, options)
    }

    fn init(conn: Connection, path: Option<PathBuf>, options: StoreOptions) -> Result<Self> {
        schema::apply_pragmas(&conn, path.is_some())?;
        schema::bootstrap(&conn)?;
        let labels = Dictionary::load(&conn, "labels")?;
        let rel_types = Dictionary::load(&conn, "rel_types")?;
        let vectors = vector::VectorRegistry::load(&conn)?;
        Ok(Self {
            conn,
            path,
            options,
            labels,
            rel_types,
            txn: TxnStatus::Idle,
            vectors,
            fts5_available: Cell::new(None),
        })
    }

    /// Flushes dirty vector handles and closes the connection.
    pub fn close(mut self) -> Result<()> {
        if self.txn != TxnStatus::Idle {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
        self.persist_vector_handles()?;
        self.conn
            .close()
            .map_err(|(_, err)| sql_err(err))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether the substrate ships the FTS5 extension. Probed once.
    pub fn has_fts5(&self) -> bool {
        if let Some(cached) = self.fts5_available.get() {
            return cached;
        }
        let available = self
            .conn
            .execute_batch(
                "CREATE VIRTUAL TABLE temp.fts5_probe USING fts5(x);
                 DROP TABLE temp.fts5_probe;",
            )
            .is_ok();
        self.fts5_available.set(Some(available));
        available
    }

    pub fn get_node_count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT count(*) FROM nodes", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(sql_err)
    }

    pub fn get_relationship_count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT count(*) FROM relationships", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(sql_err)
    }

    /// Labels in use, sorted. Interned-but-unused labels are included.
    pub fn get_all_labels(&self) -> Vec<String> {
        self.labels.names()
    }

    pub fn get_all_relationship_types(&self) -> Vec<String> {
        self.rel_types.names()
    }

    pub fn get_all_property_keys(&self) -> Result<Vec<String>> {
        let mut keys = std::collections::BTreeSet::new();
        for table in ["nodes", "relationships"] {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT properties FROM {table}"))
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_err)?;
            for row in rows {
                let props = plexus_core::decode_properties(&row.map_err(sql_err)?)?;
                keys.extend(props.into_keys());
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Allocates the next dense id from a meta counter.
    pub(crate) fn allocate_id(&mut self, key: &str) -> Result<u64> {
        let next = schema::read_counter(&self.conn, key)?;
        schema::write_counter(&self.conn, key, next + 1)?;
        Ok(next)
    }

    /// Rebuilds every cache that could have observed rolled-back writes.
    pub(crate) fn reload_caches(&mut self) -> Result<()> {
        self.labels = Dictionary::load(&self.conn, "labels")?;
        self.rel_types = Dictionary::load(&self.conn, "rel_types")?;
        self.vectors = vector::VectorRegistry::load(&self.conn)?;
        Ok(())
    }
}

/// Seconds since epoch, sub-second precision.
pub(crate) fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

/// All substrate failures surface as `Error::Io`.
pub(crate) fn sql_err(err: rusqlite::Error) -> Error {
    Error::Io(format!("sqlite: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_and_count() {
        let store = GraphStore::open_in_memory().unwrap();
        assert_eq!(store.get_node_count().unwrap(), 0);
        assert_eq!(store.get_relationship_count().unwrap(), 0);
    }

    #[test]
    fn bundled_sqlite_ships_fts5() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(store.has_fts5());
    }

    #[test]
    fn reopen_preserves_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let mut store = GraphStore::open(&path).unwrap();
            store
                .create_node(&["Person".to_string()], Default::default())
                .unwrap();
            store.close().unwrap();
        }
        let mut store = GraphStore::open(&path).unwrap();
        let node = store
            .create_node(&["Person".to_string()], Default::default())
            .unwrap();
        assert_eq!(node.id, 2);
    }
}
