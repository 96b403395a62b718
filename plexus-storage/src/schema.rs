//! Relational schema bootstrap and meta counters.

use rusqlite::Connection;

use plexus_core::Result;

use crate::sql_err;

/// Everything the engine needs, created idempotently on open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY,
    properties TEXT NOT NULL,
    created_at REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS node_labels (
    node_id INTEGER NOT NULL,
    label_id INTEGER NOT NULL,
    PRIMARY KEY (node_id, label_id)
);
CREATE INDEX IF NOT EXISTS idx_node_labels_by_label ON node_labels (label_id, node_id);

CREATE TABLE IF NOT EXISTS rel_types (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    type_id INTEGER NOT NULL,
    properties TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rels_source ON relationships (source_id, type_id);
CREATE INDEX IF NOT EXISTS idx_rels_target ON relationships (target_id, type_id);

CREATE TABLE IF NOT EXISTS property_indexes (
    name TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    property TEXT NOT NULL,
    kind TEXT NOT NULL,
    options TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS property_entries (
    index_name TEXT NOT NULL,
    value TEXT NOT NULL,
    node_id INTEGER NOT NULL,
    PRIMARY KEY (index_name, value, node_id)
);

CREATE TABLE IF NOT EXISTS constraints (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    label TEXT NOT NULL,
    property TEXT NOT NULL,
    value_kind TEXT
);

CREATE TABLE IF NOT EXISTS fulltext_indexes (
    name TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    properties TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vector_indexes (
    name TEXT PRIMARY KEY,
    dim INTEGER NOT NULL,
    metric TEXT NOT NULL,
    method TEXT NOT NULL,
    options TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS vector_entries (
    index_name TEXT NOT NULL,
    node_id INTEGER NOT NULL,
    vector BLOB,
    PRIMARY KEY (index_name, node_id)
);
";

pub(crate) fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).map_err(sql_err)?;
    Ok(())
}

pub(crate) fn apply_pragmas(conn: &Connection, on_disk: bool) -> Result<()> {
    if on_disk {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(sql_err)?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(sql_err)?;
    Ok(())
}

/// Reads a meta counter, defaulting to 1 when unset.
pub(crate) fn read_counter(conn: &Connection, key: &str) -> Result<u64> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(sql_err(other)),
        })?;
    match value {
        Some(text) => text
            .parse::<u64>()
            .map_err(|_| plexus_core::Error::Io(format!("corrupt meta counter {key}: {text}"))),
        None => Ok(1),
    }
}

pub(crate) fn write_counter(conn: &Connection, key: &str, value: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value.to_string()],
    )
    .map_err(sql_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        bootstrap(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'nodes'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn counters_default_and_persist() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        assert_eq!(read_counter(&conn, "next_node_id").unwrap(), 1);
        write_counter(&conn, "next_node_id", 42).unwrap();
        assert_eq!(read_counter(&conn, "next_node_id").unwrap(), 42);
    }
}
