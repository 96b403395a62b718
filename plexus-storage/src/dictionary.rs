//! Label and relationship-type interning.
//!
//! Names are interned to small integer surrogates backed by the `labels` /
//! `rel_types` tables; the in-memory maps are a cache of those tables and
//! are reloaded wholesale after a rollback.

use std::collections::HashMap;

use rusqlite::Connection;

use plexus_core::{is_valid_symbol, Error, Result};

use crate::sql_err;

#[derive(Debug, Default)]
pub(crate) struct Dictionary {
    table: &'static str,
    name_to_id: HashMap<String, i64>,
    id_to_name: HashMap<i64, String>,
}

impl Dictionary {
    pub fn load(conn: &Connection, table: &'static str) -> Result<Self> {
        let mut dict = Self {
            table,
            name_to_id: HashMap::new(),
            id_to_name: HashMap::new(),
        };
        let mut stmt = conn
            .prepare(&format!("SELECT id, name FROM {table}"))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(sql_err)?;
        for row in rows {
            let (id, name) = row.map_err(sql_err)?;
            dict.name_to_id.insert(name.clone(), id);
            dict.id_to_name.insert(id, name);
        }
        Ok(dict)
    }

    /// Returns the surrogate for `name`, interning it if missing.
    pub fn get_or_intern(&mut self, conn: &Connection, name: &str) -> Result<i64> {
        if let Some(&id) = self.name_to_id.get(name) {
            return Ok(id);
        }
        if !is_valid_symbol(name) {
            return Err(Error::TypeError(format!(
                "invalid label or type name: '{name}'"
            )));
        }
        conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", self.table),
            [name],
        )
        .map_err(sql_err)?;
        let id = conn.last_insert_rowid();
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.insert(id, name.to_string());
        Ok(id)
    }

    pub fn lookup_id(&self, name: &str) -> Option<i64> {
        self.name_to_id.get(name).copied()
    }

    pub fn lookup_name(&self, id: i64) -> Result<&str> {
        self.id_to_name
            .get(&id)
            .map(String::as_str)
            .ok_or_else(|| Error::NotFound(format!("{} id {id}", self.table)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.name_to_id.keys().cloned().collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn fresh() -> (Connection, Dictionary) {
        let conn = Connection::open_in_memory().unwrap();
        schema::bootstrap(&conn).unwrap();
        let dict = Dictionary::load(&conn, "labels").unwrap();
        (conn, dict)
    }

    #[test]
    fn intern_round_trips() {
        let (conn, mut dict) = fresh();
        let id = dict.get_or_intern(&conn, "Person").unwrap();
        assert_eq!(dict.get_or_intern(&conn, "Person").unwrap(), id);
        assert_eq!(dict.lookup_name(id).unwrap(), "Person");
        assert_eq!(dict.lookup_id("Person"), Some(id));
    }

    #[test]
    fn survives_reload() {
        let (conn, mut dict) = fresh();
        let id = dict.get_or_intern(&conn, "City").unwrap();
        let reloaded = Dictionary::load(&conn, "labels").unwrap();
        assert_eq!(reloaded.lookup_id("City"), Some(id));
    }

    #[test]
    fn rejects_invalid_names() {
        let (conn, mut dict) = fresh();
        assert!(dict.get_or_intern(&conn, "bad name").is_err());
        assert!(dict.get_or_intern(&conn, "1st").is_err());
    }
}
