//! Full-text index registry on FTS5 virtual tables.
//!
//! Each index owns one virtual table `fts_<name>(node_id UNINDEXED, ...)`.
//! Rows track node lifetime: refreshed whenever an indexed node mutates,
//! removed when it dies.

use std::collections::BTreeMap;

use rusqlite::params;

use plexus_core::{is_valid_symbol, Error, IndexDescriptor, IndexKind, Node, NodeId, Result, Value};

use crate::{sql_err, GraphStore};

impl GraphStore {
    pub fn create_fulltext_index(
        &mut self,
        name: Option<&str>,
        label: &str,
        properties: &[String],
    ) -> Result<IndexDescriptor> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("fts_{label}"));
        self.with_write(|store| store.create_fulltext_index_in_txn(&name, label, properties))
    }

    pub(crate) fn create_fulltext_index_in_txn(
        &mut self,
        name: &str,
        label: &str,
        properties: &[String],
    ) -> Result<IndexDescriptor> {
        if !self.has_fts5() {
            return Err(Error::BackendUnavailable(
                "the substrate was built without FTS5".to_string(),
            ));
        }
        if !is_valid_symbol(name) {
            return Err(Error::TypeError(format!("invalid index name: '{name}'")));
        }
        if properties.is_empty() {
            return Err(Error::SemanticError(
                "a fulltext index needs at least one property".to_string(),
            ));
        }
        for property in properties {
            if !is_valid_symbol(property) {
                return Err(Error::TypeError(format!(
                    "invalid property name: '{property}'"
                )));
            }
        }
        if self.index_descriptor(name)?.is_some() {
            return Err(Error::constraint(
                "index",
                format!("an index named '{name}' already exists"),
            ));
        }

        let columns = properties.join(", ");
        self.conn
            .execute_batch(&format!(
                "CREATE VIRTUAL TABLE fts_{name} USING fts5(node_id UNINDEXED, {columns})"
            ))
            .map_err(sql_err)?;
        self.conn
            .execute(
                "INSERT INTO fulltext_indexes (name, label, properties) VALUES (?1, ?2, ?3)",
                params![name, label, serde_json::to_string(properties)?],
            )
            .map_err(sql_err)?;

        // Backfill nodes that already carry the label.
        for node in self.nodes_with_label(label)? {
            self.insert_fts_row(name, properties, &node)?;
        }

        Ok(IndexDescriptor {
            name: name.to_string(),
            kind: IndexKind::Fulltext,
            label: label.to_string(),
            properties: properties.to_vec(),
            options: BTreeMap::new(),
        })
    }

    pub(crate) fn drop_fulltext_index_in_txn(&mut self, name: &str) -> Result<bool> {
        let dropped = self
            .conn
            .execute("DELETE FROM fulltext_indexes WHERE name = ?1", [name])
            .map_err(sql_err)?;
        if dropped == 0 {
            return Ok(false);
        }
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS fts_{name}"))
            .map_err(sql_err)?;
        Ok(true)
    }

    pub(crate) fn list_fulltext_descriptors(&self) -> Result<Vec<IndexDescriptor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, label, properties FROM fulltext_indexes ORDER BY name")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (name, label, properties) = row.map_err(sql_err)?;
            out.push(IndexDescriptor {
                name,
                kind: IndexKind::Fulltext,
                label,
                properties: serde_json::from_str(&properties)?,
                options: BTreeMap::new(),
            });
        }
        Ok(out)
    }

    /// BM25-ranked search over one fulltext index. Higher score is better.
    pub fn text_search(&self, index: &str, query: &str, k: usize) -> Result<Vec<(Node, f32)>> {
        let descriptor = self
            .list_fulltext_descriptors()?
            .into_iter()
            .find(|d| d.name == index)
            .ok_or_else(|| Error::NotFound(format!("fulltext index '{index}'")))?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT node_id, bm25(fts_{0}) FROM fts_{0}
                 WHERE fts_{0} MATCH ?1 ORDER BY bm25(fts_{0}) LIMIT ?2",
                descriptor.name
            ))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![query, k as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (node_id, rank) = row.map_err(sql_err)?;
            // bm25() reports lower-is-better; flip it.
            out.push((self.get_node(node_id as NodeId)?, -rank as f32));
        }
        Ok(out)
    }

    /// Re-derives the FTS rows for `node` across every fulltext index.
    pub(crate) fn refresh_fts_rows(&self, node: &Node) -> Result<()> {
        for descriptor in self.list_fulltext_descriptors()? {
            self.conn
                .execute(
                    &format!("DELETE FROM fts_{} WHERE node_id = ?1", descriptor.name),
                    [node.id as i64],
                )
                .map_err(sql_err)?;
            if node.has_label(&descriptor.label) {
                self.insert_fts_row(&descriptor.name, &descriptor.properties, node)?;
            }
        }
        Ok(())
    }

    pub(crate) fn remove_fts_rows(&self, node_id: NodeId) -> Result<()> {
        for descriptor in self.list_fulltext_descriptors()? {
            self.conn
                .execute(
                    &format!("DELETE FROM fts_{} WHERE node_id = ?1", descriptor.name),
                    [node_id as i64],
                )
                .map_err(sql_err)?;
        }
        Ok(())
    }

    fn insert_fts_row(&self, name: &str, properties: &[String], node: &Node) -> Result<()> {
        let mut columns = vec!["node_id".to_string()];
        columns.extend(properties.iter().cloned());
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO fts_{name} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut params_vec: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Integer(node.id as i64)];
        for property in properties {
            let text = node
                .properties
                .get(property)
                .map(fts_text)
                .unwrap_or_default();
            params_vec.push(rusqlite::types::Value::Text(text));
        }
        self.conn
            .execute(&sql, rusqlite::params_from_iter(params_vec))
            .map_err(sql_err)?;
        Ok(())
    }
}

/// Tokenizable text for one property value. Composites flatten one level;
/// entities never reach here.
fn fts_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::List(items) => items
            .iter()
            .map(fts_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Map(_) => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn store_with_articles() -> GraphStore {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_fulltext_index(Some("articles"), "Article", &["title".to_string(), "body".to_string()])
            .unwrap();
        store
            .create_node(
                &["Article".to_string()],
                props(&[
                    ("title", Value::from("Graph databases in practice")),
                    ("body", Value::from("nodes, relationships and properties")),
                ]),
            )
            .unwrap();
        store
            .create_node(
                &["Article".to_string()],
                props(&[
                    ("title", Value::from("Cooking with sqlite")),
                    ("body", Value::from("a single file holds everything")),
                ]),
            )
            .unwrap();
        store
    }

    #[test]
    fn search_ranks_matches() {
        let store = store_with_articles();
        let hits = store.text_search("articles", "graph", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].0.properties.get("title"),
            Some(&Value::from("Graph databases in practice"))
        );
    }

    #[test]
    fn rows_follow_node_updates_and_deletes() {
        let mut store = store_with_articles();
        let id = store.text_search("articles", "cooking", 10).unwrap()[0].0.id;

        store
            .update_node_properties(
                id,
                props(&[("title", Value::from("Baking with postgres"))]),
                crate::PatchMode::Merge,
            )
            .unwrap();
        assert!(store.text_search("articles", "cooking", 10).unwrap().is_empty());
        assert_eq!(store.text_search("articles", "baking", 10).unwrap().len(), 1);

        store.delete_node(id, true).unwrap();
        assert!(store.text_search("articles", "baking", 10).unwrap().is_empty());
    }

    #[test]
    fn index_is_scoped_to_its_label() {
        let mut store = store_with_articles();
        store
            .create_node(
                &["Comment".to_string()],
                props(&[("title", Value::from("graph stuff"))]),
            )
            .unwrap();
        assert_eq!(store.text_search("articles", "graph", 10).unwrap().len(), 1);
    }

    #[test]
    fn unknown_index_is_not_found() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(matches!(
            store.text_search("nope", "x", 1),
            Err(Error::NotFound(_))
        ));
    }
}
