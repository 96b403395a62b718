//! Node CRUD.

use std::collections::BTreeMap;

use rusqlite::params;

use plexus_core::{encode_properties, Error, Node, NodeId, Result, Value};

use crate::{now_seconds, sql_err, GraphStore};

/// How `update_node_properties` treats the existing map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Apply the patch on top; a `null` value removes the key.
    Merge,
    /// Replace the whole property map.
    Replace,
}

impl GraphStore {
    pub fn create_node(
        &mut self,
        labels: &[String],
        properties: BTreeMap<String, Value>,
    ) -> Result<Node> {
        self.with_write(|store| store.create_node_in_txn(labels, properties))
    }

    pub(crate) fn create_node_in_txn(
        &mut self,
        labels: &[String],
        properties: BTreeMap<String, Value>,
    ) -> Result<Node> {
        // Validates value kinds before anything is written.
        let encoded = encode_properties(&properties)?;
        self.enforce_constraints(None, labels, &properties)?;

        let id = self.allocate_id("next_node_id")?;
        let created_at = now_seconds();
        self.conn
            .execute(
                "INSERT INTO nodes (id, properties, created_at) VALUES (?1, ?2, ?3)",
                params![id as i64, encoded, created_at],
            )
            .map_err(sql_err)?;

        for label in labels {
            let label_id = self.labels.get_or_intern(&self.conn, label)?;
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO node_labels (node_id, label_id) VALUES (?1, ?2)",
                    params![id as i64, label_id],
                )
                .map_err(sql_err)?;
        }

        let node = Node {
            id,
            labels: self.labels_of(id)?,
            properties,
            created_at,
        };
        self.refresh_property_entries(&node)?;
        self.refresh_fts_rows(&node)?;
        Ok(node)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node> {
        let row: Option<(String, f64)> = self
            .conn
            .query_row(
                "SELECT properties, created_at FROM nodes WHERE id = ?1",
                [id as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;
        let (encoded, created_at) = row.ok_or_else(|| Error::node_not_found(id))?;
        Ok(Node {
            id,
            labels: self.labels_of(id)?,
            properties: plexus_core::decode_properties(&encoded)?,
            created_at,
        })
    }

    pub fn node_exists(&self, id: NodeId) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM nodes WHERE id = ?1",
                [id as i64],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(sql_err(other)),
            })
    }

    pub fn update_node_properties(
        &mut self,
        id: NodeId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Node> {
        self.with_write(|store| store.update_node_properties_in_txn(id, patch, mode))
    }

    pub(crate) fn update_node_properties_in_txn(
        &mut self,
        id: NodeId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Node> {
        let mut node = self.get_node(id)?;
        node.properties = match mode {
            PatchMode::Replace => patch
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            PatchMode::Merge => {
                let mut merged = node.properties;
                for (key, value) in patch {
                    if value.is_null() {
                        merged.remove(&key);
                    } else {
                        merged.insert(key, value);
                    }
                }
                merged
            }
        };
        self.write_node_properties(&node)?;
        Ok(node)
    }

    /// Persists `node.properties`, re-checking constraints and refreshing
    /// every derived index row.
    pub(crate) fn write_node_properties(&mut self, node: &Node) -> Result<()> {
        let encoded = encode_properties(&node.properties)?;
        self.enforce_constraints(Some(node.id), &node.labels, &node.properties)?;
        let changed = self
            .conn
            .execute(
                "UPDATE nodes SET properties = ?1 WHERE id = ?2",
                params![encoded, node.id as i64],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(Error::node_not_found(node.id));
        }
        self.refresh_property_entries(node)?;
        self.refresh_fts_rows(node)?;
        Ok(())
    }

    pub fn add_labels(&mut self, id: NodeId, labels: &[String]) -> Result<Node> {
        self.with_write(|store| store.add_labels_in_txn(id, labels))
    }

    pub(crate) fn add_labels_in_txn(&mut self, id: NodeId, labels: &[String]) -> Result<Node> {
        let node = self.get_node(id)?;
        let mut all = node.labels.clone();
        for label in labels {
            if !all.contains(label) {
                all.push(label.clone());
            }
        }
        // New labels can bring new constraints with them.
        self.enforce_constraints(Some(id), &all, &node.properties)?;
        for label in labels {
            let label_id = self.labels.get_or_intern(&self.conn, label)?;
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO node_labels (node_id, label_id) VALUES (?1, ?2)",
                    params![id as i64, label_id],
                )
                .map_err(sql_err)?;
        }
        let node = self.get_node(id)?;
        self.refresh_property_entries(&node)?;
        self.refresh_fts_rows(&node)?;
        Ok(node)
    }

    pub fn remove_labels(&mut self, id: NodeId, labels: &[String]) -> Result<Node> {
        self.with_write(|store| store.remove_labels_in_txn(id, labels))
    }

    /// Removing the last label is allowed; the node stays, label-less.
    pub(crate) fn remove_labels_in_txn(&mut self, id: NodeId, labels: &[String]) -> Result<Node> {
        if !self.node_exists(id)? {
            return Err(Error::node_not_found(id));
        }
        for label in labels {
            if let Some(label_id) = self.labels.lookup_id(label) {
                self.conn
                    .execute(
                        "DELETE FROM node_labels WHERE node_id = ?1 AND label_id = ?2",
                        params![id as i64, label_id],
                    )
                    .map_err(sql_err)?;
            }
        }
        let node = self.get_node(id)?;
        self.refresh_property_entries(&node)?;
        self.refresh_fts_rows(&node)?;
        Ok(node)
    }

    pub fn delete_node(&mut self, id: NodeId, detach: bool) -> Result<()> {
        self.with_write(|store| store.delete_node_in_txn(id, detach))
    }

    pub(crate) fn delete_node_in_txn(&mut self, id: NodeId, detach: bool) -> Result<()> {
        if !self.node_exists(id)? {
            return Err(Error::node_not_found(id));
        }
        let incident: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                [id as i64],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if incident > 0 {
            if !detach {
                return Err(Error::constraint(
                    "delete",
                    format!("node {id} still has {incident} relationship(s); use DETACH DELETE"),
                ));
            }
            self.conn
                .execute(
                    "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                    [id as i64],
                )
                .map_err(sql_err)?;
        }

        self.conn
            .execute("DELETE FROM node_labels WHERE node_id = ?1", [id as i64])
            .map_err(sql_err)?;
        self.remove_property_entries(id)?;
        self.remove_fts_rows(id)?;
        self.remove_vector_entries(id)?;
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", [id as i64])
            .map_err(sql_err)?;
        Ok(())
    }

    /// Label names for a node, in interning order.
    pub(crate) fn labels_of(&self, id: NodeId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT label_id FROM node_labels WHERE node_id = ?1 ORDER BY label_id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([id as i64], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(self.labels.lookup_name(row.map_err(sql_err)?)?.to_string());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GraphStore {
        GraphStore::open_in_memory().unwrap()
    }

    fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_and_get() {
        let mut store = store();
        let node = store
            .create_node(
                &["Person".to_string()],
                props(&[("name", Value::from("Alice")), ("age", Value::Int(30))]),
            )
            .unwrap();
        assert_eq!(node.id, 1);

        let loaded = store.get_node(node.id).unwrap();
        assert_eq!(loaded, node);
        assert!(loaded.has_label("Person"));
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = store();
        assert!(matches!(store.get_node(99), Err(Error::NotFound(_))));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut store = store();
        let a = store.create_node(&[], Default::default()).unwrap();
        store.delete_node(a.id, false).unwrap();
        let b = store.create_node(&[], Default::default()).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn merge_patch_removes_on_null() {
        let mut store = store();
        let node = store
            .create_node(&[], props(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
            .unwrap();
        let updated = store
            .update_node_properties(
                node.id,
                props(&[("b", Value::Null), ("c", Value::Int(3))]),
                PatchMode::Merge,
            )
            .unwrap();
        assert_eq!(updated.properties.get("a"), Some(&Value::Int(1)));
        assert_eq!(updated.properties.get("b"), None);
        assert_eq!(updated.properties.get("c"), Some(&Value::Int(3)));
    }

    #[test]
    fn replace_patch_drops_unmentioned_keys() {
        let mut store = store();
        let node = store
            .create_node(&[], props(&[("a", Value::Int(1))]))
            .unwrap();
        let updated = store
            .update_node_properties(node.id, props(&[("z", Value::Int(9))]), PatchMode::Replace)
            .unwrap();
        assert_eq!(updated.properties.len(), 1);
        assert_eq!(updated.properties.get("z"), Some(&Value::Int(9)));
    }

    #[test]
    fn label_add_and_remove_to_empty() {
        let mut store = store();
        let node = store
            .create_node(&["Person".to_string()], Default::default())
            .unwrap();
        let node = store
            .add_labels(node.id, &["Admin".to_string()])
            .unwrap();
        assert_eq!(node.labels.len(), 2);

        let node = store
            .remove_labels(node.id, &["Person".to_string(), "Admin".to_string()])
            .unwrap();
        assert!(node.labels.is_empty(), "empty label set is permitted");
    }

    #[test]
    fn delete_with_relationships_requires_detach() {
        let mut store = store();
        let a = store.create_node(&[], Default::default()).unwrap();
        let b = store.create_node(&[], Default::default()).unwrap();
        store
            .create_relationship(a.id, b.id, "KNOWS", Default::default())
            .unwrap();

        let err = store.delete_node(a.id, false).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));

        store.delete_node(a.id, true).unwrap();
        assert_eq!(store.get_relationship_count().unwrap(), 0);
        assert!(store.node_exists(b.id).unwrap());
    }

    #[test]
    fn storing_entities_is_a_type_error() {
        let mut store = store();
        let node = store.create_node(&[], Default::default()).unwrap();
        let err = store
            .create_node(&[], props(&[("n", Value::Node(node))]))
            .unwrap_err();
        assert!(matches!(err, Error::TypeError(_)));
    }
}
