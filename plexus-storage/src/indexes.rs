//! Property index and constraint registries.
//!
//! Descriptors are durable rows; property index entries are maintained
//! synchronously with node mutations, keyed by the canonical JSON encoding
//! of the indexed value. Constraints are enforced at the mutating call,
//! before anything commits.

use std::collections::BTreeMap;

use rusqlite::params;

use plexus_core::{
    encode_value, ConstraintDescriptor, ConstraintKind, Error, IndexDescriptor, IndexKind, Node,
    NodeId, Result, Value, ValueKind,
};

use crate::{sql_err, GraphStore};

impl GraphStore {
    /// Creates a property index over `(label, property)` and backfills it.
    pub fn create_property_index(
        &mut self,
        name: Option<&str>,
        label: &str,
        property: &str,
    ) -> Result<IndexDescriptor> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("idx_{label}_{property}"));
        self.with_write(|store| store.create_property_index_in_txn(&name, label, property))
    }

    pub(crate) fn create_property_index_in_txn(
        &mut self,
        name: &str,
        label: &str,
        property: &str,
    ) -> Result<IndexDescriptor> {
        if self.index_descriptor(name)?.is_some() {
            return Err(Error::constraint(
                "index",
                format!("an index named '{name}' already exists"),
            ));
        }
        self.conn
            .execute(
                "INSERT INTO property_indexes (name, label, property, kind, options)
                 VALUES (?1, ?2, ?3, 'property', '{}')",
                params![name, label, property],
            )
            .map_err(sql_err)?;
        self.backfill_property_index(name, label, property)?;
        Ok(IndexDescriptor {
            name: name.to_string(),
            kind: IndexKind::Property,
            label: label.to_string(),
            properties: vec![property.to_string()],
            options: BTreeMap::new(),
        })
    }

    fn backfill_property_index(&mut self, name: &str, label: &str, property: &str) -> Result<()> {
        for node in self.nodes_with_label(label)? {
            if let Some(value) = node.properties.get(property) {
                if !value.is_null() {
                    self.insert_property_entry(name, node.id, value)?;
                }
            }
        }
        Ok(())
    }

    /// Drops an index of any kind by name.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.with_write(|store| store.drop_index_in_txn(name))
    }

    pub(crate) fn drop_index_in_txn(&mut self, name: &str) -> Result<()> {
        let dropped_property = self
            .conn
            .execute("DELETE FROM property_indexes WHERE name = ?1", [name])
            .map_err(sql_err)?;
        if dropped_property > 0 {
            self.conn
                .execute("DELETE FROM property_entries WHERE index_name = ?1", [name])
                .map_err(sql_err)?;
            return Ok(());
        }
        if self.drop_fulltext_index_in_txn(name)? {
            return Ok(());
        }
        if self.drop_vector_index_in_txn(name)? {
            return Ok(());
        }
        Err(Error::NotFound(format!("index '{name}'")))
    }

    /// Every index descriptor — property, fulltext and vector.
    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        let mut out = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT name, label, property FROM property_indexes ORDER BY name")
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
        for row in rows {
            let (name, label, property) = row.map_err(sql_err)?;
            out.push(IndexDescriptor {
                name,
                kind: IndexKind::Property,
                label,
                properties: vec![property],
                options: BTreeMap::new(),
            });
        }
        out.extend(self.list_fulltext_descriptors()?);
        out.extend(self.list_vector_descriptors()?);
        Ok(out)
    }

    pub(crate) fn index_descriptor(&self, name: &str) -> Result<Option<IndexDescriptor>> {
        Ok(self.list_indexes()?.into_iter().find(|d| d.name == name))
    }

    /// The property index covering `(label, property)`, if one exists.
    pub fn property_index_for(&self, label: &str, property: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT name FROM property_indexes WHERE label = ?1 AND property = ?2",
                params![label, property],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })
    }

    /// Exact-value seek through a property index.
    pub fn index_seek(&self, index_name: &str, value: &Value) -> Result<Vec<NodeId>> {
        let key = serde_json::to_string(&encode_value(value)?)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT node_id FROM property_entries
                 WHERE index_name = ?1 AND value = ?2 ORDER BY node_id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![index_name, key], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(sql_err)? as NodeId);
        }
        Ok(out)
    }

    fn insert_property_entry(&self, index_name: &str, node_id: NodeId, value: &Value) -> Result<()> {
        let key = serde_json::to_string(&encode_value(value)?)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO property_entries (index_name, value, node_id)
                 VALUES (?1, ?2, ?3)",
                params![index_name, key, node_id as i64],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// Drops and re-derives every property index row for `node`.
    pub(crate) fn refresh_property_entries(&mut self, node: &Node) -> Result<()> {
        self.remove_property_entries(node.id)?;
        let mut stmt = self
            .conn
            .prepare("SELECT name, label, property FROM property_indexes")
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
        let mut to_insert = Vec::new();
        for row in rows {
            let (name, label, property) = row.map_err(sql_err)?;
            if !node.has_label(&label) {
                continue;
            }
            if let Some(value) = node.properties.get(&property) {
                if !value.is_null() {
                    to_insert.push((name, value.clone()));
                }
            }
        }
        drop(stmt);
        for (name, value) in to_insert {
            self.insert_property_entry(&name, node.id, &value)?;
        }
        Ok(())
    }

    pub(crate) fn remove_property_entries(&self, node_id: NodeId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM property_entries WHERE node_id = ?1",
                [node_id as i64],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    // ---- constraints ----

    pub fn create_constraint(
        &mut self,
        name: Option<&str>,
        kind: ConstraintKind,
        label: &str,
        property: &str,
        value_kind: Option<&str>,
    ) -> Result<ConstraintDescriptor> {
        let kind_name = match kind {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Exists => "exists",
            ConstraintKind::Type => "type",
        };
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{kind_name}_{label}_{property}"));
        self.with_write(|store| {
            store.create_constraint_in_txn(&name, kind, label, property, value_kind)
        })
    }

    pub(crate) fn create_constraint_in_txn(
        &mut self,
        name: &str,
        kind: ConstraintKind,
        label: &str,
        property: &str,
        value_kind: Option<&str>,
    ) -> Result<ConstraintDescriptor> {
        if kind == ConstraintKind::Type {
            let requested = value_kind.ok_or_else(|| {
                Error::SemanticError("type constraint requires a value kind".to_string())
            })?;
            if ValueKind::parse(requested).is_none() {
                return Err(Error::TypeError(format!("unknown value kind: {requested}")));
            }
        }
        let descriptor = ConstraintDescriptor {
            name: name.to_string(),
            kind,
            label: label.to_string(),
            property: property.to_string(),
            value_kind: value_kind.map(str::to_string),
        };
        // Existing data must already satisfy the constraint.
        self.validate_existing_data(&descriptor)?;
        let kind_name = match kind {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Exists => "exists",
            ConstraintKind::Type => "type",
        };
        self.conn
            .execute(
                "INSERT INTO constraints (name, kind, label, property, value_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, kind_name, label, property, value_kind],
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(_, _) => Error::constraint(
                    "constraint",
                    format!("a constraint named '{name}' already exists"),
                ),
                other => sql_err(other),
            })?;
        Ok(descriptor)
    }

    pub fn drop_constraint(&mut self, name: &str) -> Result<()> {
        self.with_write(|store| {
            let dropped = store
                .conn
                .execute("DELETE FROM constraints WHERE name = ?1", [name])
                .map_err(sql_err)?;
            if dropped == 0 {
                return Err(Error::NotFound(format!("constraint '{name}'")));
            }
            Ok(())
        })
    }

    pub fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, kind, label, property, value_kind FROM constraints ORDER BY name")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (name, kind, label, property, value_kind) = row.map_err(sql_err)?;
            let kind = match kind.as_str() {
                "unique" => ConstraintKind::Unique,
                "exists" => ConstraintKind::Exists,
                _ => ConstraintKind::Type,
            };
            out.push(ConstraintDescriptor {
                name,
                kind,
                label,
                property,
                value_kind,
            });
        }
        Ok(out)
    }

    fn validate_existing_data(&self, descriptor: &ConstraintDescriptor) -> Result<()> {
        let nodes = self.nodes_with_label(&descriptor.label)?;
        match descriptor.kind {
            ConstraintKind::Exists => {
                for node in &nodes {
                    let missing = node
                        .properties
                        .get(&descriptor.property)
                        .map(Value::is_null)
                        .unwrap_or(true);
                    if missing {
                        return Err(Error::constraint(
                            "exists",
                            format!(
                                "node {} lacks required property {}.{}",
                                node.id, descriptor.label, descriptor.property
                            ),
                        ));
                    }
                }
            }
            ConstraintKind::Type => {
                for node in &nodes {
                    self.check_type_constraint(descriptor, node.id, &node.properties)?;
                }
            }
            ConstraintKind::Unique => {
                let mut seen: std::collections::HashMap<String, NodeId> =
                    std::collections::HashMap::new();
                for node in &nodes {
                    if let Some(value) = node.properties.get(&descriptor.property) {
                        if value.is_null() {
                            continue;
                        }
                        let key = serde_json::to_string(&encode_value(value)?)?;
                        if let Some(&existing) = seen.get(&key) {
                            return Err(Error::constraint(
                                "unique",
                                format!(
                                    "nodes {existing} and {} share {}.{} = {value}",
                                    node.id, descriptor.label, descriptor.property
                                ),
                            ));
                        }
                        seen.insert(key, node.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks a prospective node state against all constraints that apply to
    /// its labels. `node_id` is excluded from unique scans so updates can
    /// keep their own value.
    pub(crate) fn enforce_constraints(
        &self,
        node_id: Option<NodeId>,
        labels: &[String],
        properties: &BTreeMap<String, Value>,
    ) -> Result<()> {
        for constraint in self.list_constraints()? {
            if !labels.iter().any(|l| *l == constraint.label) {
                continue;
            }
            match constraint.kind {
                ConstraintKind::Exists => {
                    let missing = properties
                        .get(&constraint.property)
                        .map(Value::is_null)
                        .unwrap_or(true);
                    if missing {
                        return Err(Error::constraint(
                            "exists",
                            format!(
                                "property {}.{} is required",
                                constraint.label, constraint.property
                            ),
                        ));
                    }
                }
                ConstraintKind::Type => {
                    self.check_type_constraint(&constraint, node_id.unwrap_or(0), properties)?;
                }
                ConstraintKind::Unique => {
                    let Some(value) = properties.get(&constraint.property) else {
                        continue;
                    };
                    if value.is_null() {
                        continue;
                    }
                    if let Some(other) = self.node_with_label_property(
                        &constraint.label,
                        &constraint.property,
                        value,
                        node_id,
                    )? {
                        return Err(Error::constraint(
                            "unique",
                            format!(
                                "{}.{} = {value} already taken by node {other}",
                                constraint.label, constraint.property
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_type_constraint(
        &self,
        constraint: &ConstraintDescriptor,
        node_id: NodeId,
        properties: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let Some(value) = properties.get(&constraint.property) else {
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        let required = constraint
            .value_kind
            .as_deref()
            .and_then(ValueKind::parse)
            .ok_or_else(|| {
                Error::TypeError(format!(
                    "constraint {} has an invalid value kind",
                    constraint.name
                ))
            })?;
        if value.kind() != required {
            return Err(Error::constraint(
                "type",
                format!(
                    "node {node_id}: {}.{} must be {}, got {}",
                    constraint.label,
                    constraint.property,
                    required.name(),
                    value.kind().name()
                ),
            ));
        }
        Ok(())
    }

    /// First other node carrying `label` whose `property` equals `value`.
    pub(crate) fn node_with_label_property(
        &self,
        label: &str,
        property: &str,
        value: &Value,
        exclude: Option<NodeId>,
    ) -> Result<Option<NodeId>> {
        if let Some(index_name) = self.property_index_for(label, property)? {
            for id in self.index_seek(&index_name, value)? {
                if Some(id) != exclude {
                    return Ok(Some(id));
                }
            }
            return Ok(None);
        }
        for node in self.nodes_with_label(label)? {
            if Some(node.id) == exclude {
                continue;
            }
            if node.properties.get(property) == Some(value) {
                return Ok(Some(node.id));
            }
        }
        Ok(None)
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

    #[test]
    fn unique_constraint_blocks_duplicates() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_constraint(None, ConstraintKind::Unique, "Person", "email", None)
            .unwrap();
        store
            .create_node(
                &["Person".to_string()],
                props(&[("email", Value::from("a@x"))]),
            )
            .unwrap();
        let err = store
            .create_node(
                &["Person".to_string()],
                props(&[("email", Value::from("a@x"))]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));

        // A different label is unaffected.
        store
            .create_node(&["Robot".to_string()], props(&[("email", Value::from("a@x"))]))
            .unwrap();
    }

    #[test]
    fn exists_constraint_requires_property() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_constraint(None, ConstraintKind::Exists, "Person", "name", None)
            .unwrap();
        let err = store
            .create_node(&["Person".to_string()], Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
    }

    #[test]
    fn type_constraint_checks_kind() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_constraint(None, ConstraintKind::Type, "Person", "age", Some("int"))
            .unwrap();
        store
            .create_node(&["Person".to_string()], props(&[("age", Value::Int(30))]))
            .unwrap();
        let err = store
            .create_node(
                &["Person".to_string()],
                props(&[("age", Value::from("old"))]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
    }

    #[test]
    fn constraint_creation_validates_existing_data() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_node(&["P".to_string()], props(&[("k", Value::Int(1))]))
            .unwrap();
        store
            .create_node(&["P".to_string()], props(&[("k", Value::Int(1))]))
            .unwrap();
        let err = store
            .create_constraint(None, ConstraintKind::Unique, "P", "k", None)
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
    }

    #[test]
    fn property_index_backfills_and_seeks() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = store
            .create_node(&["City".to_string()], props(&[("name", Value::from("Oslo"))]))
            .unwrap();
        store
            .create_node(&["City".to_string()], props(&[("name", Value::from("Rome"))]))
            .unwrap();
        store
            .create_property_index(None, "City", "name")
            .unwrap();

        let name = store.property_index_for("City", "name").unwrap().unwrap();
        let hits = store.index_seek(&name, &Value::from("Oslo")).unwrap();
        assert_eq!(hits, vec![a.id]);
    }

    #[test]
    fn dropped_index_disappears_from_listing() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store.create_property_index(None, "City", "name").unwrap();
        assert_eq!(store.list_indexes().unwrap().len(), 1);
        store.drop_index("idx_City_name").unwrap();
        assert!(store.list_indexes().unwrap().is_empty());
        assert!(store.drop_index("idx_City_name").is_err());
    }

    #[test]
    fn update_keeps_own_unique_value() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .create_constraint(None, ConstraintKind::Unique, "Person", "email", None)
            .unwrap();
        let node = store
            .create_node(
                &["Person".to_string()],
                props(&[("email", Value::from("a@x"))]),
            )
            .unwrap();
        // Re-writing the same value on the same node is not a violation.
        store
            .update_node_properties(
                node.id,
                props(&[("email", Value::from("a@x")), ("n", Value::Int(1))]),
                crate::PatchMode::Merge,
            )
            .unwrap();
    }
}
