//! Relationship CRUD.

use std::collections::BTreeMap;

use rusqlite::params;

use plexus_core::{
    encode_properties, Error, NodeId, Relationship, RelationshipId, Result, Value,
};

use crate::nodes::PatchMode;
use crate::{sql_err, GraphStore};

impl GraphStore {
    pub fn create_relationship(
        &mut self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: BTreeMap<String, Value>,
    ) -> Result<Relationship> {
        self.with_write(|store| store.create_relationship_in_txn(source, target, rel_type, properties))
    }

    pub(crate) fn create_relationship_in_txn(
        &mut self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: BTreeMap<String, Value>,
    ) -> Result<Relationship> {
        let encoded = encode_properties(&properties)?;
        if !self.node_exists(source)? {
            return Err(Error::node_not_found(source));
        }
        if !self.node_exists(target)? {
            return Err(Error::node_not_found(target));
        }
        let type_id = self.rel_types.get_or_intern(&self.conn, rel_type)?;
        let id = self.allocate_id("next_rel_id")?;
        self.conn
            .execute(
                "INSERT INTO relationships (id, source_id, target_id, type_id, properties)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id as i64, source as i64, target as i64, type_id, encoded],
            )
            .map_err(sql_err)?;
        Ok(Relationship {
            id,
            source_id: source,
            target_id: target,
            rel_type: rel_type.to_string(),
            properties,
        })
    }

    pub fn get_relationship(&self, id: RelationshipId) -> Result<Relationship> {
        let row: Option<(i64, i64, i64, String)> = self
            .conn
            .query_row(
                "SELECT source_id, target_id, type_id, properties
                 FROM relationships WHERE id = ?1",
                [id as i64],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;
        let (source, target, type_id, encoded) =
            row.ok_or_else(|| Error::relationship_not_found(id))?;
        Ok(Relationship {
            id,
            source_id: source as NodeId,
            target_id: target as NodeId,
            rel_type: self.rel_types.lookup_name(type_id)?.to_string(),
            properties: plexus_core::decode_properties(&encoded)?,
        })
    }

    pub fn update_relationship_properties(
        &mut self,
        id: RelationshipId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Relationship> {
        self.with_write(|store| store.update_relationship_properties_in_txn(id, patch, mode))
    }

    pub(crate) fn update_relationship_properties_in_txn(
        &mut self,
        id: RelationshipId,
        patch: BTreeMap<String, Value>,
        mode: PatchMode,
    ) -> Result<Relationship> {
        let mut rel = self.get_relationship(id)?;
        rel.properties = match mode {
            PatchMode::Replace => patch
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            PatchMode::Merge => {
                let mut merged = rel.properties;
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
        let encoded = encode_properties(&rel.properties)?;
        self.conn
            .execute(
                "UPDATE relationships SET properties = ?1 WHERE id = ?2",
                params![encoded, id as i64],
            )
            .map_err(sql_err)?;
        Ok(rel)
    }

    pub fn delete_relationship(&mut self, id: RelationshipId) -> Result<()> {
        self.with_write(|store| store.delete_relationship_in_txn(id))
    }

    pub(crate) fn delete_relationship_in_txn(&mut self, id: RelationshipId) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM relationships WHERE id = ?1", [id as i64])
            .map_err(sql_err)?;
        if deleted == 0 {
            return Err(Error::relationship_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pair() -> (GraphStore, NodeId, NodeId) {
        let mut store = GraphStore::open_in_memory().unwrap();
        let a = store.create_node(&[], Default::default()).unwrap().id;
        let b = store.create_node(&[], Default::default()).unwrap().id;
        (store, a, b)
    }

    #[test]
    fn create_requires_live_endpoints() {
        let (mut store, a, _) = store_with_pair();
        let err = store
            .create_relationship(a, 999, "KNOWS", Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn round_trips_properties() {
        let (mut store, a, b) = store_with_pair();
        let mut props = BTreeMap::new();
        props.insert("since".to_string(), Value::Int(2015));
        let rel = store.create_relationship(a, b, "KNOWS", props).unwrap();

        let loaded = store.get_relationship(rel.id).unwrap();
        assert_eq!(loaded, rel);
        assert_eq!(loaded.rel_type, "KNOWS");
    }

    #[test]
    fn update_and_delete() {
        let (mut store, a, b) = store_with_pair();
        let rel = store
            .create_relationship(a, b, "KNOWS", Default::default())
            .unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("w".to_string(), Value::Float(0.5));
        let updated = store
            .update_relationship_properties(rel.id, patch, PatchMode::Merge)
            .unwrap();
        assert_eq!(updated.properties.get("w"), Some(&Value::Float(0.5)));

        store.delete_relationship(rel.id).unwrap();
        assert!(store.get_relationship(rel.id).is_err());
        assert_eq!(store.get_relationship_count().unwrap(), 0);
    }

    #[test]
    fn invalid_type_name_is_rejected() {
        let (mut store, a, b) = store_with_pair();
        let err = store
            .create_relationship(a, b, "has space", Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeError(_)));
    }
}
