//! Node and relationship matching, and adjacency.

use std::collections::BTreeMap;

use rusqlite::params;

use plexus_core::{Direction, Node, NodeId, Relationship, Result, Value};

use crate::{sql_err, GraphStore};

impl GraphStore {
    /// All node ids, optionally restricted to one label, ascending.
    pub fn node_ids(&self, label: Option<&str>) -> Result<Vec<NodeId>> {
        match label {
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM nodes ORDER BY id")
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, i64>(0))
                    .map_err(sql_err)?;
                rows.map(|r| r.map(|id| id as NodeId).map_err(sql_err))
                    .collect()
            }
            Some(label) => {
                let Some(label_id) = self.labels.lookup_id(label) else {
                    return Ok(Vec::new());
                };
                let mut stmt = self
                    .conn
                    .prepare(
                        "SELECT node_id FROM node_labels WHERE label_id = ?1 ORDER BY node_id",
                    )
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([label_id], |row| row.get::<_, i64>(0))
                    .map_err(sql_err)?;
                rows.map(|r| r.map(|id| id as NodeId).map_err(sql_err))
                    .collect()
            }
        }
    }

    pub(crate) fn nodes_with_label(&self, label: &str) -> Result<Vec<Node>> {
        self.node_ids(Some(label))?
            .into_iter()
            .map(|id| self.get_node(id))
            .collect()
    }

    /// Label-set intersection plus property equality, using the best
    /// available index: a matching property index first, then the smallest
    /// label's node list, then a full scan.
    pub fn match_nodes(
        &self,
        labels: &[String],
        properties: &BTreeMap<String, Value>,
    ) -> Result<Vec<Node>> {
        let candidates = self.candidate_ids(labels, properties)?;
        let mut out = Vec::new();
        for id in candidates {
            let node = self.get_node(id)?;
            if node_matches(&node, labels, properties) {
                out.push(node);
            }
        }
        Ok(out)
    }

    fn candidate_ids(
        &self,
        labels: &[String],
        properties: &BTreeMap<String, Value>,
    ) -> Result<Vec<NodeId>> {
        for label in labels {
            for (property, value) in properties {
                if value.is_null() {
                    continue;
                }
                if let Some(index_name) = self.property_index_for(label, property)? {
                    return self.index_seek(&index_name, value);
                }
            }
        }
        if let Some(first) = labels.first() {
            // Anchor on the label with the fewest members.
            let mut best = self.node_ids(Some(first))?;
            for label in &labels[1..] {
                let ids = self.node_ids(Some(label))?;
                if ids.len() < best.len() {
                    best = ids;
                }
            }
            return Ok(best);
        }
        self.node_ids(None)
    }

    pub fn match_relationships(
        &self,
        rel_type: Option<&str>,
        properties: &BTreeMap<String, Value>,
    ) -> Result<Vec<Relationship>> {
        let mut out = Vec::new();
        let ids: Vec<i64> = match rel_type {
            Some(name) => {
                let Some(type_id) = self.rel_types.lookup_id(name) else {
                    return Ok(Vec::new());
                };
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM relationships WHERE type_id = ?1 ORDER BY id")
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([type_id], |row| row.get(0))
                    .map_err(sql_err)?;
                rows.collect::<std::result::Result<_, _>>().map_err(sql_err)?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM relationships ORDER BY id")
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], |row| row.get(0)).map_err(sql_err)?;
                rows.collect::<std::result::Result<_, _>>().map_err(sql_err)?
            }
        };
        for id in ids {
            let rel = self.get_relationship(id as u64)?;
            if properties
                .iter()
                .all(|(k, v)| rel.properties.get(k) == Some(v))
            {
                out.push(rel);
            }
        }
        Ok(out)
    }

    /// Incident relationships with their far endpoints, O(deg) through the
    /// `(source_id, type_id)` / `(target_id, type_id)` indexes. Ordered by
    /// relationship id; a self-loop shows up once per matching direction.
    pub fn neighbors(
        &self,
        node_id: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<(Relationship, Node)>> {
        let rels = self.incident_relationships(node_id, direction, rel_type)?;
        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            let far = rel.other_end(node_id);
            out.push((rel, self.get_node(far)?));
        }
        Ok(out)
    }

    pub(crate) fn incident_relationships(
        &self,
        node_id: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let type_id = match rel_type {
            Some(name) => match self.rel_types.lookup_id(name) {
                Some(id) => Some(id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut ids: Vec<i64> = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            ids.extend(self.incident_ids("source_id", node_id, type_id)?);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            ids.extend(self.incident_ids("target_id", node_id, type_id)?);
        }
        ids.sort_unstable();
        ids.dedup();

        ids.into_iter()
            .map(|id| self.get_relationship(id as u64))
            .collect()
    }

    fn incident_ids(&self, column: &str, node_id: NodeId, type_id: Option<i64>) -> Result<Vec<i64>> {
        let mut out = Vec::new();
        match type_id {
            Some(type_id) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!(
                        "SELECT id FROM relationships WHERE {column} = ?1 AND type_id = ?2"
                    ))
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map(params![node_id as i64, type_id], |row| row.get(0))
                    .map_err(sql_err)?;
                for row in rows {
                    out.push(row.map_err(sql_err)?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("SELECT id FROM relationships WHERE {column} = ?1"))
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map([node_id as i64], |row| row.get(0))
                    .map_err(sql_err)?;
                for row in rows {
                    out.push(row.map_err(sql_err)?);
                }
            }
        }
        Ok(out)
    }
}

fn node_matches(node: &Node, labels: &[String], properties: &BTreeMap<String, Value>) -> bool {
    labels.iter().all(|l| node.has_label(l))
        && properties
            .iter()
            .all(|(k, v)| node.properties.get(k) == Some(v))
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

    fn sample() -> (GraphStore, NodeId, NodeId, NodeId) {
        let mut store = GraphStore::open_in_memory().unwrap();
        let alice = store
            .create_node(
                &["Person".to_string()],
                props(&[("name", Value::from("Alice"))]),
            )
            .unwrap()
            .id;
        let bob = store
            .create_node(
                &["Person".to_string(), "Admin".to_string()],
                props(&[("name", Value::from("Bob"))]),
            )
            .unwrap()
            .id;
        let acme = store
            .create_node(
                &["Company".to_string()],
                props(&[("name", Value::from("Acme"))]),
            )
            .unwrap()
            .id;
        store
            .create_relationship(alice, bob, "KNOWS", props(&[("since", Value::Int(2015))]))
            .unwrap();
        store
            .create_relationship(alice, acme, "WORKS_AT", Default::default())
            .unwrap();
        (store, alice, bob, acme)
    }

    #[test]
    fn match_by_label_set_intersection() {
        let (store, _, bob, _) = sample();
        let hits = store
            .match_nodes(
                &["Person".to_string(), "Admin".to_string()],
                &Default::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, bob);
    }

    #[test]
    fn match_by_properties_without_label() {
        let (store, alice, _, _) = sample();
        let hits = store
            .match_nodes(&[], &props(&[("name", Value::from("Alice"))]))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, alice);
    }

    #[test]
    fn unknown_label_matches_nothing() {
        let (store, ..) = sample();
        assert!(store
            .match_nodes(&["Ghost".to_string()], &Default::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn neighbors_by_direction_and_type() {
        let (store, alice, bob, acme) = sample();
        let out = store.neighbors(alice, Direction::Outgoing, None).unwrap();
        assert_eq!(out.len(), 2);

        let knows = store
            .neighbors(alice, Direction::Outgoing, Some("KNOWS"))
            .unwrap();
        assert_eq!(knows.len(), 1);
        assert_eq!(knows[0].1.id, bob);

        let incoming = store.neighbors(acme, Direction::Incoming, None).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].1.id, alice);

        let both = store.neighbors(bob, Direction::Both, None).unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].1.id, alice);
    }

    #[test]
    fn match_relationships_by_type_and_property() {
        let (store, ..) = sample();
        let rels = store
            .match_relationships(Some("KNOWS"), &props(&[("since", Value::Int(2015))]))
            .unwrap();
        assert_eq!(rels.len(), 1);
        assert!(store
            .match_relationships(Some("KNOWS"), &props(&[("since", Value::Int(1999))]))
            .unwrap()
            .is_empty());
        assert_eq!(store.match_relationships(None, &Default::default()).unwrap().len(), 2);
    }
}
