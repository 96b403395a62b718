//! Graph entity types and schema descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;
use crate::{NodeId, RelationshipId};

/// A persistent node: label set plus a property map.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, Value>,
    /// Seconds since epoch at creation time.
    pub created_at: f64,
}

impl Node {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A directed, typed edge between two live nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub rel_type: String,
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The endpoint opposite to `id`, for undirected traversal.
    pub fn other_end(&self, id: NodeId) -> NodeId {
        if self.source_id == id {
            self.target_id
        } else {
            self.source_id
        }
    }
}

/// A materialized path: `nodes.len() == relationships.len() + 1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathValue {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl PathValue {
    pub fn single(node: Node) -> Self {
        Self {
            nodes: vec![node],
            relationships: Vec::new(),
        }
    }

    /// Number of relationships on the path.
    pub fn length(&self) -> usize {
        self.relationships.len()
    }
}

/// Traversal direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Property,
    Fulltext,
    Vector,
}

/// A named index over `label` + `properties`, durable across reopens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub kind: IndexKind,
    pub label: String,
    pub properties: Vec<String>,
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Unique,
    Exists,
    Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
    pub label: String,
    pub property: String,
    /// Required value kind, only for `ConstraintKind::Type`.
    pub value_kind: Option<String>,
}

/// Whether `name` is a legal label or relationship-type name.
pub fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_validation() {
        assert!(is_valid_symbol("Person"));
        assert!(is_valid_symbol("_internal"));
        assert!(is_valid_symbol("KNOWS_2"));
        assert!(!is_valid_symbol(""));
        assert!(!is_valid_symbol("2fast"));
        assert!(!is_valid_symbol("has space"));
        assert!(!is_valid_symbol("dash-ed"));
    }

    #[test]
    fn other_end_flips_direction() {
        let rel = Relationship {
            id: 1,
            source_id: 10,
            target_id: 20,
            rel_type: "KNOWS".to_string(),
            properties: BTreeMap::new(),
        };
        assert_eq!(rel.other_end(10), 20);
        assert_eq!(rel.other_end(20), 10);
    }
}
