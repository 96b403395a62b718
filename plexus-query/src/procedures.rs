//! Procedure registry and the built-in `db.*` procedures.
//!
//! The registry is per-database state: two databases in one process share
//! nothing. Callers extend it through `register`.

use std::collections::HashMap;
use std::sync::Arc;

use plexus_core::{Error, Result, Value};
use plexus_storage::{GraphStore, SearchFilter, SemanticSearchOptions};

/// One output row of a procedure: `(column, value)` pairs.
pub type ProcedureRow = Vec<(String, Value)>;

pub trait Procedure: Send + Sync {
    fn name(&self) -> &str;
    /// Column names this procedure yields, in order.
    fn columns(&self) -> Vec<String>;
    fn call(&self, store: &mut GraphStore, args: &[Value]) -> Result<Vec<ProcedureRow>>;
}

pub struct ProcedureRegistry {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl Default for ProcedureRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProcedureRegistry {
    pub fn empty() -> Self {
        Self {
            procedures: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(VectorSearchProcedure));
        registry.register(Arc::new(FulltextQueryProcedure));
        registry.register(Arc::new(LabelsProcedure));
        registry.register(Arc::new(RelationshipTypesProcedure));
        registry.register(Arc::new(PropertyKeysProcedure));
        registry.register(Arc::new(IndexesProcedure));
        registry
    }

    pub fn register(&mut self, procedure: Arc<dyn Procedure>) {
        self.procedures
            .insert(procedure.name().to_string(), procedure);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Procedure>> {
        self.procedures.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.procedures.keys().cloned().collect();
        out.sort();
        out
    }
}

fn string_arg(proc: &str, args: &[Value], index: usize) -> Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(Error::SemanticError(format!(
            "{proc} argument {index} must be a string, got {}",
            other.map(|v| v.kind().name()).unwrap_or("nothing")
        ))),
    }
}

fn int_arg(proc: &str, args: &[Value], index: usize) -> Result<i64> {
    match args.get(index) {
        Some(Value::Int(i)) => Ok(*i),
        other => Err(Error::SemanticError(format!(
            "{proc} argument {index} must be an integer, got {}",
            other.map(|v| v.kind().name()).unwrap_or("nothing")
        ))),
    }
}

fn vector_arg(proc: &str, args: &[Value], index: usize) -> Result<Vec<f32>> {
    match args.get(index) {
        Some(Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_f64() {
                    Some(f) => out.push(f as f32),
                    None => {
                        return Err(Error::TypeError(format!(
                            "{proc}: vector entries must be numbers, got {}",
                            item.kind().name()
                        )));
                    }
                }
            }
            Ok(out)
        }
        other => Err(Error::SemanticError(format!(
            "{proc} argument {index} must be a list of numbers, got {}",
            other.map(|v| v.kind().name()).unwrap_or("nothing")
        ))),
    }
}

struct VectorSearchProcedure;

impl Procedure for VectorSearchProcedure {
    fn name(&self) -> &str {
        "db.vector.search"
    }

    fn columns(&self) -> Vec<String> {
        vec!["node".to_string(), "score".to_string()]
    }

    fn call(&self, store: &mut GraphStore, args: &[Value]) -> Result<Vec<ProcedureRow>> {
        let index = string_arg(self.name(), args, 0)?;
        let vector = vector_arg(self.name(), args, 1)?;
        let k = int_arg(self.name(), args, 2)?;
        if k < 0 {
            return Err(Error::SemanticError(
                "db.vector.search: k must be non-negative".to_string(),
            ));
        }

        let mut options = SemanticSearchOptions::default();
        if let Some(Value::Map(map)) = args.get(3) {
            if let Some(Value::List(labels)) = map.get("labels") {
                for label in labels {
                    match label {
                        Value::String(s) => options.filter.labels.push(s.clone()),
                        other => {
                            return Err(Error::TypeError(format!(
                                "db.vector.search: labels must be strings, got {}",
                                other.kind().name()
                            )));
                        }
                    }
                }
            }
            if let Some(Value::Map(properties)) = map.get("properties") {
                options.filter.properties = properties.clone();
            }
            if let Some(Value::Bool(rerank)) = map.get("rerank") {
                options.rerank = *rerank;
            }
            if let Some(Value::Int(multiplier)) = map.get("multiplier") {
                options.candidate_multiplier = (*multiplier).max(1) as usize;
            }
        }

        let hits = store.semantic_search(&index, &vector, k as usize, &options)?;
        Ok(hits
            .into_iter()
            .map(|(node, score)| {
                vec![
                    ("node".to_string(), Value::Node(node)),
                    ("score".to_string(), Value::Float(f64::from(score))),
                ]
            })
            .collect())
    }
}

struct FulltextQueryProcedure;

impl Procedure for FulltextQueryProcedure {
    fn name(&self) -> &str {
        "db.index.fulltext.query"
    }

    fn columns(&self) -> Vec<String> {
        vec!["node".to_string(), "score".to_string()]
    }

    fn call(&self, store: &mut GraphStore, args: &[Value]) -> Result<Vec<ProcedureRow>> {
        let index = string_arg(self.name(), args, 0)?;
        let query = string_arg(self.name(), args, 1)?;
        let k = match args.get(2) {
            Some(Value::Int(k)) if *k >= 0 => *k as usize,
            None => 10,
            Some(other) => {
                return Err(Error::SemanticError(format!(
                    "db.index.fulltext.query: k must be a non-negative integer, got {other}"
                )));
            }
        };
        let hits = store.text_search(&index, &query, k)?;
        Ok(hits
            .into_iter()
            .map(|(node, score)| {
                vec![
                    ("node".to_string(), Value::Node(node)),
                    ("score".to_string(), Value::Float(f64::from(score))),
                ]
            })
            .collect())
    }
}

struct LabelsProcedure;

impl Procedure for LabelsProcedure {
    fn name(&self) -> &str {
        "db.labels"
    }

    fn columns(&self) -> Vec<String> {
        vec!["label".to_string()]
    }

    fn call(&self, store: &mut GraphStore, _args: &[Value]) -> Result<Vec<ProcedureRow>> {
        Ok(store
            .get_all_labels()
            .into_iter()
            .map(|label| vec![("label".to_string(), Value::String(label))])
            .collect())
    }
}

struct RelationshipTypesProcedure;

impl Procedure for RelationshipTypesProcedure {
    fn name(&self) -> &str {
        "db.relationshipTypes"
    }

    fn columns(&self) -> Vec<String> {
        vec!["relationshipType".to_string()]
    }

    fn call(&self, store: &mut GraphStore, _args: &[Value]) -> Result<Vec<ProcedureRow>> {
        Ok(store
            .get_all_relationship_types()
            .into_iter()
            .map(|name| vec![("relationshipType".to_string(), Value::String(name))])
            .collect())
    }
}

struct PropertyKeysProcedure;

impl Procedure for PropertyKeysProcedure {
    fn name(&self) -> &str {
        "db.propertyKeys"
    }

    fn columns(&self) -> Vec<String> {
        vec!["propertyKey".to_string()]
    }

    fn call(&self, store: &mut GraphStore, _args: &[Value]) -> Result<Vec<ProcedureRow>> {
        Ok(store
            .get_all_property_keys()?
            .into_iter()
            .map(|key| vec![("propertyKey".to_string(), Value::String(key))])
            .collect())
    }
}

struct IndexesProcedure;

impl Procedure for IndexesProcedure {
    fn name(&self) -> &str {
        "db.indexes"
    }

    fn columns(&self) -> Vec<String> {
        vec![
            "name".to_string(),
            "kind".to_string(),
            "label".to_string(),
            "properties".to_string(),
        ]
    }

    fn call(&self, store: &mut GraphStore, _args: &[Value]) -> Result<Vec<ProcedureRow>> {
        Ok(store
            .list_indexes()?
            .into_iter()
            .map(|descriptor| {
                let kind = match descriptor.kind {
                    plexus_core::IndexKind::Property => "property",
                    plexus_core::IndexKind::Fulltext => "fulltext",
                    plexus_core::IndexKind::Vector => "vector",
                };
                vec![
                    ("name".to_string(), Value::String(descriptor.name)),
                    ("kind".to_string(), Value::String(kind.to_string())),
                    ("label".to_string(), Value::String(descriptor.label)),
                    (
                        "properties".to_string(),
                        Value::List(
                            descriptor
                                .properties
                                .into_iter()
                                .map(Value::String)
                                .collect(),
                        ),
                    ),
                ]
            })
            .collect())
    }
}
