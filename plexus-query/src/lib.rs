//! Cypher dialect processor for Plexus.
//!
//! A query string goes through the [`lexer`], the [`parser`], the
//! [`planner`] and finally the [`executor`], which runs the operator tree
//! against a [`GraphStore`]. Schema statements (`CREATE INDEX`,
//! `CREATE CONSTRAINT`) bypass the executor and hit the store directly.

pub mod ast;
mod evaluator;
mod executor;
mod functions;
pub mod lexer;
pub mod parser;
pub mod plan;
pub mod planner;
pub mod procedures;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use plexus_core::{ConstraintKind, Error, Result, Value};
use plexus_storage::GraphStore;

pub use executor::{ExecContext, Row};
pub use parser::parse;
pub use procedures::{Procedure, ProcedureRegistry, ProcedureRow};

use ast::ConstraintRequirement;
use planner::{Planned, Planner};

/// Query parameters, referenced as `$name`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Materialized result of one statement.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Single-column convenience accessor.
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Parses, plans and executes one Cypher statement.
pub fn execute(
    store: &mut GraphStore,
    procedures: &ProcedureRegistry,
    query: &str,
    params: &Params,
    cancel: &AtomicBool,
) -> Result<QueryResult> {
    let ast = parser::parse(query)?;
    let planned = Planner::new(store).plan(ast)?;

    match planned {
        Planned::CreateIndex(ci) => {
            if ci.fulltext {
                store.create_fulltext_index(ci.name.as_deref(), &ci.label, &ci.properties)?;
            } else {
                if ci.properties.len() != 1 {
                    return Err(Error::SemanticError(
                        "a property index covers exactly one property".to_string(),
                    ));
                }
                store.create_property_index(ci.name.as_deref(), &ci.label, &ci.properties[0])?;
            }
            Ok(QueryResult::default())
        }
        Planned::CreateConstraint(cc) => {
            let (kind, value_kind) = match &cc.kind {
                ConstraintRequirement::Unique => (ConstraintKind::Unique, None),
                ConstraintRequirement::Exists => (ConstraintKind::Exists, None),
                ConstraintRequirement::OfType(kind) => (ConstraintKind::Type, Some(kind.as_str())),
            };
            store.create_constraint(cc.name.as_deref(), kind, &cc.label, &cc.property, value_kind)?;
            Ok(QueryResult::default())
        }
        Planned::Query { plan, columns } => {
            let registry = procedures;
            let mut ctx = ExecContext {
                store,
                params,
                procedures: registry,
                cancel,
            };
            let rows = executor::run_plan(&mut ctx, &plan, Row::new())?;
            let columns = match columns {
                Some(columns) => columns,
                None => rows
                    .first()
                    .map(|row| row.columns().iter().map(|(k, _)| k.clone()).collect())
                    .unwrap_or_default(),
            };
            Ok(QueryResult { columns, rows })
        }
    }
}
