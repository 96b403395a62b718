#![allow(dead_code)]

use std::sync::atomic::AtomicBool;

use plexus_core::Value;
use plexus_query::{execute, Params, ProcedureRegistry, QueryResult};
use plexus_storage::GraphStore;

pub fn store() -> GraphStore {
    GraphStore::open_in_memory().unwrap()
}

pub fn run(store: &mut GraphStore, query: &str) -> QueryResult {
    run_with(store, query, &Params::new())
}

pub fn run_with(store: &mut GraphStore, query: &str, params: &Params) -> QueryResult {
    let registry = ProcedureRegistry::with_builtins();
    execute(store, &registry, query, params, &AtomicBool::new(false))
        .unwrap_or_else(|err| panic!("query failed: {query}: {err}"))
}

pub fn run_err(store: &mut GraphStore, query: &str) -> plexus_core::Error {
    let registry = ProcedureRegistry::with_builtins();
    execute(
        store,
        &registry,
        query,
        &Params::new(),
        &AtomicBool::new(false),
    )
    .expect_err("query should fail")
}

/// Values of a single-column result.
pub fn column(result: &QueryResult, name: &str) -> Vec<Value> {
    result.column_values(name)
}

pub fn strings(result: &QueryResult, name: &str) -> Vec<String> {
    column(result, name)
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => panic!("expected string, got {other:?}"),
        })
        .collect()
}

pub fn ints(result: &QueryResult, name: &str) -> Vec<i64> {
    column(result, name)
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => i,
            other => panic!("expected int, got {other:?}"),
        })
        .collect()
}
