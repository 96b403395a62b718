mod common;

use common::{ints, run, run_err, store, strings};
use plexus_core::{Error, Value};

#[test]
fn create_single_node_with_labels_and_properties() {
    let mut store = store();
    run(&mut store, "CREATE (:Person:Admin {name: 'Alice', age: 30})");

    assert_eq!(store.get_node_count().unwrap(), 1);
    let result = run(&mut store, "MATCH (p:Person) RETURN p.name AS name, p.age AS age");
    assert_eq!(strings(&result, "name"), vec!["Alice"]);
    assert_eq!(ints(&result, "age"), vec![30]);
}

#[test]
fn create_returns_bound_variables() {
    let mut store = store();
    let result = run(&mut store, "CREATE (n:Thing {v: 1}) RETURN n.v AS v, id(n) AS id");
    assert_eq!(ints(&result, "v"), vec![1]);
    assert_eq!(ints(&result, "id"), vec![1]);
}

#[test]
fn create_full_pattern() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (a:Person {name:'Ann'})-[:KNOWS {since: 2020}]->(b:Person {name:'Ben'})",
    );
    assert_eq!(store.get_node_count().unwrap(), 2);
    assert_eq!(store.get_relationship_count().unwrap(), 1);

    let result = run(
        &mut store,
        "MATCH (a)-[r:KNOWS]->(b) RETURN a.name AS a, r.since AS since, b.name AS b",
    );
    assert_eq!(strings(&result, "a"), vec!["Ann"]);
    assert_eq!(ints(&result, "since"), vec![2020]);
    assert_eq!(strings(&result, "b"), vec!["Ben"]);
}

#[test]
fn create_relationship_between_matched_nodes() {
    let mut store = store();
    run(&mut store, "CREATE (:City {name:'Oslo'}), (:City {name:'Rome'})");
    run(
        &mut store,
        "MATCH (a:City {name:'Oslo'}), (b:City {name:'Rome'}) CREATE (a)-[:ROUTE {km: 2010}]->(b)",
    );
    let result = run(&mut store, "MATCH (:City {name:'Oslo'})-[r:ROUTE]->(c) RETURN c.name AS c");
    assert_eq!(strings(&result, "c"), vec!["Rome"]);
}

#[test]
fn create_per_input_row() {
    let mut store = store();
    run(&mut store, "UNWIND [1, 2, 3] AS x CREATE (:Num {value: x})");
    let result = run(&mut store, "MATCH (n:Num) RETURN count(n) AS n");
    assert_eq!(ints(&result, "n"), vec![3]);
}

#[test]
fn create_incoming_direction() {
    let mut store = store();
    run(&mut store, "CREATE (a:A)<-[:REL]-(b:B)");
    let result = run(&mut store, "MATCH (b:B)-[:REL]->(a:A) RETURN count(a) AS n");
    assert_eq!(ints(&result, "n"), vec![1]);
}

#[test]
fn create_null_property_is_not_stored() {
    let mut store = store();
    run(&mut store, "CREATE (:T {present: 1, absent: null})");
    let result = run(&mut store, "MATCH (t:T) RETURN t.absent IS NULL AS missing");
    assert_eq!(common::column(&result, "missing"), vec![Value::Bool(true)]);
}

#[test]
fn create_undirected_relationship_is_rejected() {
    let mut store = store();
    let err = run_err(&mut store, "CREATE (:A)-[:REL]-(:B)");
    assert!(matches!(err, Error::SemanticError(_)), "got {err:?}");
}

#[test]
fn create_rebinding_with_labels_is_rejected() {
    let mut store = store();
    run(&mut store, "CREATE (:X)");
    let err = run_err(&mut store, "MATCH (n:X) CREATE (n:Y)");
    assert!(matches!(err, Error::SemanticError(_)), "got {err:?}");
}
