mod common;

use common::{column, ints, run, store, strings};
use plexus_core::Value;

fn seed(store: &mut plexus_storage::GraphStore) {
    run(
        store,
        "CREATE (:Person {name:'Alice'}), (:Person {name:'Bob'}), (:Company {name:'TechCorp'})",
    );
    run(
        store,
        "MATCH (a:Person {name:'Alice'}), (c:Company) CREATE (a)-[:WORKS_AT]->(c)",
    );
}

#[test]
fn optional_match_fills_missing_with_null() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person) OPTIONAL MATCH (p)-[:WORKS_AT]->(c)
         RETURN p.name AS p, c.name AS c ORDER BY p",
    );
    assert_eq!(strings(&result, "p"), vec!["Alice", "Bob"]);
    assert_eq!(
        column(&result, "c"),
        vec![Value::String("TechCorp".to_string()), Value::Null]
    );
}

#[test]
fn optional_match_never_reduces_row_count() {
    let mut store = store();
    seed(&mut store);
    let base = run(&mut store, "MATCH (p:Person) RETURN count(p) AS n");
    let optional = run(
        &mut store,
        "MATCH (p:Person) OPTIONAL MATCH (p)-[:NO_SUCH_TYPE]->(x) RETURN count(p) AS n",
    );
    assert_eq!(ints(&base, "n"), ints(&optional, "n"));
}

#[test]
fn optional_match_with_where_inside() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person) OPTIONAL MATCH (p)-[:WORKS_AT]->(c) WHERE c.name = 'Nowhere'
         RETURN p.name AS p, c AS c ORDER BY p",
    );
    assert_eq!(result.len(), 2);
    assert!(column(&result, "c").iter().all(Value::is_null));
}

#[test]
fn optional_match_as_first_clause() {
    let mut store = store();
    let result = run(&mut store, "OPTIONAL MATCH (n:Missing) RETURN n");
    assert_eq!(result.len(), 1);
    assert_eq!(column(&result, "n"), vec![Value::Null]);
}

#[test]
fn chained_optional_bindings_stay_null() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person {name:'Bob'}) OPTIONAL MATCH (p)-[:WORKS_AT]->(c)
         RETURN p.name AS p, c.name AS cn, id(c) AS cid",
    );
    assert_eq!(result.len(), 1);
    assert_eq!(column(&result, "cn"), vec![Value::Null]);
    assert_eq!(column(&result, "cid"), vec![Value::Null]);
}
