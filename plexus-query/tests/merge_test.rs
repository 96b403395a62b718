mod common;

use common::{ints, run, store, strings};

#[test]
fn merge_is_idempotent() {
    let mut store = store();
    run(&mut store, "MERGE (p:Person {email:'a@x'})");
    run(&mut store, "MERGE (p:Person {email:'a@x'})");
    assert_eq!(store.get_node_count().unwrap(), 1);
}

#[test]
fn merge_on_create_and_on_match() {
    let mut store = store();
    let statement =
        "MERGE (p:Person {email:'a@x'}) ON CREATE SET p.n = 1 ON MATCH SET p.n = p.n + 1";
    run(&mut store, statement);
    run(&mut store, statement);

    let result = run(&mut store, "MATCH (p:Person {email:'a@x'}) RETURN p.n AS n");
    assert_eq!(ints(&result, "n"), vec![2]);
    assert_eq!(store.get_node_count().unwrap(), 1);
}

#[test]
fn merge_respects_the_whole_pattern_key() {
    let mut store = store();
    run(&mut store, "MERGE (:City {name:'Oslo'})");
    run(&mut store, "MERGE (:City {name:'Rome'})");
    run(&mut store, "MERGE (:City {name:'Oslo'})");
    let result = run(&mut store, "MATCH (c:City) RETURN count(c) AS n");
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn merge_relationship_between_bound_nodes() {
    let mut store = store();
    run(&mut store, "CREATE (:U {name:'a'}), (:U {name:'b'})");
    let statement = "MATCH (a:U {name:'a'}), (b:U {name:'b'}) MERGE (a)-[:KNOWS]->(b)";
    run(&mut store, statement);
    run(&mut store, statement);
    assert_eq!(store.get_relationship_count().unwrap(), 1);
    assert_eq!(store.get_node_count().unwrap(), 2);
}

#[test]
fn merge_creates_the_full_pattern_when_no_match() {
    let mut store = store();
    run(&mut store, "MERGE (:A {k: 1})-[:LINK]->(:B {k: 2})");
    assert_eq!(store.get_node_count().unwrap(), 2);
    assert_eq!(store.get_relationship_count().unwrap(), 1);

    // Identical pattern matches now; nothing new is created.
    run(&mut store, "MERGE (:A {k: 1})-[:LINK]->(:B {k: 2})");
    assert_eq!(store.get_node_count().unwrap(), 2);
    assert_eq!(store.get_relationship_count().unwrap(), 1);
}

#[test]
fn merge_binds_the_matched_node() {
    let mut store = store();
    run(&mut store, "CREATE (:Tag {name:'rust', uses: 7})");
    let result = run(&mut store, "MERGE (t:Tag {name:'rust'}) RETURN t.uses AS uses");
    assert_eq!(ints(&result, "uses"), vec![7]);
}

#[test]
fn merge_per_input_row() {
    let mut store = store();
    run(
        &mut store,
        "UNWIND ['x', 'y', 'x'] AS name MERGE (:Tag {name: name})",
    );
    let result = run(&mut store, "MATCH (t:Tag) RETURN t.name AS n ORDER BY n");
    assert_eq!(strings(&result, "n"), vec!["x", "y"]);
}

#[test]
fn merge_with_unique_constraint_matches_existing() {
    let mut store = store();
    run(
        &mut store,
        "CREATE CONSTRAINT FOR (p:Person) REQUIRE p.email IS UNIQUE",
    );
    run(&mut store, "MERGE (p:Person {email:'a@x'}) ON CREATE SET p.created = true");
    run(&mut store, "MERGE (p:Person {email:'a@x'}) ON CREATE SET p.created = false");
    let result = run(
        &mut store,
        "MATCH (p:Person {email:'a@x'}) RETURN count(p) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![1]);
}
