mod common;

use common::{ints, run, run_with, store, strings};
use plexus_query::Params;

fn seed(store: &mut plexus_storage::GraphStore) {
    run(
        store,
        "CREATE (:Person {name:'Alice', age: 30}),
                (:Person {name:'Bob', age: 25}),
                (:Person:Admin {name:'Carol', age: 35}),
                (:Robot {name:'R2'})",
    );
}

#[test]
fn match_all_nodes() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (n) RETURN count(n) AS n");
    assert_eq!(ints(&result, "n"), vec![4]);
}

#[test]
fn match_by_label() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (p:Person) RETURN count(p) AS n");
    assert_eq!(ints(&result, "n"), vec![3]);

    let result = run(&mut store, "MATCH (p:Person:Admin) RETURN p.name AS name");
    assert_eq!(strings(&result, "name"), vec!["Carol"]);
}

#[test]
fn match_by_inline_properties() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (p:Person {name:'Bob'}) RETURN p.age AS age");
    assert_eq!(ints(&result, "age"), vec![25]);
}

#[test]
fn where_comparisons() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person) WHERE p.age >= 30 RETURN p.name AS name ORDER BY name",
    );
    assert_eq!(strings(&result, "name"), vec!["Alice", "Carol"]);

    let result = run(
        &mut store,
        "MATCH (p:Person) WHERE 25 < p.age < 35 RETURN p.name AS name",
    );
    assert_eq!(strings(&result, "name"), vec!["Alice"]);
}

#[test]
fn where_boolean_connectives() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person) WHERE p.age < 26 OR p.name = 'Carol' RETURN p.name AS name ORDER BY name",
    );
    assert_eq!(strings(&result, "name"), vec!["Bob", "Carol"]);

    let result = run(
        &mut store,
        "MATCH (p:Person) WHERE NOT p.age < 30 RETURN count(p) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn where_string_predicates() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p) WHERE p.name STARTS WITH 'A' RETURN p.name AS name",
    );
    assert_eq!(strings(&result, "name"), vec!["Alice"]);

    let result = run(
        &mut store,
        "MATCH (p) WHERE p.name CONTAINS 'aro' RETURN p.name AS name",
    );
    assert_eq!(strings(&result, "name"), vec!["Carol"]);

    let result = run(
        &mut store,
        "MATCH (p) WHERE p.name =~ '[AB].*' RETURN p.name AS name ORDER BY name",
    );
    assert_eq!(strings(&result, "name"), vec!["Alice", "Bob"]);
}

#[test]
fn where_in_list() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:Person) WHERE p.name IN ['Bob', 'Carol'] RETURN count(p) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn parameters_bind_values() {
    let mut store = store();
    seed(&mut store);
    let mut params = Params::new();
    params.insert("name", "Alice");
    let result = run_with(
        &mut store,
        "MATCH (p:Person {name: $name}) RETURN p.age AS age",
        &params,
    );
    assert_eq!(ints(&result, "age"), vec![30]);
}

#[test]
fn relationship_traversal_with_direction() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (a:P {name:'a'})-[:R]->(b:P {name:'b'})-[:R]->(c:P {name:'c'})",
    );
    let out = run(&mut store, "MATCH (x:P {name:'b'})-[:R]->(y) RETURN y.name AS n");
    assert_eq!(strings(&out, "n"), vec!["c"]);

    let inc = run(&mut store, "MATCH (x:P {name:'b'})<-[:R]-(y) RETURN y.name AS n");
    assert_eq!(strings(&inc, "n"), vec!["a"]);

    let both = run(
        &mut store,
        "MATCH (x:P {name:'b'})-[:R]-(y) RETURN y.name AS n ORDER BY n",
    );
    assert_eq!(strings(&both, "n"), vec!["a", "c"]);
}

#[test]
fn relationship_uniqueness_within_a_pattern() {
    let mut store = store();
    run(&mut store, "CREATE (a:N {name:'a'})-[:R]->(b:N {name:'b'})");
    // The single R edge cannot serve both hops of a two-hop pattern.
    let result = run(&mut store, "MATCH (x)-[:R]->(y)-[:R]->(z) RETURN count(z) AS n");
    assert_eq!(ints(&result, "n"), vec![0]);
}

#[test]
fn multiple_relationship_types() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (a:S {name:'hub'}), (b {name:'x'}), (c {name:'y'}), (d {name:'z'})",
    );
    run(
        &mut store,
        "MATCH (a:S), (b {name:'x'}) CREATE (a)-[:LIKES]->(b)",
    );
    run(
        &mut store,
        "MATCH (a:S), (c {name:'y'}) CREATE (a)-[:HATES]->(c)",
    );
    run(
        &mut store,
        "MATCH (a:S), (d {name:'z'}) CREATE (a)-[:IGNORES]->(d)",
    );
    let result = run(
        &mut store,
        "MATCH (:S)-[:LIKES|HATES]->(t) RETURN t.name AS n ORDER BY n",
    );
    assert_eq!(strings(&result, "n"), vec!["x", "y"]);
}

#[test]
fn null_comparisons_drop_rows() {
    let mut store = store();
    seed(&mut store);
    // Robots have no age; null comparisons are not true.
    let result = run(&mut store, "MATCH (n) WHERE n.age > 0 RETURN count(n) AS n");
    assert_eq!(ints(&result, "n"), vec![3]);

    let result = run(
        &mut store,
        "MATCH (n) WHERE n.age IS NULL RETURN n.name AS name",
    );
    assert_eq!(strings(&result, "name"), vec!["R2"]);
}

#[test]
fn pattern_predicate_in_where() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (a:U {name:'a'})-[:F]->(:U {name:'b'}), (:U {name:'c'})",
    );
    let result = run(
        &mut store,
        "MATCH (u:U) WHERE EXISTS((u)-[:F]->()) RETURN u.name AS n",
    );
    assert_eq!(strings(&result, "n"), vec!["a"]);

    let result = run(
        &mut store,
        "MATCH (u:U) WHERE NOT EXISTS((u)-[:F]->()) RETURN u.name AS n ORDER BY n",
    );
    assert_eq!(strings(&result, "n"), vec!["b", "c"]);
}
