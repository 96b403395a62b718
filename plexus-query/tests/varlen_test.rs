mod common;

use common::{ints, run, store, strings};
use plexus_core::Value;

/// A -[:R]-> B -[:R]-> C -[:R]-> D
fn chain(store: &mut plexus_storage::GraphStore) {
    run(
        store,
        "CREATE (:N {k:'A'})-[:R]->(:N {k:'B'})-[:R]->(:N {k:'C'})-[:R]->(:N {k:'D'})",
    );
}

#[test]
fn bounded_range_reaches_the_right_nodes() {
    let mut store = store();
    chain(&mut store);
    let result = run(
        &mut store,
        "MATCH (a {k:'A'})-[:R*2..3]->(x) RETURN x.k AS k ORDER BY k",
    );
    assert_eq!(strings(&result, "k"), vec!["C", "D"]);
}

#[test]
fn exact_hop_count() {
    let mut store = store();
    chain(&mut store);
    let result = run(&mut store, "MATCH (a {k:'A'})-[:R*2]->(x) RETURN x.k AS k");
    assert_eq!(strings(&result, "k"), vec!["C"]);
}

#[test]
fn zero_length_binds_both_ends_to_the_same_node() {
    let mut store = store();
    chain(&mut store);
    let result = run(
        &mut store,
        "MATCH (a)-[:R*0..0]->(b) RETURN id(a) = id(b) AS same",
    );
    assert_eq!(result.len(), 4);
    assert!(result
        .rows
        .iter()
        .all(|row| row.get("same") == Some(&Value::Bool(true))));
}

#[test]
fn unbounded_star_defaults_min_one() {
    let mut store = store();
    chain(&mut store);
    let result = run(&mut store, "MATCH (a {k:'A'})-[:R*]->(x) RETURN x.k AS k ORDER BY k");
    assert_eq!(strings(&result, "k"), vec!["B", "C", "D"]);
}

#[test]
fn open_upper_bound() {
    let mut store = store();
    chain(&mut store);
    let result = run(&mut store, "MATCH (a {k:'A'})-[:R*2..]->(x) RETURN x.k AS k ORDER BY k");
    assert_eq!(strings(&result, "k"), vec!["C", "D"]);
}

#[test]
fn incoming_variable_length() {
    let mut store = store();
    chain(&mut store);
    let result = run(
        &mut store,
        "MATCH (d {k:'D'})<-[:R*1..2]-(x) RETURN x.k AS k ORDER BY k",
    );
    assert_eq!(strings(&result, "k"), vec!["B", "C"]);
}

#[test]
fn relationship_variable_binds_the_traversed_list() {
    let mut store = store();
    chain(&mut store);
    let result = run(
        &mut store,
        "MATCH (a {k:'A'})-[rs:R*2..3]->(x) RETURN size(rs) AS hops ORDER BY hops",
    );
    assert_eq!(ints(&result, "hops"), vec![2, 3]);
}

#[test]
fn edge_uniqueness_terminates_cycles() {
    let mut store = store();
    run(&mut store, "CREATE (a:C {k:'a'})-[:R]->(b:C {k:'b'})");
    run(&mut store, "MATCH (a {k:'b'}), (b {k:'a'}) CREATE (a)-[:R]->(b)");
    // Two edges forming a cycle: paths cannot reuse an edge, so expansion
    // from 'a' stops after both are used once.
    let result = run(
        &mut store,
        "MATCH (a {k:'a'})-[:R*1..8]->(x) RETURN count(x) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn hop_count_ascending_order() {
    let mut store = store();
    chain(&mut store);
    let result = run(&mut store, "MATCH (a {k:'A'})-[rs:R*1..3]->(x) RETURN x.k AS k");
    // Emission is hop-count ascending, deterministically.
    assert_eq!(strings(&result, "k"), vec!["B", "C", "D"]);
}

#[test]
fn named_path_over_variable_length() {
    let mut store = store();
    chain(&mut store);
    let result = run(
        &mut store,
        "MATCH p = (a {k:'A'})-[:R*2]->(x) RETURN length(p) AS len, size(nodes(p)) AS n",
    );
    assert_eq!(ints(&result, "len"), vec![2]);
    assert_eq!(ints(&result, "n"), vec![3]);
}

#[test]
fn variable_length_with_relationship_property_filter() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (:W {k:'s'})-[:R {w: 1}]->(:W {k:'m'})-[:R {w: 2}]->(:W {k:'e'})",
    );
    let result = run(
        &mut store,
        "MATCH (s {k:'s'})-[:R*1..3 {w: 1}]->(x) RETURN x.k AS k",
    );
    assert_eq!(strings(&result, "k"), vec!["m"]);
}
