mod common;

use common::{ints, run, run_err, store, strings};
use plexus_core::Error;

#[test]
fn create_index_registers_and_serves_lookups() {
    let mut store = store();
    run(&mut store, "CREATE INDEX FOR (p:Person) ON (p.email)");
    run(
        &mut store,
        "CREATE (:Person {email:'a@x'}), (:Person {email:'b@x'})",
    );
    // The planner routes this equality through the index seek.
    let result = run(
        &mut store,
        "MATCH (p:Person {email:'a@x'}) RETURN count(p) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![1]);

    let names: Vec<String> = store
        .list_indexes()
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["idx_Person_email"]);
}

#[test]
fn named_index() {
    let mut store = store();
    run(&mut store, "CREATE INDEX person_email FOR (p:Person) ON (p.email)");
    assert!(store
        .list_indexes()
        .unwrap()
        .iter()
        .any(|d| d.name == "person_email"));
}

#[test]
fn fulltext_index_clause() {
    let mut store = store();
    run(
        &mut store,
        "CREATE FULLTEXT INDEX posts FOR (p:Post) ON (p.title, p.body)",
    );
    run(&mut store, "CREATE (:Post {title:'graph stuff', body:'...'})");
    let hits = store.text_search("posts", "graph", 5).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn unique_constraint_via_cypher() {
    let mut store = store();
    run(
        &mut store,
        "CREATE CONSTRAINT FOR (p:Person) REQUIRE p.email IS UNIQUE",
    );
    run(&mut store, "CREATE (:Person {email:'a@x'})");
    let err = run_err(&mut store, "CREATE (:Person {email:'a@x'})");
    assert!(matches!(err, Error::ConstraintViolation { .. }), "got {err:?}");
}

#[test]
fn not_null_constraint_via_cypher() {
    let mut store = store();
    run(
        &mut store,
        "CREATE CONSTRAINT FOR (p:Person) REQUIRE p.name IS NOT NULL",
    );
    let err = run_err(&mut store, "CREATE (:Person {email:'a@x'})");
    assert!(matches!(err, Error::ConstraintViolation { .. }), "got {err:?}");
    run(&mut store, "CREATE (:Person {name:'ok'})");
}

#[test]
fn typed_constraint_via_cypher() {
    let mut store = store();
    run(
        &mut store,
        "CREATE CONSTRAINT FOR (p:Person) REQUIRE p.age IS TYPED integer",
    );
    run(&mut store, "CREATE (:Person {age: 30})");
    let err = run_err(&mut store, "CREATE (:Person {age: 'thirty'})");
    assert!(matches!(err, Error::ConstraintViolation { .. }), "got {err:?}");
}

#[test]
fn schema_clause_cannot_mix_with_query_clauses() {
    let mut store = store();
    let err = run_err(&mut store, "MATCH (n) CREATE INDEX FOR (p:Person) ON (p.x)");
    assert!(matches!(err, Error::SemanticError(_)), "got {err:?}");
}

#[test]
fn drop_index_by_name() {
    let mut store = store();
    run(&mut store, "CREATE INDEX FOR (p:Person) ON (p.email)");
    store.drop_index("idx_Person_email").unwrap();
    assert!(store.list_indexes().unwrap().is_empty());
}

#[test]
fn merge_key_uses_property_index() {
    let mut store = store();
    run(&mut store, "CREATE INDEX FOR (u:User) ON (u.handle)");
    for _ in 0..2 {
        run(&mut store, "MERGE (:User {handle:'ada'})");
    }
    let result = run(&mut store, "MATCH (u:User) RETURN count(u) AS n");
    assert_eq!(ints(&result, "n"), vec![1]);

    let result = run(&mut store, "MATCH (u:User {handle:'ada'}) RETURN u.handle AS h");
    assert_eq!(strings(&result, "h"), vec!["ada"]);
}
