mod common;

use common::{column, ints, run, store, strings};
use plexus_core::Value;

#[test]
fn db_labels_lists_known_labels() {
    let mut store = store();
    run(&mut store, "CREATE (:Person), (:City)");
    let result = run(&mut store, "CALL db.labels() YIELD label RETURN label ORDER BY label");
    assert_eq!(strings(&result, "label"), vec!["City", "Person"]);
}

#[test]
fn db_relationship_types() {
    let mut store = store();
    run(&mut store, "CREATE (:A)-[:KNOWS]->(:B)");
    let result = run(
        &mut store,
        "CALL db.relationshipTypes() YIELD relationshipType AS t RETURN t",
    );
    assert_eq!(strings(&result, "t"), vec!["KNOWS"]);
}

#[test]
fn standalone_call_without_yield() {
    let mut store = store();
    run(&mut store, "CREATE (:Person)");
    let result = run(&mut store, "CALL db.labels()");
    assert_eq!(result.columns, vec!["label".to_string()]);
    assert_eq!(result.len(), 1);
}

#[test]
fn db_indexes_reports_descriptors() {
    let mut store = store();
    run(&mut store, "CREATE INDEX FOR (p:Person) ON (p.email)");
    let result = run(
        &mut store,
        "CALL db.indexes() YIELD name, kind RETURN name, kind",
    );
    assert_eq!(strings(&result, "name"), vec!["idx_Person_email"]);
    assert_eq!(strings(&result, "kind"), vec!["property"]);
}

#[test]
fn vector_search_via_procedure() {
    let mut store = store();
    store
        .create_vector_index("embeddings", 3, "l2", "flat", serde_json::json!({}))
        .unwrap();
    run(
        &mut store,
        "CREATE (:Doc {name:'x'}), (:Doc {name:'y'}), (:Doc {name:'z'})",
    );
    for (id, vec) in [(1u64, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.0, 0.0, 1.0])] {
        store.upsert_embedding("embeddings", id, &vec).unwrap();
    }

    let result = run(
        &mut store,
        "CALL db.vector.search('embeddings', [0.9, 0.1, 0.0], 2)
         YIELD node, score RETURN node.name AS name, score",
    );
    assert_eq!(strings(&result, "name"), vec!["x", "y"]);
    let scores = column(&result, "score");
    match (&scores[0], &scores[1]) {
        (Value::Float(a), Value::Float(b)) => assert!(a > b),
        other => panic!("expected float scores, got {other:?}"),
    }
}

#[test]
fn vector_search_with_label_filter() {
    let mut store = store();
    store
        .create_vector_index("embeddings", 2, "l2", "flat", serde_json::json!({}))
        .unwrap();
    run(&mut store, "CREATE (:Doc {name:'x'}), (:Image {name:'y'})");
    store.upsert_embedding("embeddings", 1, &[1.0, 0.0]).unwrap();
    store.upsert_embedding("embeddings", 2, &[0.9, 0.1]).unwrap();

    let result = run(
        &mut store,
        "CALL db.vector.search('embeddings', [1.0, 0.0], 5, {labels: ['Image']})
         YIELD node RETURN node.name AS name",
    );
    assert_eq!(strings(&result, "name"), vec!["y"]);

    let empty = run(
        &mut store,
        "CALL db.vector.search('embeddings', [1.0, 0.0], 5, {labels: ['Unknown']})
         YIELD node RETURN node",
    );
    assert!(empty.is_empty());
}

#[test]
fn fulltext_query_procedure() {
    let mut store = store();
    store
        .create_fulltext_index(Some("posts"), "Post", &["body".to_string()])
        .unwrap();
    run(
        &mut store,
        "CREATE (:Post {body:'graph databases are neat'}), (:Post {body:'cooking rice'})",
    );
    let result = run(
        &mut store,
        "CALL db.index.fulltext.query('posts', 'graph', 5) YIELD node, score
         RETURN node.body AS body, score",
    );
    assert_eq!(strings(&result, "body"), vec!["graph databases are neat"]);
}

#[test]
fn call_feeding_further_clauses() {
    let mut store = store();
    run(&mut store, "CREATE (:Person), (:Person), (:City)");
    let result = run(
        &mut store,
        "CALL db.labels() YIELD label MATCH (n) WHERE label IN labels(n)
         RETURN label, count(n) AS n ORDER BY label",
    );
    assert_eq!(strings(&result, "label"), vec!["City", "Person"]);
    assert_eq!(ints(&result, "n"), vec![1, 2]);
}

#[test]
fn unknown_procedure_is_a_semantic_error() {
    let mut store = store();
    let err = common::run_err(&mut store, "CALL db.nothing() YIELD x RETURN x");
    assert!(matches!(err, plexus_core::Error::SemanticError(_)), "got {err:?}");
}
