use plexus::{Database, Params, SemanticSearchOptions, Value};

#[test]
fn graph_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.execute(
            "CREATE (:Person {name:'Alice'})-[:KNOWS {since: 2015}]->(:Person {name:'Bob'})",
            &Params::new(),
        )
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    assert_eq!(db.get_node_count().unwrap(), 2);
    let result = db
        .execute(
            "MATCH (:Person {name:'Alice'})-[r:KNOWS]->(b) RETURN r.since AS since, b.name AS b",
            &Params::new(),
        )
        .unwrap();
    assert_eq!(result.column_values("since"), vec![Value::Int(2015)]);
    assert_eq!(
        result.column_values("b"),
        vec![Value::String("Bob".to_string())]
    );
}

#[test]
fn index_descriptors_are_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.create_node_index("Person", "email").unwrap();
        db.create_fulltext_index("people", "Person", &["name"]).unwrap();
        db.create_vector_index("emb", 2, "cosine", "flat", serde_json::json!({}))
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    let names: Vec<String> = db
        .list_indexes()
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert!(names.contains(&"idx_Person_email".to_string()));
    assert!(names.contains(&"people".to_string()));
    assert!(names.contains(&"emb".to_string()));
}

#[test]
fn vector_index_rebuilds_from_stored_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    let node_id;
    {
        let db = Database::open(path).unwrap();
        db.create_vector_index("emb", 2, "l2", "flat", serde_json::json!({}))
            .unwrap();
        node_id = db.create_node(&["Doc"], Default::default()).unwrap().id;
        db.upsert_embedding("emb", node_id, &[0.6, 0.8]).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    let hits = db
        .semantic_search(
            "emb",
            vec![0.6, 0.8].into(),
            1,
            &SemanticSearchOptions::default(),
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.id, node_id);
}

#[test]
fn node_ids_keep_growing_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    let first;
    {
        let db = Database::open(path).unwrap();
        first = db.create_node(&[], Default::default()).unwrap().id;
        db.delete_node(first, false).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    let second = db.create_node(&[], Default::default()).unwrap().id;
    assert!(second > first, "ids are never reused");
}

#[test]
fn fulltext_rows_are_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.create_fulltext_index("posts", "Post", &["body"]).unwrap();
        db.execute(
            "CREATE (:Post {body:'embedded graph database'})",
            &Params::new(),
        )
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    let hits = db.text_search("posts", "embedded", 5).unwrap();
    assert_eq!(hits.len(), 1);
}
