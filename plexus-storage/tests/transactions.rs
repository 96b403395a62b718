use plexus_core::{Error, Value};
use plexus_storage::{GraphStore, TxnStatus};

fn props(pairs: &[(&str, Value)]) -> std::collections::BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn commit_makes_writes_visible() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store.begin().unwrap();
    store.create_node(&["T".to_string()], Default::default()).unwrap();
    assert_eq!(store.get_node_count().unwrap(), 1, "read-your-writes");
    store.commit().unwrap();
    assert_eq!(store.get_node_count().unwrap(), 1);
}

#[test]
fn rollback_discards_writes() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store.begin().unwrap();
    store.create_node(&["T".to_string()], Default::default()).unwrap();
    store.rollback().unwrap();
    assert_eq!(store.get_node_count().unwrap(), 0);
    // Interned labels from the rolled-back write are forgotten too.
    assert!(store.get_all_labels().is_empty());
}

#[test]
fn nested_begin_is_rejected() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store.begin().unwrap();
    let err = store.begin().unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));
    store.rollback().unwrap();
}

#[test]
fn commit_without_begin_is_rejected() {
    let mut store = GraphStore::open_in_memory().unwrap();
    assert!(matches!(
        store.commit().unwrap_err(),
        Error::TransactionState(_)
    ));
    assert!(matches!(
        store.rollback().unwrap_err(),
        Error::TransactionState(_)
    ));
}

#[test]
fn failed_statement_aborts_the_transaction() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store.begin().unwrap();
    let err = store.delete_node(999, false).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(store.txn_status(), TxnStatus::Aborted);

    // Every operation except rollback is refused now.
    let err = store.create_node(&[], Default::default()).unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));
    let err = store.commit().unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));

    store.rollback().unwrap();
    assert_eq!(store.txn_status(), TxnStatus::Idle);
    store.create_node(&[], Default::default()).unwrap();
}

#[test]
fn auto_commit_is_atomic_per_operation() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store
        .create_constraint(
            None,
            plexus_core::ConstraintKind::Exists,
            "P",
            "name",
            None,
        )
        .unwrap();
    // The failed create leaves nothing behind: no node row, no label rows.
    let err = store
        .create_node(&["P".to_string()], Default::default())
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { .. }));
    assert_eq!(store.get_node_count().unwrap(), 0);

    store
        .create_node(&["P".to_string()], props(&[("name", Value::from("ok"))]))
        .unwrap();
    assert_eq!(store.get_node_count().unwrap(), 1);
}

#[test]
fn rollback_resets_vector_handles() {
    let mut store = GraphStore::open_in_memory().unwrap();
    store
        .create_vector_index("emb", 2, "l2", "flat", serde_json::json!({}))
        .unwrap();
    let id = store.create_node(&[], Default::default()).unwrap().id;
    store.upsert_embedding("emb", id, &[1.0, 0.0]).unwrap();

    store.begin().unwrap();
    store.upsert_embedding("emb", id, &[0.0, 1.0]).unwrap();
    store.rollback().unwrap();

    // The in-memory handle was rebuilt from the durable entries.
    let hits = store
        .semantic_search("emb", &[1.0, 0.0], 1, &Default::default())
        .unwrap();
    assert!((hits[0].1 - 1.0).abs() < 1e-6, "rolled-back vector is gone");
}
