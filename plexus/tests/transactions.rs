use plexus::{Database, Error, Params, Value};

#[test]
fn explicit_transaction_commit() {
    let db = Database::open(":memory:").unwrap();
    db.begin().unwrap();
    db.execute("CREATE (:T {v: 1})", &Params::new()).unwrap();
    // Read-your-writes inside the transaction.
    let mid = db
        .execute("MATCH (t:T) RETURN count(t) AS n", &Params::new())
        .unwrap();
    assert_eq!(mid.column_values("n"), vec![Value::Int(1)]);
    db.commit().unwrap();

    assert_eq!(db.get_node_count().unwrap(), 1);
}

#[test]
fn explicit_transaction_rollback() {
    let db = Database::open(":memory:").unwrap();
    db.begin().unwrap();
    db.execute("CREATE (:T)", &Params::new()).unwrap();
    db.rollback().unwrap();
    assert_eq!(db.get_node_count().unwrap(), 0);
}

#[test]
fn failed_statement_aborts_until_rollback() {
    let db = Database::open(":memory:").unwrap();
    db.execute("CREATE (:A)-[:R]->(:B)", &Params::new()).unwrap();

    db.begin().unwrap();
    // Plain DELETE of a connected node fails.
    let err = db
        .execute("MATCH (a:A) DELETE a", &Params::new())
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { .. }));

    // The transaction is poisoned; only rollback is accepted.
    let err = db.execute("CREATE (:C)", &Params::new()).unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));
    let err = db.commit().unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));

    db.rollback().unwrap();
    db.execute("CREATE (:C)", &Params::new()).unwrap();
    assert_eq!(db.get_node_count().unwrap(), 3);
}

#[test]
fn scoped_transaction_commits_on_success() {
    let db = Database::open(":memory:").unwrap();
    let created = db
        .with_transaction(|txn| {
            let node = txn.create_node(&["S"], Default::default())?;
            txn.execute("CREATE (:S)", &Params::new())?;
            Ok(node.id)
        })
        .unwrap();
    assert_eq!(created, 1);
    assert_eq!(db.get_node_count().unwrap(), 2);
}

#[test]
fn scoped_transaction_rolls_back_on_error() {
    let db = Database::open(":memory:").unwrap();
    let result: plexus::Result<()> = db.with_transaction(|txn| {
        txn.create_node(&["S"], Default::default())?;
        // Early exit through `?` still releases the writer and rolls back.
        txn.execute("MATCH (s:S) DELETE s", &Params::new())?;
        Err(Error::SemanticError("caller bailed".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(db.get_node_count().unwrap(), 0);

    // The writer was released; new work proceeds normally.
    db.execute("CREATE (:After)", &Params::new()).unwrap();
}

#[test]
fn auto_commit_rolls_back_failed_statements() {
    let db = Database::open(":memory:").unwrap();
    // The UNWIND creates two nodes, then fails on division by zero; the
    // statement's writes must vanish atomically.
    let err = db
        .execute(
            "UNWIND [1, 1, 0] AS d CREATE (:X {v: 1 / d})",
            &Params::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::TypeError(_)));
    assert_eq!(db.get_node_count().unwrap(), 0);
}

#[test]
fn statement_cancellation() {
    let db = Database::open(":memory:").unwrap();
    db.execute("CREATE (:N), (:N), (:N)", &Params::new()).unwrap();
    let canceler = db.canceler();
    canceler.cancel();
    // The flag is reset per statement, so this still runs.
    let result = db.execute("MATCH (n:N) RETURN count(n) AS n", &Params::new());
    assert!(result.is_ok());
}
