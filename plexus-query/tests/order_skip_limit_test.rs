mod common;

use common::{column, ints, run, store, strings};
use plexus_core::Value;

fn seed(store: &mut plexus_storage::GraphStore) {
    run(
        store,
        "CREATE (:P {name:'d', rank: 4}), (:P {name:'a', rank: 1}),
                (:P {name:'c', rank: 3}), (:P {name:'b', rank: 2}), (:P {name:'e'})",
    );
}

#[test]
fn order_by_ascending_and_descending() {
    let mut store = store();
    seed(&mut store);
    let asc = run(&mut store, "MATCH (p:P) WHERE p.rank IS NOT NULL RETURN p.name AS n ORDER BY p.rank");
    assert_eq!(strings(&asc, "n"), vec!["a", "b", "c", "d"]);

    let desc = run(
        &mut store,
        "MATCH (p:P) WHERE p.rank IS NOT NULL RETURN p.name AS n ORDER BY p.rank DESC",
    );
    assert_eq!(strings(&desc, "n"), vec!["d", "c", "b", "a"]);
}

#[test]
fn null_sorts_last_ascending() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (p:P) RETURN p.name AS n ORDER BY p.rank");
    assert_eq!(strings(&result, "n"), vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn mixed_kinds_follow_the_total_order() {
    let mut store = store();
    let result = run(
        &mut store,
        "UNWIND [1, 'text', true, [2], null, 2.5] AS v RETURN v ORDER BY v",
    );
    let values = column(&result, "v");
    // bool < number < string < list, null last.
    assert_eq!(values[0], Value::Bool(true));
    assert_eq!(values[1], Value::Int(1));
    assert_eq!(values[2], Value::Float(2.5));
    assert_eq!(values[3], Value::String("text".to_string()));
    assert_eq!(values[4], Value::List(vec![Value::Int(2)]));
    assert_eq!(values[5], Value::Null);
}

#[test]
fn skip_and_limit_after_order_by() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:P) WHERE p.rank IS NOT NULL
         RETURN p.name AS n ORDER BY p.rank SKIP 1 LIMIT 2",
    );
    assert_eq!(strings(&result, "n"), vec!["b", "c"]);
}

#[test]
fn limit_zero_yields_nothing() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (p:P) RETURN p LIMIT 0");
    assert!(result.is_empty());
}

#[test]
fn order_by_multiple_keys_is_stable() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (:Q {g: 1, name:'x'}), (:Q {g: 2, name:'y'}), (:Q {g: 1, name:'w'})",
    );
    let result = run(
        &mut store,
        "MATCH (q:Q) RETURN q.g AS g, q.name AS n ORDER BY g, n",
    );
    assert_eq!(ints(&result, "g"), vec![1, 1, 2]);
    assert_eq!(strings(&result, "n"), vec!["w", "x", "y"]);
}

#[test]
fn distinct_deduplicates_projected_rows() {
    let mut store = store();
    run(&mut store, "CREATE (:R {v: 1}), (:R {v: 1}), (:R {v: 2})");
    let result = run(&mut store, "MATCH (r:R) RETURN DISTINCT r.v AS v ORDER BY v");
    assert_eq!(ints(&result, "v"), vec![1, 2]);
}

#[test]
fn order_by_alias_reference() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (p:P) WHERE p.rank IS NOT NULL RETURN p.rank * 10 AS score ORDER BY score DESC LIMIT 1",
    );
    assert_eq!(ints(&result, "score"), vec![40]);
}

#[test]
fn skip_rejects_negative_values() {
    let mut store = store();
    let err = common::run_err(&mut store, "MATCH (n) RETURN n SKIP -1");
    assert!(matches!(err, plexus_core::Error::SemanticError(_)), "got {err:?}");
}
