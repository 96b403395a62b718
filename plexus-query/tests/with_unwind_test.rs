mod common;

use common::{column, ints, run, store, strings};
use plexus_core::Value;

#[test]
fn with_rescopes_variables() {
    let mut store = store();
    run(&mut store, "CREATE (:P {name:'a', secret: 1})");
    // `p` is out of scope after WITH; only `name` survives.
    let result = run(
        &mut store,
        "MATCH (p:P) WITH p.name AS name RETURN name, p.secret AS leaked",
    );
    assert_eq!(strings(&result, "name"), vec!["a"]);
    assert_eq!(column(&result, "leaked"), vec![Value::Null]);
}

#[test]
fn with_filters_on_aggregates() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (:V {g:'a'}), (:V {g:'a'}), (:V {g:'b'})",
    );
    let result = run(
        &mut store,
        "MATCH (v:V) WITH v.g AS g, count(*) AS n WHERE n = 2 RETURN g, n",
    );
    assert_eq!(strings(&result, "g"), vec!["a"]);
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn with_order_and_limit_midway() {
    let mut store = store();
    run(
        &mut store,
        "CREATE (:W {v: 3}), (:W {v: 1}), (:W {v: 2})",
    );
    let result = run(
        &mut store,
        "MATCH (w:W) WITH w ORDER BY w.v DESC LIMIT 2 RETURN w.v AS v ORDER BY v",
    );
    assert_eq!(ints(&result, "v"), vec![2, 3]);
}

#[test]
fn unwind_literal_list() {
    let mut store = store();
    let result = run(&mut store, "UNWIND [10, 20, 30] AS x RETURN x");
    assert_eq!(ints(&result, "x"), vec![10, 20, 30]);
}

#[test]
fn unwind_parameter_and_nested_expression() {
    let mut store = store();
    let result = run(&mut store, "UNWIND range(1, 4) AS x RETURN x * x AS sq");
    assert_eq!(ints(&result, "sq"), vec![1, 4, 9, 16]);
}

#[test]
fn unwind_null_produces_no_rows() {
    let mut store = store();
    let result = run(&mut store, "UNWIND null AS x RETURN x");
    assert!(result.is_empty());
}

#[test]
fn unwind_cross_product() {
    let mut store = store();
    let result = run(
        &mut store,
        "UNWIND [1, 2] AS x UNWIND ['a', 'b'] AS y RETURN x, y",
    );
    assert_eq!(result.len(), 4);
    assert_eq!(ints(&result, "x"), vec![1, 1, 2, 2]);
    assert_eq!(strings(&result, "y"), vec!["a", "b", "a", "b"]);
}

#[test]
fn with_collect_then_unwind_round_trip() {
    let mut store = store();
    run(&mut store, "CREATE (:C {v: 1}), (:C {v: 2})");
    let result = run(
        &mut store,
        "MATCH (c:C) WITH collect(c.v) AS vs UNWIND vs AS v RETURN v ORDER BY v",
    );
    assert_eq!(ints(&result, "v"), vec![1, 2]);
}

#[test]
fn with_distinct() {
    let mut store = store();
    run(&mut store, "CREATE (:D {v: 1}), (:D {v: 1}), (:D {v: 2})");
    let result = run(
        &mut store,
        "MATCH (d:D) WITH DISTINCT d.v AS v RETURN count(v) AS n",
    );
    assert_eq!(ints(&result, "n"), vec![2]);
}

#[test]
fn return_expression_columns_default_names() {
    let mut store = store();
    let result = run(&mut store, "RETURN 1 + 2, 'x'");
    assert_eq!(result.columns, vec!["1 + 2".to_string(), "'x'".to_string()]);
    assert_eq!(column(&result, "1 + 2"), vec![Value::Int(3)]);
}
