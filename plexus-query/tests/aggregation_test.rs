mod common;

use common::{column, ints, run, store, strings};
use plexus_core::Value;

fn seed(store: &mut plexus_storage::GraphStore) {
    run(
        store,
        "CREATE (:E {team:'red', salary: 10}),
                (:E {team:'red', salary: 30}),
                (:E {team:'blue', salary: 20}),
                (:E {team:'blue', salary: 20}),
                (:E {team:'blue'})",
    );
}

#[test]
fn count_star_and_count_expression() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (e:E) RETURN count(*) AS rows, count(e.salary) AS vals");
    assert_eq!(ints(&result, "rows"), vec![5]);
    // count(expr) skips rows where the expression is null.
    assert_eq!(ints(&result, "vals"), vec![4]);
}

#[test]
fn count_distinct() {
    let mut store = store();
    seed(&mut store);
    let result = run(&mut store, "MATCH (e:E) RETURN count(DISTINCT e.salary) AS n");
    assert_eq!(ints(&result, "n"), vec![3]);
}

#[test]
fn grouping_by_projected_key() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (e:E) RETURN e.team AS team, count(*) AS n, sum(e.salary) AS total ORDER BY team",
    );
    assert_eq!(strings(&result, "team"), vec!["blue", "red"]);
    assert_eq!(ints(&result, "n"), vec![3, 2]);
    assert_eq!(ints(&result, "total"), vec![40, 40]);
}

#[test]
fn avg_min_max() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (e:E) RETURN avg(e.salary) AS a, min(e.salary) AS lo, max(e.salary) AS hi",
    );
    assert_eq!(column(&result, "a"), vec![Value::Float(20.0)]);
    assert_eq!(ints(&result, "lo"), vec![10]);
    assert_eq!(ints(&result, "hi"), vec![30]);
}

#[test]
fn collect_gathers_non_null_values() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (e:E {team:'red'}) RETURN collect(e.salary) AS all",
    );
    match &column(&result, "all")[0] {
        Value::List(items) => {
            let mut got: Vec<i64> = items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => *i,
                    other => panic!("unexpected {other:?}"),
                })
                .collect();
            got.sort_unstable();
            assert_eq!(got, vec![10, 30]);
        }
        other => panic!("expected list, got {other:?}"),
    }
}

#[test]
fn stdev_is_sample_deviation() {
    let mut store = store();
    run(&mut store, "CREATE (:S {v: 2}), (:S {v: 4}), (:S {v: 6})");
    let result = run(&mut store, "MATCH (s:S) RETURN stdev(s.v) AS sd");
    match column(&result, "sd")[0] {
        Value::Float(sd) => assert!((sd - 2.0).abs() < 1e-9, "sd = {sd}"),
        ref other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn aggregation_over_zero_rows() {
    let mut store = store();
    let result = run(&mut store, "MATCH (x:Missing) RETURN count(x) AS n, sum(x.v) AS s, avg(x.v) AS a");
    assert_eq!(ints(&result, "n"), vec![0]);
    assert_eq!(ints(&result, "s"), vec![0]);
    assert_eq!(column(&result, "a"), vec![Value::Null]);
}

#[test]
fn grouped_aggregation_over_zero_rows_is_empty() {
    let mut store = store();
    let result = run(&mut store, "MATCH (x:Missing) RETURN x.team AS team, count(*) AS n");
    assert!(result.is_empty());
}

#[test]
fn aggregate_in_with_feeds_later_clauses() {
    let mut store = store();
    seed(&mut store);
    let result = run(
        &mut store,
        "MATCH (e:E) WITH e.team AS team, count(*) AS n WHERE n > 2 RETURN team",
    );
    assert_eq!(strings(&result, "team"), vec!["blue"]);
}

#[test]
fn sum_promotes_to_float_when_mixed() {
    let mut store = store();
    run(&mut store, "CREATE (:M {v: 1}), (:M {v: 0.5})");
    let result = run(&mut store, "MATCH (m:M) RETURN sum(m.v) AS s");
    assert_eq!(column(&result, "s"), vec![Value::Float(1.5)]);
}
