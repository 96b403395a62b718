//! Expression evaluation with Cypher's three-valued logic.
//!
//! `null` propagates through operators; `IS NULL` / `IS NOT NULL` are the
//! only predicates that turn it back into a boolean. Comparisons across
//! incompatible kinds evaluate to `null`, never to an error.

use plexus_core::{temporal, Error, Result, Value};

use crate::ast::*;
use crate::executor::{match_pattern_rows, ExecContext, Row};
use crate::functions;

pub fn evaluate(ctx: &mut ExecContext, row: &Row, expr: &Expression) -> Result<Value> {
    ctx.check_canceled()?;
    match expr {
        Expression::Literal(lit) => Ok(literal_value(lit)),
        Expression::Parameter(name) => Ok(ctx.params.get(name).cloned().unwrap_or(Value::Null)),
        Expression::Variable(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
        Expression::Property(target, key) => {
            let target = evaluate(ctx, row, target)?;
            Ok(property_of(&target, key))
        }
        Expression::Index(target, index) => {
            let target = evaluate(ctx, row, target)?;
            let index = evaluate(ctx, row, index)?;
            Ok(index_into(&target, &index))
        }
        Expression::Slice { target, from, to } => {
            let target = evaluate(ctx, row, target)?;
            let from = match from {
                Some(expr) => Some(evaluate(ctx, row, expr)?),
                None => None,
            };
            let to = match to {
                Some(expr) => Some(evaluate(ctx, row, expr)?),
                None => None,
            };
            Ok(slice(&target, from.as_ref(), to.as_ref()))
        }
        Expression::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(ctx, row, item)?);
            }
            Ok(Value::List(out))
        }
        Expression::Map(pairs) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, value) in pairs {
                out.insert(key.clone(), evaluate(ctx, row, value)?);
            }
            Ok(Value::Map(out))
        }
        Expression::Unary(UnaryOp::Not, inner) => {
            let value = evaluate(ctx, row, inner)?;
            Ok(match truth(&value) {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            })
        }
        Expression::Unary(UnaryOp::Negate, inner) => {
            let value = evaluate(ctx, row, inner)?;
            match value {
                Value::Null => Ok(Value::Null),
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Error::TypeError("integer overflow".to_string())),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Duration(d) => Ok(Value::Duration(d.negated())),
                other => Err(Error::TypeError(format!(
                    "cannot negate a {}",
                    other.kind().name()
                ))),
            }
        }
        Expression::Binary(left, op, right) => evaluate_binary(ctx, row, left, *op, right),
        Expression::IsNull(inner, negated) => {
            let value = evaluate(ctx, row, inner)?;
            Ok(Value::Bool(value.is_null() != *negated))
        }
        Expression::Case(case) => evaluate_case(ctx, row, case),
        Expression::FunctionCall(call) => {
            if AGGREGATE_FUNCTIONS.contains(&call.name.to_lowercase().as_str()) {
                return Err(Error::SemanticError(format!(
                    "aggregate function {}() is only allowed in RETURN or WITH projections",
                    call.name
                )));
            }
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                args.push(evaluate(ctx, row, arg)?);
            }
            functions::call(ctx, &call.name, args)
        }
        Expression::ListComprehension(comp) => {
            let list = evaluate(ctx, row, &comp.list)?;
            let items = match list {
                Value::Null => return Ok(Value::Null),
                Value::List(items) => items,
                other => {
                    return Err(Error::TypeError(format!(
                        "expected a list in comprehension, got {}",
                        other.kind().name()
                    )));
                }
            };
            let mut out = Vec::new();
            for item in items {
                let scoped = row.with(&comp.variable, item.clone());
                if let Some(predicate) = &comp.predicate {
                    if truth(&evaluate(ctx, &scoped, predicate)?) != Some(true) {
                        continue;
                    }
                }
                match &comp.projection {
                    Some(projection) => out.push(evaluate(ctx, &scoped, projection)?),
                    None => out.push(item),
                }
            }
            Ok(Value::List(out))
        }
        Expression::PatternComprehension(comp) => {
            let matches = match_pattern_rows(ctx, row, &comp.pattern)?;
            let mut out = Vec::new();
            for scoped in matches {
                if let Some(predicate) = &comp.predicate {
                    if truth(&evaluate(ctx, &scoped, predicate)?) != Some(true) {
                        continue;
                    }
                }
                out.push(evaluate(ctx, &scoped, &comp.projection)?);
            }
            Ok(Value::List(out))
        }
        Expression::Quantifier(q) => {
            let list = evaluate(ctx, row, &q.list)?;
            let items = match list {
                Value::Null => return Ok(Value::Null),
                Value::List(items) => items,
                other => {
                    return Err(Error::TypeError(format!(
                        "expected a list in quantifier, got {}",
                        other.kind().name()
                    )));
                }
            };
            let mut hits = 0usize;
            let mut saw_null = false;
            for item in items {
                let scoped = row.with(&q.variable, item);
                match truth(&evaluate(ctx, &scoped, &q.predicate)?) {
                    Some(true) => hits += 1,
                    Some(false) => {
                        if q.quantifier == Quantifier::All {
                            return Ok(Value::Bool(false));
                        }
                    }
                    None => saw_null = true,
                }
            }
            Ok(match q.quantifier {
                Quantifier::All => {
                    if saw_null {
                        Value::Null
                    } else {
                        Value::Bool(true)
                    }
                }
                Quantifier::Any => Value::Bool(hits > 0),
                Quantifier::None => {
                    if hits > 0 {
                        Value::Bool(false)
                    } else if saw_null {
                        Value::Null
                    } else {
                        Value::Bool(true)
                    }
                }
                Quantifier::Single => Value::Bool(hits == 1),
            })
        }
        Expression::Reduce(r) => {
            let list = evaluate(ctx, row, &r.list)?;
            let items = match list {
                Value::Null => return Ok(Value::Null),
                Value::List(items) => items,
                other => {
                    return Err(Error::TypeError(format!(
                        "expected a list in reduce, got {}",
                        other.kind().name()
                    )));
                }
            };
            let mut acc = evaluate(ctx, row, &r.init)?;
            for item in items {
                let scoped = row.with(&r.accumulator, acc).with(&r.variable, item);
                acc = evaluate(ctx, &scoped, &r.expression)?;
            }
            Ok(acc)
        }
        Expression::PatternPredicate(pattern) => {
            let matches = match_pattern_rows(ctx, row, pattern)?;
            Ok(Value::Bool(!matches.is_empty()))
        }
    }
}

pub fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Integer(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Boolean truth of a value: `None` for null and non-booleans.
pub fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn evaluate_binary(
    ctx: &mut ExecContext,
    row: &Row,
    left: &Expression,
    op: BinaryOp,
    right: &Expression,
) -> Result<Value> {
    // AND/OR short-circuit through their dominant value.
    match op {
        BinaryOp::And => {
            let l = truth(&evaluate(ctx, row, left)?);
            if l == Some(false) {
                return Ok(Value::Bool(false));
            }
            let r = truth(&evaluate(ctx, row, right)?);
            return Ok(match (l, r) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            });
        }
        BinaryOp::Or => {
            let l = truth(&evaluate(ctx, row, left)?);
            if l == Some(true) {
                return Ok(Value::Bool(true));
            }
            let r = truth(&evaluate(ctx, row, right)?);
            return Ok(match (l, r) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            });
        }
        _ => {}
    }

    let l = evaluate(ctx, row, left)?;
    let r = evaluate(ctx, row, right)?;
    match op {
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        BinaryOp::Xor => Ok(match (truth(&l), truth(&r)) {
            (Some(a), Some(b)) => Value::Bool(a ^ b),
            _ => Value::Null,
        }),
        BinaryOp::Eq => Ok(option_bool(values_equal(&l, &r))),
        BinaryOp::NotEq => Ok(option_bool(values_equal(&l, &r).map(|b| !b))),
        BinaryOp::Lt => Ok(option_bool(compare(&l, &r, |o| o.is_lt()))),
        BinaryOp::LtEq => Ok(option_bool(compare(&l, &r, |o| o.is_le()))),
        BinaryOp::Gt => Ok(option_bool(compare(&l, &r, |o| o.is_gt()))),
        BinaryOp::GtEq => Ok(option_bool(compare(&l, &r, |o| o.is_ge()))),
        BinaryOp::In => Ok(in_list(&l, &r)),
        BinaryOp::StartsWith => Ok(string_predicate(&l, &r, |a, b| a.starts_with(b))),
        BinaryOp::EndsWith => Ok(string_predicate(&l, &r, |a, b| a.ends_with(b))),
        BinaryOp::Contains => Ok(string_predicate(&l, &r, |a, b| a.contains(b))),
        BinaryOp::Regex => regex_match(&l, &r),
        BinaryOp::Add => add_values(&l, &r),
        BinaryOp::Subtract => subtract_values(&l, &r),
        BinaryOp::Multiply => numeric_op(&l, &r, "*", i64::checked_mul, |a, b| a * b),
        BinaryOp::Divide => divide_values(&l, &r),
        BinaryOp::Modulo => modulo_values(&l, &r),
        BinaryOp::Power => match (l.as_f64(), r.as_f64()) {
            _ if l.is_null() || r.is_null() => Ok(Value::Null),
            (Some(a), Some(b)) => Ok(Value::Float(a.powf(b))),
            _ => Err(type_mismatch("^", &l, &r)),
        },
    }
}

fn evaluate_case(ctx: &mut ExecContext, row: &Row, case: &CaseExpression) -> Result<Value> {
    match &case.operand {
        Some(operand) => {
            let subject = evaluate(ctx, row, operand)?;
            for (when, then) in &case.branches {
                let candidate = evaluate(ctx, row, when)?;
                if values_equal(&subject, &candidate) == Some(true) {
                    return evaluate(ctx, row, then);
                }
            }
        }
        None => {
            for (when, then) in &case.branches {
                if truth(&evaluate(ctx, row, when)?) == Some(true) {
                    return evaluate(ctx, row, then);
                }
            }
        }
    }
    match &case.fallback {
        Some(fallback) => evaluate(ctx, row, fallback),
        None => Ok(Value::Null),
    }
}

fn option_bool(value: Option<bool>) -> Value {
    match value {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}

/// Cypher equality: `None` when null is involved, numeric across int/float,
/// deep on composites.
pub fn values_equal(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (left.as_f64().unwrap(), right.as_f64().unwrap());
            Some(a == b)
        }
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            let mut saw_null = false;
            for (x, y) in a.iter().zip(b.iter()) {
                match values_equal(x, y) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                None
            } else {
                Some(true)
            }
        }
        (Value::Map(a), Value::Map(b)) => {
            if a.len() != b.len() || !a.keys().eq(b.keys()) {
                return Some(false);
            }
            let mut saw_null = false;
            for (x, y) in a.values().zip(b.values()) {
                match values_equal(x, y) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                None
            } else {
                Some(true)
            }
        }
        (Value::Node(a), Value::Node(b)) => Some(a.id == b.id),
        (Value::Relationship(a), Value::Relationship(b)) => Some(a.id == b.id),
        (Value::Path(a), Value::Path(b)) => Some(
            a.nodes.iter().map(|n| n.id).eq(b.nodes.iter().map(|n| n.id))
                && a.relationships
                    .iter()
                    .map(|r| r.id)
                    .eq(b.relationships.iter().map(|r| r.id)),
        ),
        (a, b) if a.kind() == b.kind() => Some(a == b),
        _ => Some(false),
    }
}

/// Ordering comparison; `None` (null) for incompatible kinds.
fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> Option<bool> {
    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return None,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => left
            .as_f64()
            .unwrap()
            .partial_cmp(&right.as_f64().unwrap())?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        (Value::Time(a), Value::Time(b)) => a.cmp(b),
        (Value::Duration(a), Value::Duration(b)) => a
            .estimated_seconds()
            .partial_cmp(&b.estimated_seconds())?,
        (Value::List(_), Value::List(_)) => left.cypher_cmp(right),
        _ => return None,
    };
    Some(test(ordering))
}

fn in_list(left: &Value, right: &Value) -> Value {
    let Value::List(items) = right else {
        return Value::Null;
    };
    if left.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for item in items {
        match values_equal(left, item) {
            Some(true) => return Value::Bool(true),
            Some(false) => {}
            None => saw_null = true,
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::Bool(false)
    }
}

fn string_predicate(left: &Value, right: &Value, test: fn(&str, &str) -> bool) -> Value {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Value::Bool(test(a, b)),
        _ => Value::Null,
    }
}

fn regex_match(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::String(text), Value::String(pattern)) => {
            // Cypher `=~` matches the whole string.
            let re = regex::Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| Error::SemanticError(format!("invalid regex: {e}")))?;
            Ok(Value::Bool(re.is_match(text)))
        }
        _ => Ok(Value::Null),
    }
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> Error {
    Error::TypeError(format!(
        "cannot apply {op} to {} and {}",
        left.kind().name(),
        right.kind().name()
    ))
}

pub fn add_values(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (Value::List(a), other) => {
            let mut out = a.clone();
            out.push(other.clone());
            Ok(Value::List(out))
        }
        (Value::Date(d), Value::Duration(dur)) | (Value::Duration(dur), Value::Date(d)) => {
            Ok(Value::Date(temporal::add_duration_to_date(*d, dur)?))
        }
        (Value::DateTime(dt), Value::Duration(dur))
        | (Value::Duration(dur), Value::DateTime(dt)) => Ok(Value::DateTime(
            temporal::add_duration_to_datetime(*dt, dur)?,
        )),
        (Value::Time(t), Value::Duration(dur)) | (Value::Duration(dur), Value::Time(t)) => {
            Ok(Value::Time(temporal::add_duration_to_time(*t, dur)))
        }
        (Value::Duration(a), Value::Duration(b)) => Ok(Value::Duration(
            plexus_core::CalendarDuration::new(
                a.months + b.months,
                a.days + b.days,
                a.seconds + b.seconds + i64::from((a.nanos + b.nanos) / 1_000_000_000),
                (a.nanos + b.nanos) % 1_000_000_000,
            ),
        )),
        _ => numeric_op(left, right, "+", i64::checked_add, |a, b| a + b),
    }
}

fn subtract_values(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Date(d), Value::Duration(dur)) => Ok(Value::Date(
            temporal::add_duration_to_date(*d, &dur.negated())?,
        )),
        (Value::DateTime(dt), Value::Duration(dur)) => Ok(Value::DateTime(
            temporal::add_duration_to_datetime(*dt, &dur.negated())?,
        )),
        (Value::Time(t), Value::Duration(dur)) => Ok(Value::Time(
            temporal::add_duration_to_time(*t, &dur.negated()),
        )),
        (Value::Duration(a), Value::Duration(b)) => {
            let b = b.negated();
            add_values(&Value::Duration(*a), &Value::Duration(b))
        }
        _ => numeric_op(left, right, "-", i64::checked_sub, |a, b| a - b),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    op: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| Error::TypeError("integer overflow".to_string())),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(
            float_op(left.as_f64().unwrap(), right.as_f64().unwrap()),
        )),
        _ => Err(type_mismatch(op, left, right)),
    }
}

fn divide_values(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(Error::TypeError("division by zero".to_string()));
            }
            Ok(Value::Int(a / b))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(
            left.as_f64().unwrap() / right.as_f64().unwrap(),
        )),
        _ => Err(type_mismatch("/", left, right)),
    }
}

fn modulo_values(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(Error::TypeError("division by zero".to_string()));
            }
            Ok(Value::Int(a % b))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(
            left.as_f64().unwrap() % right.as_f64().unwrap(),
        )),
        _ => Err(type_mismatch("%", left, right)),
    }
}

/// Property access on nodes, relationships, maps and temporal values.
pub fn property_of(target: &Value, key: &str) -> Value {
    match target {
        Value::Null => Value::Null,
        Value::Node(node) => node.properties.get(key).cloned().unwrap_or(Value::Null),
        Value::Relationship(rel) => rel.properties.get(key).cloned().unwrap_or(Value::Null),
        Value::Map(map) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index_into(target: &Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Null, _) | (_, Value::Null) => Value::Null,
        (Value::List(items), Value::Int(i)) => {
            let idx = if *i < 0 { items.len() as i64 + i } else { *i };
            if idx < 0 {
                return Value::Null;
            }
            items.get(idx as usize).cloned().unwrap_or(Value::Null)
        }
        (Value::Map(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Node(node), Value::String(key)) => {
            node.properties.get(key).cloned().unwrap_or(Value::Null)
        }
        (Value::Relationship(rel), Value::String(key)) => {
            rel.properties.get(key).cloned().unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn slice(target: &Value, from: Option<&Value>, to: Option<&Value>) -> Value {
    let Value::List(items) = target else {
        return Value::Null;
    };
    let len = items.len() as i64;
    let resolve = |v: Option<&Value>, default: i64| -> Option<i64> {
        match v {
            None => Some(default),
            Some(Value::Int(i)) => Some(if *i < 0 { len + i } else { *i }),
            Some(Value::Null) => None,
            Some(_) => None,
        }
    };
    let (Some(start), Some(end)) = (resolve(from, 0), resolve(to, len)) else {
        return Value::Null;
    };
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        return Value::List(Vec::new());
    }
    Value::List(items[start..end].to_vec())
}
