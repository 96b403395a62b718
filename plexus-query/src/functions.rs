//! Built-in scalar functions.

use plexus_core::{temporal, CalendarDuration, Error, Result, Value};

use crate::executor::ExecContext;

pub fn call(ctx: &mut ExecContext, name: &str, args: Vec<Value>) -> Result<Value> {
    let lowered = name.to_lowercase();
    match lowered.as_str() {
        "id" => match args.first() {
            Some(Value::Node(n)) => Ok(Value::Int(n.id as i64)),
            Some(Value::Relationship(r)) => Ok(Value::Int(r.id as i64)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "labels" => match args.first() {
            Some(Value::Node(n)) => Ok(Value::List(
                n.labels.iter().cloned().map(Value::String).collect(),
            )),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "type" => match args.first() {
            Some(Value::Relationship(r)) => Ok(Value::String(r.rel_type.clone())),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "properties" => match args.first() {
            Some(Value::Node(n)) => Ok(Value::Map(n.properties.clone())),
            Some(Value::Relationship(r)) => Ok(Value::Map(r.properties.clone())),
            Some(Value::Map(m)) => Ok(Value::Map(m.clone())),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "keys" => match args.first() {
            Some(Value::Node(n)) => Ok(Value::List(
                n.properties.keys().cloned().map(Value::String).collect(),
            )),
            Some(Value::Relationship(r)) => Ok(Value::List(
                r.properties.keys().cloned().map(Value::String).collect(),
            )),
            Some(Value::Map(m)) => Ok(Value::List(m.keys().cloned().map(Value::String).collect())),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "exists" => Ok(Value::Bool(
            args.first().map(|v| !v.is_null()).unwrap_or(false),
        )),
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "size" => match args.first() {
            Some(Value::List(items)) => Ok(Value::Int(items.len() as i64)),
            Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::Map(m)) => Ok(Value::Int(m.len() as i64)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "length" => match args.first() {
            Some(Value::Path(p)) => Ok(Value::Int(p.length() as i64)),
            Some(Value::List(items)) => Ok(Value::Int(items.len() as i64)),
            Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "nodes" => match args.first() {
            Some(Value::Path(p)) => Ok(Value::List(
                p.nodes.iter().cloned().map(Value::Node).collect(),
            )),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "relationships" => match args.first() {
            Some(Value::Path(p)) => Ok(Value::List(
                p.relationships
                    .iter()
                    .cloned()
                    .map(Value::Relationship)
                    .collect(),
            )),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "startnode" => match args.first() {
            Some(Value::Relationship(r)) => {
                Ok(Value::Node(ctx.store.get_node(r.source_id)?))
            }
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "endnode" => match args.first() {
            Some(Value::Relationship(r)) => {
                Ok(Value::Node(ctx.store.get_node(r.target_id)?))
            }
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "head" => match args.first() {
            Some(Value::List(items)) => Ok(items.first().cloned().unwrap_or(Value::Null)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "last" => match args.first() {
            Some(Value::List(items)) => Ok(items.last().cloned().unwrap_or(Value::Null)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "tail" => match args.first() {
            Some(Value::List(items)) => Ok(Value::List(items.iter().skip(1).cloned().collect())),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "reverse" => match args.first() {
            Some(Value::String(s)) => Ok(Value::String(s.chars().rev().collect())),
            Some(Value::List(items)) => {
                Ok(Value::List(items.iter().rev().cloned().collect()))
            }
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "range" => {
            let start = int_arg(name, args.first())?;
            let end = int_arg(name, args.get(1))?;
            let step = match args.get(2) {
                Some(v) => int_arg(name, Some(v))?,
                None => 1,
            };
            if step == 0 {
                return Err(Error::SemanticError("range() step cannot be zero".to_string()));
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i <= end) || (step < 0 && i >= end) {
                out.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(out))
        }
        "abs" => match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
            Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "sign" => match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i.signum())),
            Some(Value::Float(f)) => Ok(Value::Int(if *f > 0.0 {
                1
            } else if *f < 0.0 {
                -1
            } else {
                0
            })),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "ceil" => float_fn(name, args.first(), f64::ceil),
        "floor" => float_fn(name, args.first(), f64::floor),
        "round" => float_fn(name, args.first(), f64::round),
        "sqrt" => float_fn(name, args.first(), f64::sqrt),
        "tointeger" => match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(*i)),
            Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
            Some(Value::String(s)) => Ok(s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| s.trim().parse::<f64>().map(|f| Value::Int(f as i64)))
                .unwrap_or(Value::Null)),
            Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
            _ => Ok(Value::Null),
        },
        "tofloat" => match args.first() {
            Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
            Some(Value::Float(f)) => Ok(Value::Float(*f)),
            Some(Value::String(s)) => Ok(s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        },
        "toboolean" => match args.first() {
            Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
            Some(Value::String(s)) => Ok(match s.trim().to_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            }),
            _ => Ok(Value::Null),
        },
        "tostring" => match args.first() {
            Some(Value::Null) | None => Ok(Value::Null),
            Some(value) => Ok(Value::String(value.to_string())),
        },
        "tolower" => string_fn(name, args.first(), |s| s.to_lowercase()),
        "toupper" => string_fn(name, args.first(), |s| s.to_uppercase()),
        "trim" => string_fn(name, args.first(), |s| s.trim().to_string()),
        "ltrim" => string_fn(name, args.first(), |s| s.trim_start().to_string()),
        "rtrim" => string_fn(name, args.first(), |s| s.trim_end().to_string()),
        "replace" => match (args.first(), args.get(1), args.get(2)) {
            (Some(Value::String(s)), Some(Value::String(from)), Some(Value::String(to))) => {
                Ok(Value::String(s.replace(from.as_str(), to)))
            }
            _ => Ok(Value::Null),
        },
        "split" => match (args.first(), args.get(1)) {
            (Some(Value::String(s)), Some(Value::String(sep))) => Ok(Value::List(
                s.split(sep.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            )),
            _ => Ok(Value::Null),
        },
        "substring" => {
            let (Some(Value::String(s)), Some(Value::Int(start))) = (args.first(), args.get(1))
            else {
                return Ok(Value::Null);
            };
            let chars: Vec<char> = s.chars().collect();
            let start = (*start).max(0) as usize;
            if start >= chars.len() {
                return Ok(Value::String(String::new()));
            }
            let end = match args.get(2) {
                Some(Value::Int(len)) => (start + (*len).max(0) as usize).min(chars.len()),
                _ => chars.len(),
            };
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "left" => match (args.first(), args.get(1)) {
            (Some(Value::String(s)), Some(Value::Int(n))) => {
                Ok(Value::String(s.chars().take((*n).max(0) as usize).collect()))
            }
            _ => Ok(Value::Null),
        },
        "right" => match (args.first(), args.get(1)) {
            (Some(Value::String(s)), Some(Value::Int(n))) => {
                let chars: Vec<char> = s.chars().collect();
                let n = (*n).max(0) as usize;
                let start = chars.len().saturating_sub(n);
                Ok(Value::String(chars[start..].iter().collect()))
            }
            _ => Ok(Value::Null),
        },
        "timestamp" => Ok(Value::Int(chrono::Utc::now().timestamp_millis())),
        "date" => match args.first() {
            None => Ok(Value::Date(chrono::Utc::now().date_naive())),
            Some(Value::String(s)) => Ok(Value::Date(temporal::parse_date(s)?)),
            Some(Value::Date(d)) => Ok(Value::Date(*d)),
            Some(Value::DateTime(dt)) => Ok(Value::Date(dt.date_naive())),
            Some(Value::Null) => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "datetime" => match args.first() {
            None => Ok(Value::DateTime(chrono::Utc::now().fixed_offset())),
            Some(Value::String(s)) => Ok(Value::DateTime(temporal::parse_datetime(s)?)),
            Some(Value::DateTime(dt)) => Ok(Value::DateTime(*dt)),
            Some(Value::Null) => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "time" => match args.first() {
            None => Ok(Value::Time(chrono::Utc::now().time())),
            Some(Value::String(s)) => Ok(Value::Time(temporal::parse_time(s)?)),
            Some(Value::Time(t)) => Ok(Value::Time(*t)),
            Some(Value::Null) => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        "duration" => match args.first() {
            Some(Value::String(s)) => Ok(Value::Duration(CalendarDuration::parse(s)?)),
            Some(Value::Duration(d)) => Ok(Value::Duration(*d)),
            Some(Value::Null) | None => Ok(Value::Null),
            Some(other) => Err(arg_error(name, other)),
        },
        _ => Err(Error::SemanticError(format!("unknown function: {name}()"))),
    }
}

fn arg_error(name: &str, value: &Value) -> Error {
    Error::TypeError(format!(
        "{name}() cannot take a {} argument",
        value.kind().name()
    ))
}

fn int_arg(name: &str, value: Option<&Value>) -> Result<i64> {
    match value {
        Some(Value::Int(i)) => Ok(*i),
        other => Err(Error::TypeError(format!(
            "{name}() expects integer arguments, got {}",
            other.map(|v| v.kind().name()).unwrap_or("nothing")
        ))),
    }
}

fn float_fn(name: &str, value: Option<&Value>, op: fn(f64) -> f64) -> Result<Value> {
    match value {
        Some(Value::Int(i)) => Ok(Value::Float(op(*i as f64))),
        Some(Value::Float(f)) => Ok(Value::Float(op(*f))),
        Some(Value::Null) | None => Ok(Value::Null),
        Some(other) => Err(arg_error(name, other)),
    }
}

fn string_fn(name: &str, value: Option<&Value>, op: impl Fn(&str) -> String) -> Result<Value> {
    match value {
        Some(Value::String(s)) => Ok(Value::String(op(s))),
        Some(Value::Null) | None => Ok(Value::Null),
        Some(other) => Err(arg_error(name, other)),
    }
}
