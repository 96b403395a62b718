//! The tagged value union shared by storage, expressions and results.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

use crate::graph::{Node, PathValue, Relationship};
use crate::temporal::{self, CalendarDuration};

/// Every value a Cypher expression can produce.
///
/// The scalar, composite and temporal kinds are property-storable; `Node`,
/// `Relationship` and `Path` exist only in rows and are rejected by the
/// property codec.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Time(NaiveTime),
    Duration(CalendarDuration),
    Node(Node),
    Relationship(Relationship),
    Path(PathValue),
}

/// Discriminant used by type constraints and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
    Date,
    DateTime,
    Time,
    Duration,
    Node,
    Relationship,
    Path,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Time => "time",
            ValueKind::Duration => "duration",
            ValueKind::Node => "node",
            ValueKind::Relationship => "relationship",
            ValueKind::Path => "path",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(ValueKind::Null),
            "bool" | "boolean" => Some(ValueKind::Bool),
            "int" | "integer" => Some(ValueKind::Int),
            "float" => Some(ValueKind::Float),
            "string" => Some(ValueKind::String),
            "list" => Some(ValueKind::List),
            "map" => Some(ValueKind::Map),
            "date" => Some(ValueKind::Date),
            "datetime" => Some(ValueKind::DateTime),
            "time" => Some(ValueKind::Time),
            "duration" => Some(ValueKind::Duration),
            _ => None,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Time(_) => ValueKind::Time,
            Value::Duration(_) => ValueKind::Duration,
            Value::Node(_) => ValueKind::Node,
            Value::Relationship(_) => ValueKind::Relationship,
            Value::Path(_) => ValueKind::Path,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the property codec accepts this value.
    pub fn is_storable(&self) -> bool {
        match self {
            Value::Node(_) | Value::Relationship(_) | Value::Path(_) => false,
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(Value::is_storable),
            Value::Map(map) => map.values().all(Value::is_storable),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used by `ORDER BY`: null sorts last, then
    /// bool < number < string < list < map < temporal < node < relationship
    /// < path. `NaN` sorts above every other number.
    pub fn cypher_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => {
                let (lr, rr) = (self.order_rank(), other.order_rank());
                if lr != rr {
                    return lr.cmp(&rr);
                }
                self.cmp_same_kind(other)
            }
        }
    }

    fn order_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::List(_) => 3,
            Value::Map(_) => 4,
            Value::Date(_) => 5,
            Value::Time(_) => 6,
            Value::DateTime(_) => 7,
            Value::Duration(_) => 8,
            Value::Node(_) => 9,
            Value::Relationship(_) => 10,
            Value::Path(_) => 11,
            Value::Null => 12,
        }
    }

    fn cmp_same_kind(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
            (l, r) if l.as_f64().is_some() && r.as_f64().is_some() => {
                cmp_f64(l.as_f64().unwrap(), r.as_f64().unwrap())
            }
            (Value::String(l), Value::String(r)) => l.cmp(r),
            (Value::List(l), Value::List(r)) => {
                for (a, b) in l.iter().zip(r.iter()) {
                    match a.cypher_cmp(b) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                l.len().cmp(&r.len())
            }
            (Value::Map(l), Value::Map(r)) => {
                for ((lk, lv), (rk, rv)) in l.iter().zip(r.iter()) {
                    match lk.cmp(rk) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                    match lv.cypher_cmp(rv) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                l.len().cmp(&r.len())
            }
            (Value::Date(l), Value::Date(r)) => l.cmp(r),
            (Value::Time(l), Value::Time(r)) => l.cmp(r),
            (Value::DateTime(l), Value::DateTime(r)) => l.cmp(r),
            (Value::Duration(l), Value::Duration(r)) => {
                cmp_f64(l.estimated_seconds(), r.estimated_seconds())
            }
            (Value::Node(l), Value::Node(r)) => l.id.cmp(&r.id),
            (Value::Relationship(l), Value::Relationship(r)) => l.id.cmp(&r.id),
            (Value::Path(l), Value::Path(r)) => {
                let lids: Vec<u64> = l.nodes.iter().map(|n| n.id).collect();
                let rids: Vec<u64> = r.nodes.iter().map(|n| n.id).collect();
                lids.cmp(&rids)
            }
            _ => Ordering::Equal,
        }
    }
}

fn cmp_f64(l: f64, r: f64) -> Ordering {
    match l.partial_cmp(&r) {
        Some(order) => order,
        // NaN sorts above every other number.
        None => match (l.is_nan(), r.is_nan()) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        },
    }
}

impl Eq for Value {}

// Floats hash by bit pattern so rows can key dedup/group maps.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => {
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(map) => {
                for (k, v) in map {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Duration(d) => {
                d.months.hash(state);
                d.days.hash(state);
                d.seconds.hash(state);
                d.nanos.hash(state);
            }
            Value::Node(n) => n.id.hash(state),
            Value::Relationship(r) => r.id.hash(state),
            Value::Path(p) => {
                for n in &p.nodes {
                    n.id.hash(state);
                }
                for r in &p.relationships {
                    r.id.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Time(t) => write!(f, "{}", temporal::format_time(t)),
            Value::Duration(d) => write!(f, "{d}"),
            Value::Node(n) => write!(f, "(#{})", n.id),
            Value::Relationship(r) => write!(f, "[#{}:{}]", r.id, r.rel_type),
            Value::Path(p) => write!(f, "path({} nodes)", p.nodes.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_last() {
        let mut values = vec![Value::Null, Value::Int(1), Value::Bool(true)];
        values.sort_by(|a, b| a.cypher_cmp(b));
        assert_eq!(
            values,
            vec![Value::Bool(true), Value::Int(1), Value::Null]
        );
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(
            Value::Int(2).cypher_cmp(&Value::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(
            Value::Float(2.0).cypher_cmp(&Value::Int(2)),
            Ordering::Equal
        );
    }

    #[test]
    fn kinds_order_by_rank() {
        assert_eq!(
            Value::Bool(true).cypher_cmp(&Value::Int(0)),
            Ordering::Less
        );
        assert_eq!(
            Value::String("z".into()).cypher_cmp(&Value::List(vec![])),
            Ordering::Less
        );
    }

    #[test]
    fn lists_compare_elementwise() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(3)]);
        let c = Value::List(vec![Value::Int(1)]);
        assert_eq!(a.cypher_cmp(&b), Ordering::Less);
        assert_eq!(c.cypher_cmp(&a), Ordering::Less);
    }

    #[test]
    fn nan_sorts_above_numbers() {
        assert_eq!(
            Value::Float(f64::NAN).cypher_cmp(&Value::Float(1e18)),
            Ordering::Greater
        );
    }

    #[test]
    fn storable_rejects_entities_and_non_finite() {
        assert!(Value::Int(1).is_storable());
        assert!(!Value::Float(f64::INFINITY).is_storable());
        assert!(!Value::List(vec![Value::Float(f64::NAN)]).is_storable());
    }
}
