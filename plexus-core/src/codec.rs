//! Canonical JSON property codec.
//!
//! The codec is a bijection on the storable subset of [`Value`]: temporal
//! kinds carry a `{"$kind": ..., "v": ...}` marker, and plain maps that
//! happen to contain a literal `$kind` key are escaped the same way so that
//! decoding never misreads them.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as Json};

use crate::error::{Error, Result};
use crate::temporal::{self, CalendarDuration};
use crate::value::Value;

const KIND_KEY: &str = "$kind";

pub fn encode_value(value: &Value) -> Result<Json> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::Number((*i).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| Error::TypeError(format!("non-finite float not storable: {f}"))),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_value(item)?);
            }
            Ok(Json::Array(out))
        }
        Value::Map(map) => {
            let mut out = JsonMap::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode_value(item)?);
            }
            if map.contains_key(KIND_KEY) {
                Ok(tagged("map", Json::Object(out)))
            } else {
                Ok(Json::Object(out))
            }
        }
        Value::Date(d) => Ok(tagged("date", Json::String(d.format("%Y-%m-%d").to_string()))),
        Value::DateTime(dt) => Ok(tagged("datetime", Json::String(dt.to_rfc3339()))),
        Value::Time(t) => Ok(tagged("time", Json::String(temporal::format_time(t)))),
        Value::Duration(d) => Ok(tagged("duration", Json::String(d.to_string()))),
        Value::Node(_) | Value::Relationship(_) | Value::Path(_) => Err(Error::TypeError(format!(
            "{} values cannot be stored as properties",
            value.kind().name()
        ))),
    }
}

pub fn decode_value(json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                n.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| Error::TypeError(format!("unrepresentable number: {n}")))
            }
        }
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(decode_value(item)?);
            }
            Ok(Value::List(out))
        }
        Json::Object(map) => {
            if let Some(Json::String(kind)) = map.get(KIND_KEY) {
                let payload = map
                    .get("v")
                    .ok_or_else(|| Error::TypeError(format!("malformed {kind} marker")))?;
                return decode_tagged(kind, payload);
            }
            decode_plain_map(map)
        }
    }
}

fn decode_tagged(kind: &str, payload: &Json) -> Result<Value> {
    match kind {
        "map" => match payload {
            Json::Object(inner) => decode_plain_map(inner),
            _ => Err(Error::TypeError("malformed map marker".to_string())),
        },
        "date" => Ok(Value::Date(temporal::parse_date(expect_str(kind, payload)?)?)),
        "datetime" => Ok(Value::DateTime(temporal::parse_datetime(expect_str(
            kind, payload,
        )?)?)),
        "time" => Ok(Value::Time(temporal::parse_time(expect_str(kind, payload)?)?)),
        "duration" => Ok(Value::Duration(CalendarDuration::parse(expect_str(
            kind, payload,
        )?)?)),
        other => Err(Error::TypeError(format!("unknown value kind tag: {other}"))),
    }
}

fn expect_str<'a>(kind: &str, payload: &'a Json) -> Result<&'a str> {
    payload
        .as_str()
        .ok_or_else(|| Error::TypeError(format!("malformed {kind} marker")))
}

fn decode_plain_map(map: &JsonMap<String, Json>) -> Result<Value> {
    let mut out = BTreeMap::new();
    for (key, item) in map {
        out.insert(key.clone(), decode_value(item)?);
    }
    Ok(Value::Map(out))
}

fn tagged(kind: &str, payload: Json) -> Json {
    let mut map = JsonMap::with_capacity(2);
    map.insert(KIND_KEY.to_string(), Json::String(kind.to_string()));
    map.insert("v".to_string(), payload);
    Json::Object(map)
}

/// Encodes a property map to its stored JSON text, validating every value.
pub fn encode_properties(properties: &BTreeMap<String, Value>) -> Result<String> {
    let mut out = JsonMap::with_capacity(properties.len());
    for (key, value) in properties {
        out.insert(key.clone(), encode_value(value)?);
    }
    serde_json::to_string(&Json::Object(out)).map_err(Error::from)
}

pub fn decode_properties(text: &str) -> Result<BTreeMap<String, Value>> {
    let json: Json = serde_json::from_str(text)?;
    match json {
        Json::Object(map) => {
            let mut out = BTreeMap::new();
            for (key, item) in &map {
                out.insert(key.clone(), decode_value(item)?);
            }
            Ok(out)
        }
        _ => Err(Error::TypeError("properties must decode to a map".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn roundtrip(value: &Value) -> Value {
        decode_value(&encode_value(value).unwrap()).unwrap()
    }

    #[test]
    fn scalars_round_trip() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::String("héllo".to_string()),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn int_and_float_stay_distinct() {
        assert_eq!(roundtrip(&Value::Int(2)), Value::Int(2));
        assert_eq!(roundtrip(&Value::Float(2.0)), Value::Float(2.0));
    }

    #[test]
    fn temporals_keep_their_kind() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(roundtrip(&date), date);

        let dur = Value::Duration(CalendarDuration::parse("P1Y2M3DT4H").unwrap());
        assert_eq!(roundtrip(&dur), dur);
    }

    #[test]
    fn map_with_kind_key_is_escaped() {
        let mut inner = BTreeMap::new();
        inner.insert("$kind".to_string(), Value::String("date".to_string()));
        inner.insert("v".to_string(), Value::String("2024-01-15".to_string()));
        let value = Value::Map(inner);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn entities_are_rejected() {
        let node = Value::Node(crate::Node {
            id: 1,
            labels: vec![],
            properties: BTreeMap::new(),
            created_at: 0.0,
        });
        assert!(matches!(encode_value(&node), Err(Error::TypeError(_))));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(encode_value(&Value::Float(f64::NAN)).is_err());
        assert!(encode_value(&Value::Float(f64::INFINITY)).is_err());
    }

    fn storable_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1e12f64..1e12f64).prop_map(Value::Float),
            "[a-zA-Z0-9 $_.]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::btree_map("[a-z$]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn codec_is_a_bijection(value in storable_value()) {
            let text = encode_properties(&BTreeMap::from([("p".to_string(), value.clone())])).unwrap();
            let decoded = decode_properties(&text).unwrap();
            prop_assert_eq!(decoded.get("p").unwrap(), &value);
        }
    }
}
