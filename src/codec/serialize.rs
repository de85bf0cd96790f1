//! Tagged Serialization Module
//!
//! Converts `Arbitrary` values to and from canonical JSON strings. Exotic kinds
//! are written as `{"__kind": <tag>, "payload": ...}` wrappers.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::cache::{Arbitrary, BigInteger};
use crate::error::{CacheError, Result};

// == Wire Constants ==
pub const KIND_FIELD: &str = "__kind";
pub const PAYLOAD_FIELD: &str = "payload";

const KIND_BIGINT: &str = "bigint";
const KIND_DATE: &str = "date";
const KIND_MAP: &str = "map";
const KIND_SET: &str = "set";
/// Plain object whose own keys would collide with the wrapper shape
const KIND_OBJECT: &str = "object";

// == Serialize ==
/// Serializes a value to its canonical string.
///
/// Plain object keys come out sorted; ordered maps and sets keep insertion
/// order. The same value always yields the same string.
pub fn serialize(value: &Arbitrary) -> Result<String> {
    let json = to_json(value)?;
    serde_json::to_string(&json).map_err(|e| CacheError::Serialization(e.to_string()))
}

// == Deserialize ==
/// Parses a canonical string back into a value.
///
/// Malformed JSON and malformed tagged wrappers are both rejected; nothing is
/// returned half-built.
pub fn deserialize(input: &str) -> Result<Arbitrary> {
    let json: Value =
        serde_json::from_str(input).map_err(|e| CacheError::Deserialization(e.to_string()))?;
    from_json(json)
}

// == To JSON ==
/// Lowers a value into a JSON tree, tagging the exotic kinds.
pub fn to_json(value: &Arbitrary) -> Result<Value> {
    Ok(match value {
        Arbitrary::Null => Value::Null,
        Arbitrary::Bool(b) => Value::Bool(*b),
        Arbitrary::Number(n) => Number::from_f64(*n).map(Value::Number).ok_or_else(|| {
            CacheError::Serialization(format!("number {} has no JSON representation", n))
        })?,
        Arbitrary::String(s) => Value::String(s.clone()),
        Arbitrary::Array(items) => {
            Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?)
        }
        Arbitrary::Object(fields) if fields.contains_key(KIND_FIELD) => {
            let pairs = fields
                .iter()
                .map(|(k, v)| Ok(Value::Array(vec![Value::String(k.clone()), to_json(v)?])))
                .collect::<Result<Vec<_>>>()?;
            tagged(KIND_OBJECT, Value::Array(pairs))
        }
        Arbitrary::Object(fields) => {
            let mut out = Map::new();
            for (k, v) in fields {
                out.insert(k.clone(), to_json(v)?);
            }
            Value::Object(out)
        }
        Arbitrary::BigInt(n) => tagged(KIND_BIGINT, Value::String(n.to_string())),
        Arbitrary::Timestamp(ts) => tagged(
            KIND_DATE,
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        ),
        Arbitrary::Map(pairs) => {
            let pairs = pairs
                .iter()
                .map(|(k, v)| Ok(Value::Array(vec![to_json(k)?, to_json(v)?])))
                .collect::<Result<Vec<_>>>()?;
            tagged(KIND_MAP, Value::Array(pairs))
        }
        Arbitrary::Set(items) => tagged(
            KIND_SET,
            Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?),
        ),
    })
}

// == From JSON ==
/// Lifts a JSON tree into a value, unwrapping tagged exotic kinds.
pub fn from_json(value: Value) -> Result<Arbitrary> {
    Ok(match value {
        Value::Null => Arbitrary::Null,
        Value::Bool(b) => Arbitrary::Bool(b),
        Value::Number(n) => Arbitrary::Number(n.as_f64().ok_or_else(|| {
            CacheError::Deserialization(format!("number {} is out of range", n))
        })?),
        Value::String(s) => Arbitrary::String(s),
        Value::Array(items) => Arbitrary::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(mut fields) => match fields.remove(KIND_FIELD) {
            Some(kind) => from_tagged(kind, fields)?,
            None => {
                let mut out = BTreeMap::new();
                for (k, v) in fields {
                    out.insert(k, from_json(v)?);
                }
                Arbitrary::Object(out)
            }
        },
    })
}

fn tagged(kind: &str, payload: Value) -> Value {
    let mut out = Map::new();
    out.insert(KIND_FIELD.to_string(), Value::String(kind.to_string()));
    out.insert(PAYLOAD_FIELD.to_string(), payload);
    Value::Object(out)
}

fn from_tagged(kind: Value, mut rest: Map<String, Value>) -> Result<Arbitrary> {
    let kind = match kind {
        Value::String(kind) => kind,
        other => return Err(malformed(format!("kind tag must be a string, got {}", other))),
    };
    let payload = rest
        .remove(PAYLOAD_FIELD)
        .ok_or_else(|| malformed(format!("'{}' wrapper has no payload", kind)))?;
    if let Some(extra) = rest.keys().next() {
        return Err(malformed(format!(
            "'{}' wrapper has unexpected field '{}'",
            kind, extra
        )));
    }

    match kind.as_str() {
        KIND_BIGINT => {
            let literal = expect_string(&kind, payload)?;
            Ok(Arbitrary::BigInt(literal.parse::<BigInteger>()?))
        }
        KIND_DATE => {
            let literal = expect_string(&kind, payload)?;
            let ts = DateTime::parse_from_rfc3339(&literal)
                .map_err(|e| malformed(format!("invalid date '{}': {}", literal, e)))?;
            Ok(Arbitrary::Timestamp(ts.with_timezone(&Utc)))
        }
        KIND_MAP => {
            let mut pairs: Vec<(Arbitrary, Arbitrary)> = Vec::new();
            for pair in expect_array(&kind, payload)? {
                let (k, v) = expect_pair(&kind, pair)?;
                let key = from_json(k)?;
                if pairs.iter().any(|(existing, _)| *existing == key) {
                    return Err(malformed("duplicate key in map payload".to_string()));
                }
                pairs.push((key, from_json(v)?));
            }
            Ok(Arbitrary::Map(pairs))
        }
        KIND_SET => {
            let mut items: Vec<Arbitrary> = Vec::new();
            for item in expect_array(&kind, payload)? {
                let item = from_json(item)?;
                if items.contains(&item) {
                    return Err(malformed("duplicate element in set payload".to_string()));
                }
                items.push(item);
            }
            Ok(Arbitrary::Set(items))
        }
        KIND_OBJECT => {
            let mut fields = BTreeMap::new();
            for pair in expect_array(&kind, payload)? {
                let (k, v) = expect_pair(&kind, pair)?;
                let key = expect_string(&kind, k)?;
                fields.insert(key, from_json(v)?);
            }
            Ok(Arbitrary::Object(fields))
        }
        unknown => Err(malformed(format!("unknown kind tag '{}'", unknown))),
    }
}

fn malformed(msg: String) -> CacheError {
    CacheError::Deserialization(msg)
}

fn expect_string(kind: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(malformed(format!(
            "'{}' payload must be a string, got {}",
            kind, other
        ))),
    }
}

fn expect_array(kind: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(malformed(format!(
            "'{}' payload must be an array, got {}",
            kind, other
        ))),
    }
}

fn expect_pair(kind: &str, value: Value) -> Result<(Value, Value)> {
    let mut items = expect_array(kind, value)?;
    if items.len() != 2 {
        return Err(malformed(format!(
            "'{}' payload entries must be [key, value] pairs",
            kind
        )));
    }
    let v = items.pop().unwrap_or(Value::Null);
    let k = items.pop().unwrap_or(Value::Null);
    Ok((k, v))
}

// == Serde Integration ==
// Arbitrary crosses every JSON boundary (worker envelopes, snapshots, HTTP
// bodies) in its tagged form.
impl Serialize for Arbitrary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        to_json(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Arbitrary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        from_json(json).map_err(de::Error::custom)
    }
}
