//! The dynamic value model used for record attributes before encoding.
//!
//! [`Value`] is the in-memory representation a record's fields take after
//! JSON deserialization and before the codec layer turns them into their
//! compact string encodings. It is deliberately a superset of JSON's own
//! type system (it adds [`Value::Bytes`] for binary attribute types such as
//! `embedding` and `geo`, which decode to raw bytes before encoding) while
//! keeping map keys ordered for deterministic packing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A dynamically typed attribute value.
///
/// `Map` uses a `BTreeMap` rather than `serde_json::Map` so that key
/// iteration order is deterministic — the metadata packer relies on a
/// stable ordering when deciding which attributes overflow to the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a short, stable type name used in validation error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts a [`serde_json::Value`] into a [`Value`], the format records
    /// arrive in from callers and from the object-store body.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts back to a [`serde_json::Value`] for JSON body encoding.
    ///
    /// `Bytes` has no native JSON representation; it is base64-encoded. This
    /// only happens for attribute types whose codec chose not to produce a
    /// printable string (callers should prefer the codec's string output).
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        use base64::Engine as _;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
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
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(_) => write!(f, "<array>"),
            Value::Map(_) => write!(f, "<map>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_primitives() {
        for json in [
            serde_json::json!(null),
            serde_json::json!(true),
            serde_json::json!(42),
            serde_json::json!(3.5),
            serde_json::json!("hello"),
        ] {
            let value = Value::from_json(json.clone());
            assert_eq!(value.into_json(), json);
        }
    }

    #[test]
    fn json_roundtrip_nested() {
        let json = serde_json::json!({
            "name": "Alice",
            "age": 30,
            "tags": ["a", "b"],
            "active": true,
        });
        let value = Value::from_json(json.clone());
        assert_eq!(value.into_json(), json);
    }

    #[test]
    fn map_keys_are_ordered() {
        let mut map = BTreeMap::new();
        map.insert("z".to_string(), Value::Int(1));
        map.insert("a".to_string(), Value::Int(2));
        let value = Value::Map(map);
        if let Value::Map(m) = &value {
            let keys: Vec<&String> = m.keys().collect();
            assert_eq!(keys, vec!["a", "z"]);
        } else {
            panic!("expected map");
        }
    }

    #[test]
    fn type_name_matches_variant() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bytes(vec![1, 2]).type_name(), "bytes");
    }

    #[test]
    fn as_i64_from_whole_float() {
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
    }
}
