//! Bridges [`AttributeType`] declarations to the codec functions in
//! `stratum_core::codec`, so the packer can encode/decode a [`Value`]
//! without knowing which codec backs which semantic type.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use stratum_core::codec::{base62, embedding, fixed_point, geo, ip, money, smart_string};
use stratum_core::schema::AttributeType;
use stratum_core::value::Value;

/// Encodes a single attribute value to its string representation under
/// `attr_type`'s codec. Falls back to JSON text for `Json` and `Array`
/// attributes, which are not bijectively codec-packed.
///
/// # Errors
///
/// Returns a human-readable reason if `value` does not match the shape
/// `attr_type` expects (schema validation should already have ruled this
/// out for well-formed records, but the packer does not assume it).
pub fn encode(attr_type: &AttributeType, value: &Value) -> Result<String, String> {
    match (attr_type, value) {
        (AttributeType::String | AttributeType::Secret, Value::String(s)) => {
            Ok(smart_string::encode(s))
        }
        (AttributeType::Int, Value::Int(i)) => Ok(base62::encode_signed(*i)),
        (AttributeType::Float, v) => {
            let f = v.as_f64().ok_or("expected a number")?;
            Ok(fixed_point::encode(f, 6))
        }
        (AttributeType::Decimal { precision }, v) => {
            let f = v.as_f64().ok_or("expected a number")?;
            Ok(fixed_point::encode(f, *precision))
        }
        (AttributeType::Bool, Value::Bool(b)) => Ok(if *b { "1".to_string() } else { "0".to_string() }),
        (AttributeType::Money, Value::Map(m)) => {
            let amount = m.get("amount").and_then(Value::as_i64).ok_or("money.amount must be an integer")?;
            let currency = m.get("currency").and_then(Value::as_str).ok_or("money.currency must be a string")?;
            Ok(money::encode(amount, currency))
        }
        (AttributeType::Geo, Value::Map(m)) => {
            let lat = m.get("lat").and_then(Value::as_f64).ok_or("geo.lat must be a number")?;
            let lon = m.get("lon").and_then(Value::as_f64).ok_or("geo.lon must be a number")?;
            Ok(geo::encode(lat, lon))
        }
        (AttributeType::Ipv4, Value::String(s)) => {
            let addr = Ipv4Addr::from_str(s).map_err(|e| e.to_string())?;
            Ok(ip::encode_v4(addr))
        }
        (AttributeType::Ipv6, Value::String(s)) => {
            let addr = Ipv6Addr::from_str(s).map_err(|e| e.to_string())?;
            Ok(ip::encode_v6(addr))
        }
        (AttributeType::Embedding { precision }, Value::Array(items)) => {
            let floats: Vec<f64> = items
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| "embedding elements must be numeric".to_string()))
                .collect::<Result<_, _>>()?;
            Ok(embedding::encode(&floats, *precision))
        }
        (AttributeType::Json | AttributeType::Array { .. }, v) => {
            Ok(serde_json::to_string(&v.clone().into_json()).map_err(|e| e.to_string())?)
        }
        (expected, actual) => Err(format!("cannot encode {} as {expected:?}", actual.type_name())),
    }
}

/// Inverse of [`encode`].
///
/// # Errors
///
/// Returns a human-readable reason if `encoded` is not valid for
/// `attr_type`'s codec.
pub fn decode(attr_type: &AttributeType, encoded: &str) -> Result<Value, String> {
    match attr_type {
        AttributeType::String | AttributeType::Secret => Ok(Value::String(smart_string::decode(encoded)?)),
        AttributeType::Int => Ok(Value::Int(base62::decode_signed(encoded)?)),
        AttributeType::Float => Ok(Value::Float(fixed_point::decode(encoded, 6)?)),
        AttributeType::Decimal { precision } => Ok(Value::Float(fixed_point::decode(encoded, *precision)?)),
        AttributeType::Bool => Ok(Value::Bool(encoded == "1")),
        AttributeType::Money => {
            let (amount, currency) = money::decode(encoded)?;
            let mut m = std::collections::BTreeMap::new();
            m.insert("amount".to_string(), Value::Int(amount));
            m.insert("currency".to_string(), Value::String(currency));
            Ok(Value::Map(m))
        }
        AttributeType::Geo => {
            let (lat, lon) = geo::decode(encoded)?;
            let mut m = std::collections::BTreeMap::new();
            m.insert("lat".to_string(), Value::Float(lat));
            m.insert("lon".to_string(), Value::Float(lon));
            Ok(Value::Map(m))
        }
        AttributeType::Ipv4 => Ok(Value::String(ip::decode_v4(encoded)?.to_string())),
        AttributeType::Ipv6 => Ok(Value::String(ip::decode_v6(encoded)?.to_string())),
        AttributeType::Embedding { precision } => {
            let floats = embedding::decode(encoded, *precision)?;
            Ok(Value::Array(floats.into_iter().map(Value::Float).collect()))
        }
        AttributeType::Json | AttributeType::Array { .. } => {
            let json: serde_json::Value = serde_json::from_str(encoded).map_err(|e| e.to_string())?;
            Ok(Value::from_json(json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrips() {
        let encoded = encode(&AttributeType::Int, &Value::Int(-42)).unwrap();
        assert_eq!(decode(&AttributeType::Int, &encoded).unwrap(), Value::Int(-42));
    }

    #[test]
    fn string_roundtrips() {
        let encoded = encode(&AttributeType::String, &Value::String("hello".to_string())).unwrap();
        assert_eq!(
            decode(&AttributeType::String, &encoded).unwrap(),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn bool_roundtrips() {
        let encoded = encode(&AttributeType::Bool, &Value::Bool(true)).unwrap();
        assert_eq!(decode(&AttributeType::Bool, &encoded).unwrap(), Value::Bool(true));
    }

    #[test]
    fn money_roundtrips() {
        let mut m = std::collections::BTreeMap::new();
        m.insert("amount".to_string(), Value::Int(1099));
        m.insert("currency".to_string(), Value::String("USD".to_string()));
        let value = Value::Map(m);
        let encoded = encode(&AttributeType::Money, &value).unwrap();
        assert_eq!(decode(&AttributeType::Money, &encoded).unwrap(), value);
    }

    #[test]
    fn mismatched_shape_errors() {
        assert!(encode(&AttributeType::Int, &Value::String("nope".to_string())).is_err());
    }
}
