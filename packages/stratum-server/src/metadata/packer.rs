//! The metadata/body packing algorithm (governing spec §4.3).
//!
//! Turns a validated record into a [`PackedObject`] with two buckets:
//! in-metadata (encoded attribute -> value pairs written as S3 user-metadata)
//! and in-body (a JSON blob holding whatever didn't fit). `unpack` is the
//! exact inverse, driven by the reserved flag keys this module writes.

use std::collections::BTreeMap;

use bytes::Bytes;
use stratum_core::config::{PackingBehavior, ResourceConfig};
use stratum_core::error::StoreError;
use stratum_core::schema::Schema;
use stratum_core::value::Value;

use super::codec_bridge;

/// Fixed per-key overhead (quoting, delimiter) counted against the budget
/// alongside the key and value bytes themselves.
const KEY_OVERHEAD_BYTES: usize = 3;

const ID_KEY: &str = "_id";
const VERSION_KEY: &str = "_v";
const BODY_ONLY_KEY: &str = "_bodyonly";
const TRUNCATED_KEY: &str = "_truncated";
const OVERFLOW_PREFIX: &str = "_o:";

pub struct PackedObject {
    pub metadata: BTreeMap<String, String>,
    pub body: Bytes,
    pub content_type: Option<&'static str>,
}

/// Packs a validated record into metadata + body per the resource's
/// configured [`PackingBehavior`].
///
/// # Errors
///
/// Returns [`StoreError::Encoding`] if an attribute cannot be encoded by its
/// codec, or [`StoreError::MetadataOverflow`] if the record does not fit and
/// the behavior forbids overflow.
pub fn pack(
    schema: &Schema,
    config: &ResourceConfig,
    id: &str,
    record: &BTreeMap<String, Value>,
) -> Result<PackedObject, StoreError> {
    if config.behavior == PackingBehavior::BodyOnly {
        return pack_body_only(schema, id, record);
    }

    let mut entries = encode_all(schema, record)?;
    let mut metadata = BTreeMap::new();
    metadata.insert(ID_KEY.to_string(), id.to_string());
    metadata.insert(VERSION_KEY.to_string(), schema.version.to_string());

    if fits(&metadata, &entries, config.metadata_budget_bytes) {
        for (key, value) in entries {
            metadata.insert(key, value);
        }
        return Ok(PackedObject {
            metadata,
            body: Bytes::new(),
            content_type: None,
        });
    }

    match config.behavior {
        PackingBehavior::UserMetadata => Err(StoreError::MetadataOverflow {
            resource: schema.resource_name.clone(),
            id: id.to_string(),
            used: entry_bytes(&entries) + metadata_bytes(&metadata),
            budget: config.metadata_budget_bytes,
        }),
        PackingBehavior::EnforceLimits => {
            for (key, value) in &mut entries {
                if let Some(attr) = schema.attribute(key) {
                    if let Some(max_length) = attr.max_length {
                        value.truncate(max_length);
                    }
                }
            }
            if !fits(&metadata, &entries, config.metadata_budget_bytes) {
                return Err(StoreError::MetadataOverflow {
                    resource: schema.resource_name.clone(),
                    id: id.to_string(),
                    used: entry_bytes(&entries) + metadata_bytes(&metadata),
                    budget: config.metadata_budget_bytes,
                });
            }
            for (key, value) in entries {
                metadata.insert(key, value);
            }
            Ok(PackedObject {
                metadata,
                body: Bytes::new(),
                content_type: None,
            })
        }
        PackingBehavior::TruncateData => {
            entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            while !fits(&metadata, &entries, config.metadata_budget_bytes) {
                let Some((_, value)) = entries.iter_mut().find(|(_, v)| !v.is_empty()) else {
                    break;
                };
                let new_len = value.len().saturating_sub(value.len() / 4 + 1);
                value.truncate(new_len);
            }
            metadata.insert(TRUNCATED_KEY.to_string(), "1".to_string());
            for (key, value) in entries {
                metadata.insert(key, value);
            }
            Ok(PackedObject {
                metadata,
                body: Bytes::new(),
                content_type: None,
            })
        }
        PackingBehavior::BodyOverflow => {
            entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            let mut overflow = BTreeMap::new();
            while !entries.is_empty() && !fits(&metadata, &entries, config.metadata_budget_bytes) {
                let (key, _) = entries.remove(0);
                if let Some(value) = record.get(&key) {
                    overflow.insert(key.clone(), value.clone().into_json());
                }
                metadata.insert(format!("{OVERFLOW_PREFIX}{key}"), "1".to_string());
            }
            for (key, value) in entries {
                metadata.insert(key, value);
            }
            if overflow.is_empty() {
                Ok(PackedObject {
                    metadata,
                    body: Bytes::new(),
                    content_type: None,
                })
            } else {
                let body_json = serde_json::json!({ "_overflow": overflow });
                let body = Bytes::from(serde_json::to_vec(&body_json).map_err(|e| StoreError::Encoding {
                    attribute: "_overflow".to_string(),
                    reason: e.to_string(),
                })?);
                Ok(PackedObject {
                    metadata,
                    body,
                    content_type: Some("application/json"),
                })
            }
        }
        PackingBehavior::BodyOnly => unreachable!("handled above"),
    }
}

fn pack_body_only(
    schema: &Schema,
    id: &str,
    record: &BTreeMap<String, Value>,
) -> Result<PackedObject, StoreError> {
    let mut metadata = BTreeMap::new();
    metadata.insert(ID_KEY.to_string(), id.to_string());
    metadata.insert(VERSION_KEY.to_string(), schema.version.to_string());
    metadata.insert(BODY_ONLY_KEY.to_string(), "1".to_string());

    let json = Value::Map(record.clone()).into_json();
    let body = Bytes::from(serde_json::to_vec(&json).map_err(|e| StoreError::Encoding {
        attribute: "_body".to_string(),
        reason: e.to_string(),
    })?);
    Ok(PackedObject {
        metadata,
        body,
        content_type: Some("application/json"),
    })
}

/// Inverse of [`pack`]: reconstructs a record from metadata and (if
/// present) body, following whichever reserved flags `pack` wrote.
///
/// # Errors
///
/// Returns [`StoreError::Encoding`] if a stored value cannot be decoded by
/// its attribute's codec.
pub fn unpack(
    schema: &Schema,
    metadata: &BTreeMap<String, String>,
    body: &[u8],
) -> Result<BTreeMap<String, Value>, StoreError> {
    if metadata.get(BODY_ONLY_KEY).map(String::as_str) == Some("1") {
        let json: serde_json::Value = serde_json::from_slice(body).map_err(|e| StoreError::Encoding {
            attribute: "_body".to_string(),
            reason: e.to_string(),
        })?;
        return match Value::from_json(json) {
            Value::Map(m) => Ok(m),
            _ => Ok(BTreeMap::new()),
        };
    }

    let mut overflow: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    if !body.is_empty() {
        let parsed: serde_json::Value = serde_json::from_slice(body).map_err(|e| StoreError::Encoding {
            attribute: "_overflow".to_string(),
            reason: e.to_string(),
        })?;
        if let Some(obj) = parsed.get("_overflow").and_then(serde_json::Value::as_object) {
            for (key, value) in obj {
                overflow.insert(key.clone(), value.clone());
            }
        }
    }

    let mut record = BTreeMap::new();
    for attr in &schema.attributes {
        if let Some(json) = overflow.remove(&attr.name) {
            record.insert(attr.name.clone(), Value::from_json(json));
            continue;
        }
        let Some(encoded) = metadata.get(&attr.name) else {
            continue;
        };
        let value = codec_bridge::decode(&attr.attr_type, encoded).map_err(|reason| StoreError::Encoding {
            attribute: attr.name.clone(),
            reason,
        })?;
        record.insert(attr.name.clone(), value);
    }
    Ok(record)
}

fn encode_all(schema: &Schema, record: &BTreeMap<String, Value>) -> Result<Vec<(String, String)>, StoreError> {
    let mut out = Vec::with_capacity(record.len());
    for attr in &schema.attributes {
        let Some(value) = record.get(&attr.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let encoded = codec_bridge::encode(&attr.attr_type, value).map_err(|reason| StoreError::Encoding {
            attribute: attr.name.clone(),
            reason,
        })?;
        out.push((attr.name.clone(), encoded));
    }
    Ok(out)
}

fn entry_bytes(entries: &[(String, String)]) -> usize {
    entries
        .iter()
        .map(|(k, v)| k.len() + v.len() + KEY_OVERHEAD_BYTES)
        .sum()
}

fn metadata_bytes(metadata: &BTreeMap<String, String>) -> usize {
    metadata
        .iter()
        .map(|(k, v)| k.len() + v.len() + KEY_OVERHEAD_BYTES)
        .sum()
}

fn fits(metadata: &BTreeMap<String, String>, entries: &[(String, String)], budget: usize) -> bool {
    metadata_bytes(metadata) + entry_bytes(entries) <= budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::schema::{AttributeDef, AttributeType};

    fn schema() -> Schema {
        Schema::compile(
            "users",
            1,
            vec![
                AttributeDef::new("name", AttributeType::String).required(),
                AttributeDef::new("age", AttributeType::Int),
                AttributeDef::new("bio", AttributeType::String),
            ],
            vec![],
        )
        .unwrap()
    }

    fn record() -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("name".to_string(), Value::String("Alice".to_string()));
        m.insert("age".to_string(), Value::Int(30));
        m
    }

    #[test]
    fn small_record_fits_entirely_in_metadata() {
        let packed = pack(&schema(), &ResourceConfig::default(), "u1", &record()).unwrap();
        assert!(packed.body.is_empty());
        assert_eq!(packed.metadata.get("name"), Some(&codec_bridge::encode(&AttributeType::String, &Value::String("Alice".to_string())).unwrap()));
    }

    #[test]
    fn repacking_unchanged_record_is_deterministic() {
        let a = pack(&schema(), &ResourceConfig::default(), "u1", &record()).unwrap();
        let b = pack(&schema(), &ResourceConfig::default(), "u1", &record()).unwrap();
        assert_eq!(a.metadata, b.metadata);
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn user_metadata_behavior_fails_on_overflow() {
        let mut config = ResourceConfig::default();
        config.behavior = PackingBehavior::UserMetadata;
        config.metadata_budget_bytes = 4;
        let err = pack(&schema(), &config, "u1", &record()).unwrap_err();
        assert!(matches!(err, StoreError::MetadataOverflow { .. }));
    }

    #[test]
    fn body_overflow_moves_fields_to_body_and_flags_metadata() {
        let mut config = ResourceConfig::default();
        config.behavior = PackingBehavior::BodyOverflow;
        config.metadata_budget_bytes = 4;
        let packed = pack(&schema(), &config, "u1", &record()).unwrap();
        assert!(!packed.body.is_empty());
        assert_eq!(packed.content_type, Some("application/json"));
        assert!(packed.metadata.keys().any(|k| k.starts_with("_o:")));
    }

    #[test]
    fn body_only_skips_metadata_fit_entirely() {
        let mut config = ResourceConfig::default();
        config.behavior = PackingBehavior::BodyOnly;
        let packed = pack(&schema(), &config, "u1", &record()).unwrap();
        assert_eq!(packed.metadata.get("_bodyonly"), Some(&"1".to_string()));
        assert!(!packed.body.is_empty());
    }

    #[test]
    fn pack_then_unpack_roundtrips_body_overflow() {
        let mut config = ResourceConfig::default();
        config.behavior = PackingBehavior::BodyOverflow;
        config.metadata_budget_bytes = 4;
        let schema = schema();
        let packed = pack(&schema, &config, "u1", &record()).unwrap();
        let restored = unpack(&schema, &packed.metadata, &packed.body).unwrap();
        assert_eq!(restored.get("name"), record().get("name"));
        assert_eq!(restored.get("age"), record().get("age"));
    }

    #[test]
    fn pack_then_unpack_roundtrips_body_only() {
        let mut config = ResourceConfig::default();
        config.behavior = PackingBehavior::BodyOnly;
        let schema = schema();
        let packed = pack(&schema, &config, "u1", &record()).unwrap();
        let restored = unpack(&schema, &packed.metadata, &packed.body).unwrap();
        assert_eq!(restored, record());
    }
}
