//! Attribute compilation and schema validation.
//!
//! Attribute declarations are parsed once per resource, at `compile()` time,
//! into a [`Schema`] that cross-checks partition field references and codec
//! parameters before any data is written. `validate()` then runs on every
//! insert and (merged) update.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::value::Value;

/// The semantic type of an attribute, routing it to a codec or to plain
/// JSON storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Int,
    Float,
    Bool,
    /// Opaque JSON. Nesting is limited to one level by [`Schema::compile`].
    Json,
    /// Like `String`, but excluded from projections and redacted in logs.
    Secret,
    Decimal { precision: u32 },
    Money,
    Geo,
    Ipv4,
    Ipv6,
    Embedding { precision: u32 },
    /// One level of nesting: each element is validated against `item`, which
    /// itself must not be `Json` with further nested attributes.
    Array { item: Box<AttributeType> },
}

/// A single attribute declaration within a [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(flatten)]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub regex: Option<String>,
}

impl AttributeDef {
    #[must_use]
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            default: None,
            min: None,
            max: None,
            max_length: None,
            enum_values: None,
            regex: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A partition derives a secondary key from one or more declared attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDef {
    pub name: String,
    pub fields: Vec<String>,
}

/// A compiled schema: attribute definitions plus the partition fields that
/// reference them, cross-checked at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub resource_name: String,
    pub version: u32,
    pub attributes: Vec<AttributeDef>,
    pub partitions: Vec<PartitionDef>,
}

/// Compile-time configuration error: a schema that cannot be used at all,
/// as opposed to a per-record validation failure.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("partition {partition:?} references undeclared attribute {field:?}")]
    UndeclaredPartitionField { partition: String, field: String },
    #[error("attribute {attribute:?} has invalid regex: {reason}")]
    InvalidRegex { attribute: String, reason: String },
    #[error("attribute {attribute:?}: json attributes may nest at most one level")]
    NestingTooDeep { attribute: String },
    #[error("duplicate attribute name {name:?}")]
    DuplicateAttribute { name: String },
}

impl Schema {
    /// Compiles raw attribute/partition declarations into a [`Schema`],
    /// cross-checking partition field references, regex validity, and
    /// nesting depth. This mirrors the "compile schema, then compile
    /// resource" two-pass startup sequence: attribute parsing itself never
    /// fails (it's just deserialization), only the cross-checks here can.
    ///
    /// # Errors
    ///
    /// See [`SchemaError`].
    pub fn compile(
        resource_name: impl Into<String>,
        version: u32,
        attributes: Vec<AttributeDef>,
        partitions: Vec<PartitionDef>,
    ) -> Result<Schema, SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for attr in &attributes {
            if !seen.insert(attr.name.clone()) {
                return Err(SchemaError::DuplicateAttribute {
                    name: attr.name.clone(),
                });
            }
            if let Some(pattern) = &attr.regex {
                Regex::new(pattern).map_err(|e| SchemaError::InvalidRegex {
                    attribute: attr.name.clone(),
                    reason: e.to_string(),
                })?;
            }
            if let AttributeType::Array { item } = &attr.attr_type {
                if matches!(item.as_ref(), AttributeType::Array { .. }) {
                    return Err(SchemaError::NestingTooDeep {
                        attribute: attr.name.clone(),
                    });
                }
            }
        }

        for partition in &partitions {
            for field in &partition.fields {
                if !seen.contains(field) {
                    return Err(SchemaError::UndeclaredPartitionField {
                        partition: partition.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok(Schema {
            resource_name: resource_name.into(),
            version,
            attributes,
            partitions,
        })
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Validates a record against the full attribute set.
    ///
    /// Used both for `insert` (validating the complete record) and for
    /// `update` (validating the patch already merged onto the stored
    /// record), so a patch omitting already-present required fields never
    /// spuriously fails.
    pub fn validate(&self, data: &BTreeMap<String, Value>) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        for attr in &self.attributes {
            let value = data.get(&attr.name);
            match value {
                None | Some(Value::Null) => {
                    if attr.required && attr.default.is_none() {
                        errors.push(FieldError {
                            path: attr.name.clone(),
                            reason: "required field is missing".to_string(),
                        });
                    }
                }
                Some(v) => {
                    if let Err(reason) = validate_value(attr, v) {
                        errors.push(FieldError {
                            path: attr.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(resource = %self.resource_name, count = errors.len(), "validation failed");
            Err(errors)
        }
    }
}

fn validate_value(attr: &AttributeDef, value: &Value) -> Result<(), String> {
    match (&attr.attr_type, value) {
        (AttributeType::String | AttributeType::Secret, Value::String(s)) => {
            if let Some(max_length) = attr.max_length {
                if s.len() > max_length {
                    return Err(format!("length {} exceeds max_length {max_length}", s.len()));
                }
            }
            if let Some(values) = &attr.enum_values {
                if !values.iter().any(|v| v == s) {
                    return Err(format!("{s:?} is not one of {values:?}"));
                }
            }
            if let Some(pattern) = &attr.regex {
                let re = Regex::new(pattern).map_err(|e| e.to_string())?;
                if !re.is_match(s) {
                    return Err(format!("{s:?} does not match pattern {pattern:?}"));
                }
            }
            Ok(())
        }
        (AttributeType::Int, Value::Int(i)) => check_range(attr, *i as f64),
        (AttributeType::Float | AttributeType::Decimal { .. }, v) => {
            let f = v.as_f64().ok_or("expected a number")?;
            check_range(attr, f)
        }
        (AttributeType::Bool, Value::Bool(_)) => Ok(()),
        (AttributeType::Json, _) => Ok(()),
        (AttributeType::Money, Value::Map(m)) => {
            if m.contains_key("amount") && m.contains_key("currency") {
                Ok(())
            } else {
                Err("money attribute requires 'amount' and 'currency'".to_string())
            }
        }
        (AttributeType::Geo, Value::Map(m)) => {
            if m.contains_key("lat") && m.contains_key("lon") {
                Ok(())
            } else {
                Err("geo attribute requires 'lat' and 'lon'".to_string())
            }
        }
        (AttributeType::Ipv4 | AttributeType::Ipv6, Value::String(_)) => Ok(()),
        (AttributeType::Embedding { .. }, Value::Array(items)) => {
            if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
                Ok(())
            } else {
                Err("embedding elements must all be numeric".to_string())
            }
        }
        (AttributeType::Array { item }, Value::Array(items)) => {
            let item_attr = AttributeDef::new(attr.name.clone(), (**item).clone());
            for (i, element) in items.iter().enumerate() {
                validate_value(&item_attr, element)
                    .map_err(|reason| format!("index {i}: {reason}"))?;
            }
            Ok(())
        }
        (expected, actual) => Err(format!(
            "expected {expected:?}, got {}",
            actual.type_name()
        )),
    }
}

fn check_range(attr: &AttributeDef, value: f64) -> Result<(), String> {
    if let Some(min) = attr.min {
        if value < min {
            return Err(format!("{value} is below min {min}"));
        }
    }
    if let Some(max) = attr.max {
        if value > max {
            return Err(format!("{value} is above max {max}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::compile(
            "users",
            1,
            vec![
                AttributeDef::new("name", AttributeType::String).required(),
                AttributeDef::new("age", AttributeType::Int),
                AttributeDef::new("country", AttributeType::String),
            ],
            vec![PartitionDef {
                name: "by_country".to_string(),
                fields: vec!["country".to_string()],
            }],
        )
        .unwrap()
    }

    #[test]
    fn compile_rejects_undeclared_partition_field() {
        let err = Schema::compile(
            "users",
            1,
            vec![AttributeDef::new("name", AttributeType::String)],
            vec![PartitionDef {
                name: "by_country".to_string(),
                fields: vec!["country".to_string()],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UndeclaredPartitionField { .. }));
    }

    #[test]
    fn compile_rejects_duplicate_attribute() {
        let err = Schema::compile(
            "users",
            1,
            vec![
                AttributeDef::new("name", AttributeType::String),
                AttributeDef::new("name", AttributeType::Int),
            ],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateAttribute { .. }));
    }

    #[test]
    fn compile_rejects_invalid_regex() {
        let mut attr = AttributeDef::new("name", AttributeType::String);
        attr.regex = Some("(".to_string());
        let err = Schema::compile("users", 1, vec![attr], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRegex { .. }));
    }

    #[test]
    fn compile_rejects_nested_arrays() {
        let attr = AttributeDef::new(
            "matrix",
            AttributeType::Array {
                item: Box::new(AttributeType::Array {
                    item: Box::new(AttributeType::Int),
                }),
            },
        );
        let err = Schema::compile("users", 1, vec![attr], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::NestingTooDeep { .. }));
    }

    #[test]
    fn validate_missing_required_field_fails() {
        let schema = sample_schema();
        let data = BTreeMap::new();
        let errors = schema.validate(&data).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "name");
    }

    #[test]
    fn validate_present_required_field_passes() {
        let schema = sample_schema();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        assert!(schema.validate(&data).is_ok());
    }

    #[test]
    fn validate_wrong_type_fails() {
        let schema = sample_schema();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("age".to_string(), Value::String("not a number".to_string()));
        let errors = schema.validate(&data).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "age"));
    }

    #[test]
    fn validate_partial_update_does_not_require_untouched_fields() {
        // Simulates the merged-record shape update() builds: only `age` was
        // touched by the patch, but `name` (already stored) is still present
        // in the merged map, so validation of the full merge succeeds.
        let schema = sample_schema();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("age".to_string(), Value::Int(31));
        assert!(schema.validate(&data).is_ok());
    }

    #[test]
    fn validate_enum_rejects_unknown_value() {
        let mut attr = AttributeDef::new("status", AttributeType::String);
        attr.enum_values = Some(vec!["active".to_string(), "inactive".to_string()]);
        let schema = Schema::compile("items", 1, vec![attr], vec![]).unwrap();

        let mut data = BTreeMap::new();
        data.insert("status".to_string(), Value::String("bogus".to_string()));
        assert!(schema.validate(&data).is_err());
    }
}
