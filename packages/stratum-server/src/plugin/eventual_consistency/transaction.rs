//! Transaction log schema and cohort-key computation.
//!
//! Each `(resource, field)` gets its own internal transaction resource,
//! named `plg_<target>_tx_<field>` per the external object-key convention,
//! storing append-only rows with `applied` flipped in place by the
//! consolidator.

use chrono::{DateTime, Datelike, Utc};
use stratum_core::schema::{AttributeDef, AttributeType, PartitionDef, Schema};
use stratum_core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Sub,
    Set,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Sub => "sub",
            Operation::Set => "set",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Operation::Add),
            "sub" => Some(Operation::Sub),
            "set" => Some(Operation::Set),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CohortKeys {
    pub hour: String,
    pub day: String,
    pub week: String,
    pub month: String,
}

#[must_use]
pub fn cohort_keys_at(millis: i64) -> CohortKeys {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    let week = dt.iso_week();
    CohortKeys {
        hour: dt.format("%Y-%m-%dT%H").to_string(),
        day: dt.format("%Y-%m-%d").to_string(),
        week: format!("{}-W{:02}", week.year(), week.week()),
        month: dt.format("%Y-%m").to_string(),
    }
}

/// The internal resource name for `(target_resource, field)`'s transaction
/// log, per the `plg_<target>_tx_<field>` object-key convention.
#[must_use]
pub fn transaction_resource_name(target_resource: &str, field: &str) -> String {
    format!("plg_{target_resource}_tx_{field}")
}

#[must_use]
pub fn transaction_schema(target_resource: &str, field: &str) -> Schema {
    Schema::compile(
        transaction_resource_name(target_resource, field),
        1,
        vec![
            AttributeDef::new("original_id", AttributeType::String).required(),
            AttributeDef::new("field", AttributeType::String).required(),
            AttributeDef::new("value", AttributeType::Float).required(),
            AttributeDef::new("operation", AttributeType::String).required(),
            AttributeDef::new("timestamp_millis", AttributeType::Int).required(),
            AttributeDef::new("cohort_hour", AttributeType::String).required(),
            AttributeDef::new("cohort_day", AttributeType::String).required(),
            AttributeDef::new("cohort_week", AttributeType::String).required(),
            AttributeDef::new("cohort_month", AttributeType::String).required(),
            AttributeDef::new("applied", AttributeType::Bool).required(),
            AttributeDef::new("applied_at_millis", AttributeType::Int),
        ],
        vec![PartitionDef {
            name: "by_original_and_applied".to_string(),
            fields: vec!["original_id".to_string(), "applied".to_string()],
        }],
    )
    .expect("transaction schema is statically well-formed")
}

#[must_use]
pub fn new_transaction_data(
    original_id: &str,
    field: &str,
    operation: Operation,
    value: f64,
    now_millis: i64,
) -> std::collections::BTreeMap<String, Value> {
    let cohorts = cohort_keys_at(now_millis);
    let mut data = std::collections::BTreeMap::new();
    data.insert("original_id".to_string(), Value::String(original_id.to_string()));
    data.insert("field".to_string(), Value::String(field.to_string()));
    data.insert("value".to_string(), Value::Float(value));
    data.insert("operation".to_string(), Value::String(operation.as_str().to_string()));
    data.insert("timestamp_millis".to_string(), Value::Int(now_millis));
    data.insert("cohort_hour".to_string(), Value::String(cohorts.hour));
    data.insert("cohort_day".to_string(), Value::String(cohorts.day));
    data.insert("cohort_week".to_string(), Value::String(cohorts.week));
    data.insert("cohort_month".to_string(), Value::String(cohorts.month));
    data.insert("applied".to_string(), Value::Bool(false));
    data
}
