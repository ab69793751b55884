//! Checkpoints bound recovery cost: on startup, replay only transactions
//! newer than the last checkpoint instead of the full history.

use std::collections::BTreeMap;

use stratum_core::schema::{AttributeDef, AttributeType, Schema};
use stratum_core::value::Value;

#[must_use]
pub fn checkpoint_resource_name(target_resource: &str, field: &str) -> String {
    format!("plg_{target_resource}_ckpt_{field}")
}

#[must_use]
pub fn checkpoint_schema(target_resource: &str, field: &str) -> Schema {
    Schema::compile(
        checkpoint_resource_name(target_resource, field),
        1,
        vec![
            AttributeDef::new("cohort_hour", AttributeType::String).required(),
            AttributeDef::new("value", AttributeType::Float).required(),
            AttributeDef::new("max_tx_id", AttributeType::String).required(),
            AttributeDef::new("min_tx_id", AttributeType::String).required(),
        ],
        vec![],
    )
    .expect("checkpoint schema is statically well-formed")
}

/// The checkpoint id is `<original_id>` itself -- one checkpoint per
/// `(resource, id, field)`, overwritten on every successful consolidation.
#[must_use]
pub fn checkpoint_data(cohort_hour: &str, value: f64, min_tx_id: &str, max_tx_id: &str) -> BTreeMap<String, Value> {
    let mut data = BTreeMap::new();
    data.insert("cohort_hour".to_string(), Value::String(cohort_hour.to_string()));
    data.insert("value".to_string(), Value::Float(value));
    data.insert("min_tx_id".to_string(), Value::String(min_tx_id.to_string()));
    data.insert("max_tx_id".to_string(), Value::String(max_tx_id.to_string()));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_schema_compiles() {
        let schema = checkpoint_schema("accounts", "balance");
        assert_eq!(schema.resource_name, "plg_accounts_ckpt_balance");
    }
}
