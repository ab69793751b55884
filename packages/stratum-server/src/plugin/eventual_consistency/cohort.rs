//! Pre-aggregated time-cohort analytics, incrementally updated on every
//! consolidation. Internal resource `plg_<target>_an_<field>`.

use std::collections::BTreeMap;

use stratum_core::config::CohortGranularity;
use stratum_core::schema::{AttributeDef, AttributeType, Schema};
use stratum_core::value::Value;

#[must_use]
pub fn analytics_resource_name(target_resource: &str, field: &str) -> String {
    format!("plg_{target_resource}_an_{field}")
}

#[must_use]
pub fn analytics_schema(target_resource: &str, field: &str) -> Schema {
    Schema::compile(
        analytics_resource_name(target_resource, field),
        1,
        vec![
            AttributeDef::new("period", AttributeType::String).required(),
            AttributeDef::new("cohort", AttributeType::String).required(),
            AttributeDef::new("count", AttributeType::Int).required(),
            AttributeDef::new("sum", AttributeType::Float).required(),
            AttributeDef::new("min", AttributeType::Float).required(),
            AttributeDef::new("max", AttributeType::Float).required(),
            AttributeDef::new("avg", AttributeType::Float).required(),
            AttributeDef::new("record_count", AttributeType::Int).required(),
            AttributeDef::new("add_count", AttributeType::Int).required(),
            AttributeDef::new("sub_count", AttributeType::Int).required(),
            AttributeDef::new("set_count", AttributeType::Int).required(),
        ],
        vec![],
    )
    .expect("analytics schema is statically well-formed")
}

#[must_use]
pub fn granularity_label(granularity: CohortGranularity) -> &'static str {
    match granularity {
        CohortGranularity::Hour => "hour",
        CohortGranularity::Day => "day",
        CohortGranularity::Week => "week",
        CohortGranularity::Month => "month",
    }
}

/// One batch of consolidated transaction deltas, grouped ahead of time by
/// the caller so analytics updates happen once per `(period, cohort)`.
pub struct BatchDelta {
    pub delta_count: i64,
    pub delta_sum: f64,
    pub batch_min: f64,
    pub batch_max: f64,
    pub distinct_original_ids: i64,
    pub add_count: i64,
    pub sub_count: i64,
    pub set_count: i64,
}

/// Folds `delta` onto the current analytics record (or a fresh zeroed one),
/// returning the updated attribute map ready to `upsert`.
#[must_use]
pub fn apply_delta(period: &str, cohort: &str, current: Option<&BTreeMap<String, Value>>, delta: &BatchDelta) -> BTreeMap<String, Value> {
    let get_i64 = |key: &str| current.and_then(|c| c.get(key)).and_then(Value::as_i64).unwrap_or(0);
    let get_f64 = |key: &str| current.and_then(|c| c.get(key)).and_then(Value::as_f64);

    let count = get_i64("count") + delta.delta_count;
    let sum = get_f64("sum").unwrap_or(0.0) + delta.delta_sum;
    let min = get_f64("min").map_or(delta.batch_min, |m| m.min(delta.batch_min));
    let max = get_f64("max").map_or(delta.batch_max, |m| m.max(delta.batch_max));
    let avg = if count == 0 { 0.0 } else { sum / count as f64 };

    let mut data = BTreeMap::new();
    data.insert("period".to_string(), Value::String(period.to_string()));
    data.insert("cohort".to_string(), Value::String(cohort.to_string()));
    data.insert("count".to_string(), Value::Int(count));
    data.insert("sum".to_string(), Value::Float(sum));
    data.insert("min".to_string(), Value::Float(min));
    data.insert("max".to_string(), Value::Float(max));
    data.insert("avg".to_string(), Value::Float(avg));
    data.insert(
        "record_count".to_string(),
        Value::Int(get_i64("record_count") + delta.distinct_original_ids),
    );
    data.insert("add_count".to_string(), Value::Int(get_i64("add_count") + delta.add_count));
    data.insert("sub_count".to_string(), Value::Int(get_i64("sub_count") + delta.sub_count));
    data.insert("set_count".to_string(), Value::Int(get_i64("set_count") + delta.set_count));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta_to_empty_seed_initializes_fields() {
        let delta = BatchDelta {
            delta_count: 3,
            delta_sum: 30.0,
            batch_min: 5.0,
            batch_max: 20.0,
            distinct_original_ids: 2,
            add_count: 2,
            sub_count: 1,
            set_count: 0,
        };
        let data = apply_delta("day", "2024-03-04", None, &delta);
        assert_eq!(data.get("count"), Some(&Value::Int(3)));
        assert_eq!(data.get("avg"), Some(&Value::Float(10.0)));
    }

    #[test]
    fn apply_delta_accumulates_onto_existing_record() {
        let delta1 = BatchDelta {
            delta_count: 2,
            delta_sum: 10.0,
            batch_min: 2.0,
            batch_max: 8.0,
            distinct_original_ids: 1,
            add_count: 2,
            sub_count: 0,
            set_count: 0,
        };
        let seed = apply_delta("day", "2024-03-04", None, &delta1);
        let delta2 = BatchDelta {
            delta_count: 1,
            delta_sum: 1.0,
            batch_min: 1.0,
            batch_max: 1.0,
            distinct_original_ids: 1,
            add_count: 0,
            sub_count: 1,
            set_count: 0,
        };
        let updated = apply_delta("day", "2024-03-04", Some(&seed), &delta2);
        assert_eq!(updated.get("count"), Some(&Value::Int(3)));
        assert_eq!(updated.get("min"), Some(&Value::Float(1.0)));
        assert_eq!(updated.get("max"), Some(&Value::Float(8.0)));
    }
}
