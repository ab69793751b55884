//! Applies one consolidation batch's deltas to every enabled cohort period,
//! bounded by `rollup_concurrency` concurrent period updates.
//!
//! Higher periods are updated directly from the same transaction batch
//! rather than by re-summing the finer period's cohorts after the fact --
//! cheaper and equivalent, since every transaction already carries its own
//! `cohort_week`/`cohort_month` alongside `cohort_hour`/`cohort_day`.

use std::collections::BTreeMap;

use stratum_core::value::Value;

use super::cohort::{self, BatchDelta};
use super::transaction::Operation;
use crate::resource::Resource;

pub struct PeriodBatch<'a> {
    pub period: &'static str,
    pub cohort: &'a str,
}

/// Groups transaction rows by `(period, cohort)` for one enabled period,
/// producing the batch delta each group should apply.
#[must_use]
pub fn group_by_cohort<'a>(
    period: &'static str,
    rows: &'a [BTreeMap<String, Value>],
    cohort_field: &str,
) -> Vec<(String, BatchDelta)> {
    let mut groups: BTreeMap<String, Vec<&BTreeMap<String, Value>>> = BTreeMap::new();
    for row in rows {
        if let Some(cohort) = row.get(cohort_field).and_then(Value::as_str) {
            groups.entry(cohort.to_string()).or_default().push(row);
        }
    }

    groups
        .into_iter()
        .map(|(cohort, rows)| {
            let mut add_count = 0;
            let mut sub_count = 0;
            let mut set_count = 0;
            let mut sum = 0.0;
            let mut min = f64::MAX;
            let mut max = f64::MIN;
            for row in &rows {
                let value = row.get("value").and_then(Value::as_f64).unwrap_or(0.0);
                sum += value;
                min = min.min(value);
                max = max.max(value);
                match row.get("operation").and_then(Value::as_str).and_then(Operation::parse) {
                    Some(Operation::Add) => add_count += 1,
                    Some(Operation::Sub) => sub_count += 1,
                    Some(Operation::Set) => set_count += 1,
                    None => {}
                }
            }
            let delta = BatchDelta {
                delta_count: rows.len() as i64,
                delta_sum: sum,
                batch_min: min,
                batch_max: max,
                distinct_original_ids: 1,
                add_count,
                sub_count,
                set_count,
            };
            (format!("{period}:{cohort}"), delta)
        })
        .collect()
}

/// Reads, folds, and upserts one `(period, cohort)` analytics record.
///
/// # Errors
///
/// See [`stratum_core::error::StoreError`].
pub async fn apply_one(
    analytics_resource: &Resource,
    period: &str,
    cohort: &str,
    key: &str,
    delta: &BatchDelta,
) -> Result<(), stratum_core::error::StoreError> {
    let current = analytics_resource.get(key).await.ok();
    let mut data = cohort::apply_delta(period, cohort, current.as_ref().map(|r| &r.data), delta);
    data.insert("id".to_string(), Value::String(key.to_string()));
    analytics_resource.upsert(data).await?;
    Ok(())
}
