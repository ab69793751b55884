//! The per-`(record, field)` consolidation algorithm: fold pending
//! transactions onto the primary record under an exclusive lock, update
//! analytics, and write a checkpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stratum_core::config::CohortGranularity;
use stratum_core::error::StoreError;
use stratum_core::value::Value;

use super::analytics;
use super::cohort::granularity_label;
use super::lock::LockManager;
use super::transaction::Operation;
use crate::resource::Resource;
use crate::telemetry::Metrics;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as i64
}

/// The resources and configuration backing one declared `(resource, field)`
/// pair under EventualConsistency.
pub struct FieldRuntime {
    pub target_resource: Arc<Resource>,
    pub target_resource_name: String,
    pub field: String,
    pub tx_resource: Arc<Resource>,
    pub analytics_resource: Arc<Resource>,
    pub checkpoint_resource: Arc<Resource>,
    pub lock_manager: Arc<LockManager>,
    pub analytics_periods: Vec<(&'static str, &'static str)>,
    pub mark_applied_concurrency: usize,
    pub metrics: Arc<dyn Metrics>,
}

fn fold(current: f64, rows: &[BTreeMap<String, Value>]) -> f64 {
    let mut sorted: Vec<&BTreeMap<String, Value>> = rows.iter().collect();
    sorted.sort_by_key(|row| row.get("timestamp_millis").and_then(Value::as_i64).unwrap_or(0));

    let mut accumulator = current;
    for row in sorted {
        let value = row.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        match row.get("operation").and_then(Value::as_str).and_then(Operation::parse) {
            Some(Operation::Set) => accumulator = value,
            Some(Operation::Add) => accumulator += value,
            Some(Operation::Sub) => accumulator -= value,
            None => {}
        }
    }
    accumulator
}

impl FieldRuntime {
    /// Scans the transaction log and returns rows for `id` whose `applied`
    /// flag matches. A plain list-and-filter rather than the
    /// `by_original_and_applied` partition query: the partition index is
    /// written asynchronously (see [`crate::partition::PartitionEngine`]),
    /// so querying it immediately after an insert can race the not-yet-
    /// written index entry and observe no pending rows at all. The
    /// transaction log's own primary listing has no such lag.
    async fn pending_rows(&self, id: &str, applied: bool, limit: usize) -> Result<Vec<crate::resource::record::Record>, StoreError> {
        let rows = self.tx_resource.list(limit).await?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.data.get("original_id").and_then(Value::as_str) == Some(id)
                    && matches!(row.data.get("applied"), Some(Value::Bool(b)) if *b == applied)
            })
            .collect())
    }

    /// Runs one consolidation pass for `id`. Returns `true` if a
    /// consolidation actually ran (lock acquired, pending work found,
    /// target record present); `false` for any of the documented skip
    /// conditions, none of which are errors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Consolidation`] if the primary write fails
    /// permanently, or bubbles up transient/backend errors.
    pub async fn consolidate(&self, id: &str) -> Result<bool, StoreError> {
        let Some(lock) = self.lock_manager.try_acquire(&self.target_resource_name, id, &self.field).await? else {
            return Ok(false);
        };

        let pending = self.pending_rows(id, false, 10_000).await?;

        self.metrics.set_pending_transactions(&self.target_resource_name, &self.field, pending.len());
        if pending.is_empty() {
            self.lock_manager.release(lock).await;
            return Ok(false);
        }

        let Ok(target) = self.target_resource.get(id).await else {
            self.lock_manager.release(lock).await;
            return Ok(false);
        };

        let current = target.data.get(&self.field).and_then(Value::as_f64).unwrap_or(0.0);
        let rows: Vec<BTreeMap<String, Value>> = pending.iter().map(|r| r.data.clone()).collect();
        let consolidated = fold(current, &rows);

        let mut patch = BTreeMap::new();
        patch.insert(self.field.clone(), Value::Float(consolidated));
        if let Err(err) = self.target_resource.update(id, patch).await {
            self.lock_manager.release(lock).await;
            return Err(StoreError::Consolidation {
                resource: self.target_resource_name.clone(),
                id: id.to_string(),
                field: self.field.clone(),
                reason: err.to_string(),
            });
        }

        self.mark_applied(&pending, now_millis()).await;
        self.update_analytics(&rows).await;
        self.write_checkpoint(id, &pending, consolidated).await;
        self.metrics.record_consolidation(&self.target_resource_name, &self.field);

        self.lock_manager.release(lock).await;
        Ok(true)
    }

    /// Loads the most-recent checkpoint value for `id`, if one was ever
    /// written. The checkpoint already reflects every transaction applied
    /// up to that point, including ones garbage collection may since have
    /// deleted -- so it is the only sound fold base once GC has run.
    async fn load_checkpoint(&self, id: &str) -> Option<f64> {
        self.checkpoint_resource
            .get(id)
            .await
            .ok()
            .and_then(|row| row.data.get("value").and_then(Value::as_f64))
    }

    /// Recomputes `(id, field)` from the most recent checkpoint forward,
    /// folding only unapplied transactions onto it; falls back to folding
    /// every transaction from zero if no checkpoint has been written yet.
    /// Overwrites the primary field. Already-applied transactions are left
    /// untouched (`applied`/`appliedAt` unchanged).
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn recalculate(&self, id: &str) -> Result<f64, StoreError> {
        let pending = self.pending_rows(id, false, 100_000).await?;
        let pending_rows: Vec<BTreeMap<String, Value>> = pending.into_iter().map(|r| r.data).collect();

        let base = match self.load_checkpoint(id).await {
            Some(checkpoint_value) => checkpoint_value,
            None => {
                let applied = self.pending_rows(id, true, 100_000).await?;
                fold(0.0, &applied.into_iter().map(|r| r.data).collect::<Vec<_>>())
            }
        };

        let consolidated = fold(base, &pending_rows);
        let mut patch = BTreeMap::new();
        patch.insert(self.field.clone(), Value::Float(consolidated));
        self.target_resource.update(id, patch).await?;
        Ok(consolidated)
    }

    /// Read-only preview: the value the field would have after folding all
    /// currently-unapplied transactions onto the stored value, without
    /// taking the lock or writing anything. `as_of_millis` restricts the
    /// fold to transactions timestamped at or before it.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn get_consolidated_value(&self, id: &str, as_of_millis: Option<i64>) -> Result<f64, StoreError> {
        let pending = self.pending_rows(id, false, 10_000).await?;

        let current = self
            .target_resource
            .get(id)
            .await
            .ok()
            .and_then(|r| r.data.get(&self.field).and_then(Value::as_f64))
            .unwrap_or(0.0);

        let rows: Vec<BTreeMap<String, Value>> = pending
            .into_iter()
            .map(|r| r.data)
            .filter(|data| match as_of_millis {
                Some(cutoff) => data.get("timestamp_millis").and_then(Value::as_i64).unwrap_or(0) <= cutoff,
                None => true,
            })
            .collect();

        Ok(fold(current, &rows))
    }

    async fn mark_applied(&self, pending: &[crate::resource::record::Record], now: i64) {
        use futures_util::stream::{self, StreamExt};

        let patches: Vec<(String, BTreeMap<String, Value>)> = pending
            .iter()
            .map(|row| {
                let mut patch = BTreeMap::new();
                patch.insert("applied".to_string(), Value::Bool(true));
                patch.insert("applied_at_millis".to_string(), Value::Int(now));
                (row.id.clone(), patch)
            })
            .collect();

        stream::iter(patches.into_iter())
            .for_each_concurrent(self.mark_applied_concurrency, |(id, patch)| async move {
                if let Err(err) = self.tx_resource.update(&id, patch).await {
                    tracing::warn!(tx_id = %id, error = %err, "failed to mark transaction applied");
                }
            })
            .await;
    }

    async fn update_analytics(&self, rows: &[BTreeMap<String, Value>]) {
        for (period, cohort_field) in &self.analytics_periods {
            for (key, delta) in analytics::group_by_cohort(period, rows, cohort_field) {
                let cohort = key.split_once(':').map_or("", |(_, c)| c).to_string();
                if let Err(err) = analytics::apply_one(&self.analytics_resource, period, &cohort, &key, &delta).await {
                    tracing::warn!(period, cohort, error = %err, "analytics update failed");
                }
            }
        }
    }

    async fn write_checkpoint(&self, id: &str, pending: &[crate::resource::record::Record], consolidated: f64) {
        let Some(min_tx) = pending.iter().map(|r| r.id.clone()).min() else {
            return;
        };
        let max_tx = pending.iter().map(|r| r.id.clone()).max().unwrap_or_else(|| min_tx.clone());
        let cohorts = super::transaction::cohort_keys_at(now_millis());
        let mut data = super::checkpoint::checkpoint_data(&cohorts.hour, consolidated, &min_tx, &max_tx);
        data.insert("id".to_string(), Value::String(id.to_string()));
        if let Err(err) = self.checkpoint_resource.upsert(data).await {
            tracing::warn!(error = %err, "checkpoint write failed");
        }
    }
}

#[must_use]
pub fn enabled_periods(granularity: CohortGranularity) -> Vec<(&'static str, &'static str)> {
    let all = [
        (CohortGranularity::Hour, "cohort_hour"),
        (CohortGranularity::Day, "cohort_day"),
        (CohortGranularity::Week, "cohort_week"),
        (CohortGranularity::Month, "cohort_month"),
    ];
    all.iter()
        .take_while(|(g, _)| *g as u8 <= granularity as u8)
        .map(|(g, field)| (granularity_label(*g), *field))
        .collect()
}
