//! EventualConsistency: turns declared numeric fields into an append-only
//! transaction log with deterministic consolidation, time-cohort analytics,
//! per-`(record, field)` locking, checkpoints, and garbage collection.
//!
//! One [`EventualConsistency`] instance manages one target resource; its
//! `config.fields` names the numeric fields on that resource to track.

pub mod analytics;
pub mod checkpoint;
pub mod cohort;
pub mod consolidator;
pub mod gc;
pub mod lock;
pub mod transaction;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use stratum_core::config::{EventualConsistencyConfig, ResourceConfig};
use stratum_core::error::StoreError;
use stratum_core::value::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use self::consolidator::{enabled_periods, FieldRuntime};
use self::lock::LockManager;
use self::transaction::{new_transaction_data, Operation};
use crate::database::Database;
use crate::plugin::Plugin;
use crate::telemetry::{self, Metrics};

/// A read-only preview option for [`EventualConsistency::get_consolidated_value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidatedValueOptions {
    pub as_of_millis: Option<i64>,
}

struct Background {
    shutdown: Notify,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

pub struct EventualConsistency {
    target_resource_name: String,
    config: EventualConsistencyConfig,
    fields: DashMap<String, Arc<FieldRuntime>>,
    background: Arc<Background>,
    metrics: Arc<dyn Metrics>,
}

impl EventualConsistency {
    #[must_use]
    pub fn new(target_resource_name: impl Into<String>, config: EventualConsistencyConfig) -> Self {
        Self {
            target_resource_name: target_resource_name.into(),
            config,
            fields: DashMap::new(),
            background: Arc::new(Background {
                shutdown: Notify::new(),
                handles: parking_lot::Mutex::new(Vec::new()),
            }),
            metrics: telemetry::noop(),
        }
    }

    /// Overrides the default no-op metrics sink, e.g. with
    /// [`crate::telemetry::FacadeMetrics`].
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn field_runtime(&self, field: &str) -> Result<Arc<FieldRuntime>, StoreError> {
        self.fields
            .get(field)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::Permanent {
                reason: format!("field {field:?} is not tracked by EventualConsistency on {}", self.target_resource_name),
            })
    }

    async fn record_transaction(&self, id: &str, field: &str, operation: Operation, value: f64) -> Result<(), StoreError> {
        let runtime = self.field_runtime(field)?;
        let now = chrono::Utc::now().timestamp_millis();
        let data = new_transaction_data(id, field, operation, value, now);
        runtime.tx_resource.insert(data).await?;

        if self.config.sync_mode {
            runtime.consolidate(id).await?;
        }
        Ok(())
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn add(&self, id: &str, field: &str, delta: f64) -> Result<(), StoreError> {
        self.record_transaction(id, field, Operation::Add, delta).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn sub(&self, id: &str, field: &str, delta: f64) -> Result<(), StoreError> {
        self.record_transaction(id, field, Operation::Sub, delta).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn set(&self, id: &str, field: &str, value: f64) -> Result<(), StoreError> {
        self.record_transaction(id, field, Operation::Set, value).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn increment(&self, id: &str, field: &str) -> Result<(), StoreError> {
        self.add(id, field, 1.0).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn decrement(&self, id: &str, field: &str) -> Result<(), StoreError> {
        self.sub(id, field, 1.0).await
    }

    /// Forces a consolidation pass for `(id, field)`, skipping if the lock
    /// is held elsewhere or there is no pending work.
    ///
    /// # Errors
    /// See [`StoreError`].
    pub async fn consolidate(&self, id: &str, field: &str) -> Result<bool, StoreError> {
        self.field_runtime(field)?.consolidate(id).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn recalculate(&self, id: &str, field: &str) -> Result<f64, StoreError> {
        self.field_runtime(field)?.recalculate(id).await
    }

    /// # Errors
    /// See [`StoreError`].
    pub async fn get_consolidated_value(
        &self,
        id: &str,
        field: &str,
        opts: ConsolidatedValueOptions,
    ) -> Result<f64, StoreError> {
        self.field_runtime(field)?.get_consolidated_value(id, opts.as_of_millis).await
    }

    async fn scan_pending_ids(runtime: &FieldRuntime, scan_limit: usize) -> HashSet<String> {
        let rows = runtime.tx_resource.list(scan_limit).await.unwrap_or_default();
        rows.into_iter()
            .filter(|row| matches!(row.data.get("applied"), Some(Value::Bool(false))))
            .filter_map(|row| row.data.get("original_id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    fn spawn_consolidation_ticker(&self) {
        let interval = Duration::from_millis(self.config.consolidation_interval_ms);
        let concurrency = self.config.consolidation_concurrency;
        let runtimes: Vec<Arc<FieldRuntime>> = self.fields.iter().map(|e| e.value().clone()).collect();
        let background = self.background.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = background.shutdown.notified() => break,
                    _ = ticker.tick() => {}
                }
                for runtime in &runtimes {
                    let ids = Self::scan_pending_ids(runtime, 10_000).await;
                    use futures_util::stream::{self, StreamExt};
                    stream::iter(ids.into_iter())
                        .for_each_concurrent(concurrency, |id| async move {
                            if let Err(err) = runtime.consolidate(&id).await {
                                tracing::warn!(id = %id, error = %err, "auto-consolidation failed");
                            }
                        })
                        .await;
                }
            }
        });
        self.background.handles.lock().push(handle);
    }

    /// Replays every `(id, field)` with unapplied transactions once at
    /// startup, so a restart doesn't wait for the next ticker interval (or
    /// the next write to that id) to catch up. Each replay folds forward
    /// from `target_resource`'s stored value -- kept in lockstep with the
    /// last checkpoint on every successful consolidation -- so this is
    /// already checkpoint-consistent without re-reading the checkpoint here.
    async fn recover(&self) {
        for entry in self.fields.iter() {
            let runtime = entry.value().clone();
            let ids = Self::scan_pending_ids(&runtime, 10_000).await;
            for id in ids {
                if let Err(err) = runtime.consolidate(&id).await {
                    tracing::warn!(id = %id, field = %runtime.field, error = %err, "startup recovery consolidation failed");
                }
            }
        }
    }

    fn spawn_gc_ticker(&self) {
        let interval = Duration::from_millis(self.config.gc_interval_ms);
        let retain_ms = self.config.gc_retain_applied_ms as i64;
        let runtimes: Vec<Arc<FieldRuntime>> = self.fields.iter().map(|e| e.value().clone()).collect();
        let background = self.background.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = background.shutdown.notified() => break,
                    _ = ticker.tick() => {}
                }
                for runtime in &runtimes {
                    let deleted = gc::collect_once(
                        &runtime.tx_resource,
                        retain_ms,
                        10_000,
                        &runtime.target_resource_name,
                        &runtime.field,
                        runtime.metrics.as_ref(),
                    )
                    .await;
                    if deleted > 0 {
                        tracing::info!(deleted, field = %runtime.field, "garbage collected applied transactions");
                    }
                }
            }
        });
        self.background.handles.lock().push(handle);
    }
}

#[async_trait]
impl Plugin for EventualConsistency {
    fn name(&self) -> &str {
        "eventual-consistency"
    }

    async fn install(&self, db: &Database) -> Result<(), StoreError> {
        let Some(target_resource) = db.resource(&self.target_resource_name) else {
            return Err(StoreError::Permanent {
                reason: format!("target resource {:?} must be registered before installing EventualConsistency", self.target_resource_name),
            });
        };

        let periods = enabled_periods(self.config.cohort_granularity);
        let lock_manager = Arc::new(LockManager::new(db.client(), self.config.lock_ttl_ms));

        for field in &self.config.fields {
            let tx_schema = transaction::transaction_schema(&self.target_resource_name, field);
            let tx_resource = db.register_resource(tx_schema, ResourceConfig::default());

            let analytics_schema = cohort::analytics_schema(&self.target_resource_name, field);
            let analytics_resource = db.register_resource(analytics_schema, ResourceConfig::default());

            let checkpoint_schema = checkpoint::checkpoint_schema(&self.target_resource_name, field);
            let checkpoint_resource = db.register_resource(checkpoint_schema, ResourceConfig::default());

            let runtime = Arc::new(FieldRuntime {
                target_resource: target_resource.clone(),
                target_resource_name: self.target_resource_name.clone(),
                field: field.clone(),
                tx_resource,
                analytics_resource,
                checkpoint_resource,
                lock_manager: lock_manager.clone(),
                analytics_periods: periods.clone(),
                mark_applied_concurrency: self.config.mark_applied_concurrency,
                metrics: self.metrics.clone(),
            });
            self.fields.insert(field.clone(), runtime);
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), StoreError> {
        self.recover().await;
        if !self.config.sync_mode {
            self.spawn_consolidation_ticker();
        }
        self.spawn_gc_ticker();
        Ok(())
    }

    async fn stop(&self, graceful: bool) -> Result<(), StoreError> {
        self.background.shutdown.notify_waiters();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.background.handles.lock());
        if graceful {
            for handle in handles {
                let _ = handle.await;
            }
        } else {
            for handle in handles {
                handle.abort();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::schema::{AttributeDef, AttributeType, Schema};

    async fn setup() -> (Database, Arc<EventualConsistency>) {
        let db_config = stratum_core::config::DatabaseConfig::new("memory://");
        let mut db = Database::connect(&db_config).unwrap();

        let schema = Schema::compile(
            "accounts",
            1,
            vec![
                AttributeDef::new("name", AttributeType::String).required(),
                AttributeDef::new("balance", AttributeType::Float),
            ],
            vec![],
        )
        .unwrap();
        db.register_resource(schema, ResourceConfig::default());

        let mut ec_config = EventualConsistencyConfig::default();
        ec_config.fields = vec!["balance".to_string()];
        ec_config.sync_mode = true;
        let plugin = Arc::new(EventualConsistency::new("accounts", ec_config));
        db.register_plugin(plugin.clone());
        db.start_plugins().await.unwrap();
        (db, plugin)
    }

    #[tokio::test]
    async fn add_then_sync_consolidate_updates_primary_field() {
        let (db, plugin) = setup().await;
        let accounts = db.resource("accounts").unwrap();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("balance".to_string(), Value::Float(0.0));
        let account = accounts.insert(data).await.unwrap();

        plugin.add(&account.id, "balance", 10.0).await.unwrap();
        plugin.add(&account.id, "balance", 5.0).await.unwrap();

        let updated = accounts.get(&account.id).await.unwrap();
        assert_eq!(updated.data.get("balance"), Some(&Value::Float(15.0)));
    }

    #[tokio::test]
    async fn get_consolidated_value_previews_without_writing() {
        let (db, plugin) = setup().await;
        let accounts = db.resource("accounts").unwrap();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("balance".to_string(), Value::Float(0.0));
        let account = accounts.insert(data).await.unwrap();
        plugin.add(&account.id, "balance", 10.0).await.unwrap();

        let preview = plugin
            .get_consolidated_value(&account.id, "balance", ConsolidatedValueOptions::default())
            .await
            .unwrap();
        assert_eq!(preview, 10.0);
    }

    async fn setup_async() -> (Database, Arc<EventualConsistency>) {
        let db_config = stratum_core::config::DatabaseConfig::new("memory://");
        let mut db = Database::connect(&db_config).unwrap();

        let schema = Schema::compile(
            "accounts",
            1,
            vec![
                AttributeDef::new("name", AttributeType::String).required(),
                AttributeDef::new("balance", AttributeType::Float),
            ],
            vec![],
        )
        .unwrap();
        db.register_resource(schema, ResourceConfig::default());

        let mut ec_config = EventualConsistencyConfig::default();
        ec_config.fields = vec!["balance".to_string()];
        ec_config.sync_mode = false;
        let plugin = Arc::new(EventualConsistency::new("accounts", ec_config));
        db.register_plugin(plugin.clone());
        db.start_plugins().await.unwrap();
        (db, plugin)
    }

    #[tokio::test]
    async fn recover_consolidates_pending_transactions_left_over_from_before_a_restart() {
        let (db, plugin) = setup_async().await;
        let accounts = db.resource("accounts").unwrap();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("balance".to_string(), Value::Float(0.0));
        let account = accounts.insert(data).await.unwrap();

        plugin.add(&account.id, "balance", 10.0).await.unwrap();
        // Async mode: the add above only appends to the transaction log.
        let untouched = accounts.get(&account.id).await.unwrap();
        assert_eq!(untouched.data.get("balance"), Some(&Value::Float(0.0)));

        // Simulates the recovery pass a fresh process runs on startup.
        plugin.recover().await;

        let recovered = accounts.get(&account.id).await.unwrap();
        assert_eq!(recovered.data.get("balance"), Some(&Value::Float(10.0)));
    }

    #[tokio::test]
    async fn recalculate_falls_back_to_checkpoint_once_applied_rows_are_gc_d() {
        let (db, plugin) = setup().await;
        let accounts = db.resource("accounts").unwrap();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::String("Alice".to_string()));
        data.insert("balance".to_string(), Value::Float(0.0));
        let account = accounts.insert(data).await.unwrap();

        // Sync mode consolidates immediately, writing a checkpoint of 10.0.
        plugin.add(&account.id, "balance", 10.0).await.unwrap();

        // Simulate garbage collection deleting the now-applied transaction.
        let runtime = plugin.field_runtime("balance").unwrap();
        for row in runtime.tx_resource.list(100).await.unwrap() {
            runtime.tx_resource.delete(&row.id).await.unwrap();
        }

        // With no transaction history left, only the checkpoint can recover
        // the correct value -- a naive from-scratch fold would see 0.0.
        let recalculated = plugin.recalculate(&account.id, "balance").await.unwrap();
        assert_eq!(recalculated, 10.0);
    }
}
