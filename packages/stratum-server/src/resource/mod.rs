//! Resource runtime: validated CRUD over one schema, backed by the
//! object-store client and fanned out to partition indices.

pub mod hooks;
pub mod record;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::distr::{Alphanumeric, SampleString};
use stratum_core::config::ResourceConfig;
use stratum_core::error::{FieldError, StoreError};
use stratum_core::schema::Schema;
use stratum_core::value::Value;

use self::hooks::HookRegistry;
use self::record::{Record, CREATED_AT_FIELD, DELETED_AT_FIELD, UPDATED_AT_FIELD};
use crate::metadata;
use crate::object_store::ObjectStoreClient;
use crate::partition::PartitionEngine;
use crate::telemetry::{self, Metrics};

/// Outcome of one item in a bulk operation: the bulk call never fails as a
/// whole, each item succeeds or fails independently.
pub struct ItemResult<T> {
    pub id: String,
    pub outcome: Result<T, StoreError>,
}

pub struct Resource {
    schema: Arc<Schema>,
    config: ResourceConfig,
    client: Arc<ObjectStoreClient>,
    partitions: Arc<PartitionEngine>,
    hooks: HookRegistry,
    metrics: Arc<dyn Metrics>,
}

impl Resource {
    #[must_use]
    pub fn new(schema: Schema, config: ResourceConfig, client: Arc<ObjectStoreClient>) -> Self {
        let partitions = Arc::new(PartitionEngine::new(config.partition_sync, config.partition_lane_count));
        Self {
            schema: Arc::new(schema),
            config,
            client,
            partitions,
            hooks: HookRegistry::new(),
            metrics: telemetry::noop(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    fn primary_key(&self, id: &str) -> String {
        format!("resource={}/id={id}", self.schema.resource_name)
    }

    fn generate_id(&self) -> String {
        Alphanumeric.sample_string(&mut rand::rng(), self.config.id_length)
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the epoch")
            .as_millis() as u64
    }

    /// Validates a record and writes it as new. Fails with
    /// [`StoreError::AlreadyExists`] if `id` (explicit or newly generated --
    /// practically unreachable for generated ids) is already present.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn insert(&self, mut data: BTreeMap<String, Value>) -> Result<Record, StoreError> {
        let id = match data.get("id").and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => self.generate_id(),
        };

        self.hooks.run_before_insert(&mut data).await?;

        let now = Self::now_millis();
        data.insert(CREATED_AT_FIELD.to_string(), Value::Int(now as i64));
        data.insert(UPDATED_AT_FIELD.to_string(), Value::Int(now as i64));

        self.schema.validate(&data).map_err(|errors| to_validation_error(&self.schema.resource_name, errors))?;

        let key = self.primary_key(&id);
        if self.client.head(&key).await.is_ok() {
            return Err(StoreError::AlreadyExists {
                resource: self.schema.resource_name.clone(),
                id,
            });
        }

        let packed = metadata::pack(&self.schema, &self.config, &id, &data)?;
        self.client.put(&key, &packed.metadata, packed.body, packed.content_type).await?;

        self.partitions
            .apply(self.client.clone(), self.schema.clone(), &id, None, Some(data.clone()))
            .await;

        let record = Record::from_data(id, data, now);
        self.hooks.run_after_insert(&record).await;
        self.metrics.record_insert(&self.schema.resource_name);
        Ok(record)
    }

    /// Fetches a record. Soft-deleted (paranoid) records read as not found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id has no live record.
    pub async fn get(&self, id: &str) -> Result<Record, StoreError> {
        let key = self.primary_key(id);
        let object = self.client.get(&key).await.map_err(|err| match err {
            StoreError::NotFound { .. } => StoreError::NotFound {
                resource: self.schema.resource_name.clone(),
                id: id.to_string(),
            },
            other => other,
        })?;
        let data = metadata::unpack(&self.schema, &object.metadata, &object.body)?;
        let record = Record::from_data(id.to_string(), data, Self::now_millis());
        if record.is_deleted() {
            return Err(StoreError::NotFound {
                resource: self.schema.resource_name.clone(),
                id: id.to_string(),
            });
        }
        Ok(record)
    }

    #[must_use]
    pub async fn exists(&self, id: &str) -> bool {
        self.get(id).await.is_ok()
    }

    /// Merges `patch` onto the stored record and validates the full merged
    /// result, so a patch omitting already-present required fields never
    /// spuriously fails.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn update(&self, id: &str, patch: BTreeMap<String, Value>) -> Result<Record, StoreError> {
        let prior = self.get(id).await?;
        let mut merged = prior.data.clone();
        let mut patch = patch;
        self.hooks.run_before_update(id, &prior, &mut patch).await?;
        for (key, value) in patch {
            merged.insert(key, value);
        }
        merged.insert(UPDATED_AT_FIELD.to_string(), Value::Int(Self::now_millis() as i64));

        self.schema.validate(&merged).map_err(|errors| to_validation_error(&self.schema.resource_name, errors))?;

        let key = self.primary_key(id);
        let packed = metadata::pack(&self.schema, &self.config, id, &merged)?;
        self.client.put(&key, &packed.metadata, packed.body, packed.content_type).await?;

        self.partitions
            .apply(
                self.client.clone(),
                self.schema.clone(),
                id,
                Some(prior.data.clone()),
                Some(merged.clone()),
            )
            .await;

        let updated = Record::from_data(id.to_string(), merged, Self::now_millis());
        self.hooks.run_after_update(&prior, &updated).await;
        self.metrics.record_update(&self.schema.resource_name);
        Ok(updated)
    }

    /// Insert-or-update by primary key: updates if `data["id"]` resolves to
    /// an existing record, inserts otherwise.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn upsert(&self, data: BTreeMap<String, Value>) -> Result<Record, StoreError> {
        let Some(id) = data.get("id").and_then(Value::as_str).map(str::to_string) else {
            return self.insert(data).await;
        };
        match self.get(&id).await {
            Ok(_) => self.update(&id, data).await,
            Err(StoreError::NotFound { .. }) => self.insert(data).await,
            Err(other) => Err(other),
        }
    }

    /// Deletes a record. Paranoid resources mark `_deleted_at` and keep the
    /// primary object; both modes remove partition index entries.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let record = self.get(id).await?;
        self.hooks.run_before_delete(&record).await?;

        self.partitions
            .apply(self.client.clone(), self.schema.clone(), id, Some(record.data.clone()), None)
            .await;

        let key = self.primary_key(id);
        if self.config.paranoid_delete {
            let mut data = record.data.clone();
            data.insert(DELETED_AT_FIELD.to_string(), Value::Int(Self::now_millis() as i64));
            let packed = metadata::pack(&self.schema, &self.config, id, &data)?;
            self.client.put(&key, &packed.metadata, packed.body, packed.content_type).await?;
        } else {
            self.client.delete(&key).await?;
        }

        self.hooks.run_after_delete(id).await;
        self.metrics.record_delete(&self.schema.resource_name);
        Ok(())
    }

    /// Fetches several records with bounded concurrency; each id succeeds
    /// or fails independently.
    pub async fn get_many(&self, ids: &[String]) -> Vec<ItemResult<Record>> {
        use futures_util::stream::{self, StreamExt};

        stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let outcome = self.get(&id).await;
                ItemResult { id, outcome }
            })
            .buffer_unordered(16)
            .collect()
            .await
    }

    pub async fn insert_many(&self, items: Vec<BTreeMap<String, Value>>) -> Vec<ItemResult<Record>> {
        use futures_util::stream::{self, StreamExt};

        stream::iter(items.into_iter())
            .map(|data| async move {
                let id = data.get("id").and_then(Value::as_str).map_or_else(String::new, str::to_string);
                let outcome = self.insert(data).await;
                let id = outcome.as_ref().map(|r| r.id.clone()).unwrap_or(id);
                ItemResult { id, outcome }
            })
            .buffer_unordered(16)
            .collect()
            .await
    }

    pub async fn update_many(&self, patches: Vec<(String, BTreeMap<String, Value>)>) -> Vec<ItemResult<Record>> {
        use futures_util::stream::{self, StreamExt};

        stream::iter(patches.into_iter())
            .map(|(id, patch)| async move {
                let outcome = self.update(&id, patch).await;
                ItemResult { id, outcome }
            })
            .buffer_unordered(16)
            .collect()
            .await
    }

    pub async fn delete_many(&self, ids: &[String]) -> Vec<ItemResult<()>> {
        use futures_util::stream::{self, StreamExt};

        stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let outcome = self.delete(&id).await;
                ItemResult { id, outcome }
            })
            .buffer_unordered(16)
            .collect()
            .await
    }

    /// Pages through the resource's primary objects (or a partition
    /// prefix), reassembling each into a [`Record`]. See
    /// [`crate::object_store::client::ObjectStoreClient::list`] for the
    /// single-page limitation this inherits.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn list(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let prefix = format!("resource={}/id=", self.schema.resource_name);
        let page = self.client.list(&prefix, limit).await?;
        let mut records = Vec::with_capacity(page.keys.len());
        for key in page.keys {
            let object = self.client.get(&key).await?;
            let data = metadata::unpack(&self.schema, &object.metadata, &object.body)?;
            let id = object.metadata.get("_id").cloned().unwrap_or_default();
            let record = Record::from_data(id, data, Self::now_millis());
            if !record.is_deleted() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Restricted query: prefix-scans one partition's index objects whose
    /// leading fields match `field_filters` (declared order), then resolves
    /// each matching index entry to its primary record.
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn query(
        &self,
        partition_name: &str,
        field_filters: &BTreeMap<String, Value>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let Some(partition) = self.schema.partitions.iter().find(|p| p.name == partition_name) else {
            return Err(StoreError::Permanent {
                reason: format!("no such partition {partition_name:?}"),
            });
        };

        let mut prefix = format!("resource={}/partition={partition_name}/", self.schema.resource_name);
        for field in &partition.fields {
            let Some(value) = field_filters.get(field) else {
                break;
            };
            let Some(attr) = self.schema.attribute(field) else {
                break;
            };
            let encoded = crate::metadata::codec_bridge::encode(&attr.attr_type, value)
                .map_err(|reason| StoreError::Encoding { attribute: field.clone(), reason })?;
            prefix.push_str(&format!("{field}={encoded}/"));
        }

        let page = self.client.list(&prefix, limit).await?;
        let mut records = Vec::with_capacity(page.keys.len());
        for key in page.keys {
            let index_object = self.client.get(&key).await?;
            let Some(id) = index_object.metadata.get("_id") else {
                continue;
            };
            if let Ok(record) = self.get(id).await {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Counts primary records (bounded by the same single-page list
    /// limitation as [`Resource::list`]).
    ///
    /// # Errors
    ///
    /// See [`StoreError`].
    pub async fn count(&self, limit: usize) -> Result<usize, StoreError> {
        Ok(self.list(limit).await?.len())
    }
}

fn to_validation_error(resource: &str, errors: Vec<FieldError>) -> StoreError {
    StoreError::Validation {
        resource: resource.to_string(),
        errors,
    }
}
