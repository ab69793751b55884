//! Drift reconciliation: periodically confirms that every primary object's
//! expected partition index objects exist, and recreates any that are
//! missing (e.g. after a crash between the primary write and async fan-out).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use std::collections::BTreeMap;
use stratum_core::error::StoreError;
use stratum_core::schema::Schema;

use super::partition_key;
use crate::metadata;
use crate::object_store::ObjectStoreClient;

pub struct Reconciler {
    client: Arc<ObjectStoreClient>,
    schema: Arc<Schema>,
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Arc<ObjectStoreClient>, schema: Arc<Schema>) -> Self {
        Self { client, schema }
    }

    /// Scans up to `scan_limit` primary objects and repairs any missing
    /// partition index. Returns the number of index objects recreated.
    ///
    /// This uses the client's single-page `list`, so a resource with more
    /// primary objects than `scan_limit` is only partially covered per
    /// tick; repeated ticks eventually cover the whole resource as long as
    /// drift is rarer than the scan cadence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if listing the resource prefix fails.
    pub async fn reconcile_once(&self, scan_limit: usize) -> Result<usize, StoreError> {
        if self.schema.partitions.is_empty() {
            return Ok(0);
        }
        let prefix = format!("resource={}/id=", self.schema.resource_name);
        let page = self.client.list(&prefix, scan_limit).await?;
        let mut repaired = 0;
        for key in page.keys {
            let Ok(object) = self.client.get(&key).await else {
                continue;
            };
            let Ok(data) = metadata::unpack(&self.schema, &object.metadata, &object.body) else {
                continue;
            };
            let id = object.metadata.get("_id").cloned().unwrap_or_default();
            for partition in &self.schema.partitions {
                let expected = partition_key(&self.schema, partition, &id, &data);
                if self.client.head(&expected).await.is_err() {
                    let mut index_metadata = BTreeMap::new();
                    index_metadata.insert("_id".to_string(), id.clone());
                    self.client.put(&expected, &index_metadata, Bytes::new(), None).await?;
                    repaired += 1;
                }
            }
        }
        Ok(repaired)
    }

    /// Spawns a background task that reconciles on a fixed interval until
    /// the returned handle is aborted.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, scan_limit: usize) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.reconcile_once(scan_limit).await {
                    Ok(repaired) if repaired > 0 => {
                        tracing::info!(repaired, resource = %self.schema.resource_name, "partition drift repaired");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, resource = %self.schema.resource_name, "partition reconciliation failed");
                    }
                }
            }
        })
    }
}
