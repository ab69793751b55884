//! Partition index fan-out: derives partition keys, writes/deletes index
//! objects, and (in async mode) serializes per-record ordering across a
//! bounded set of worker lanes.

pub mod reconciler;

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use stratum_core::schema::{PartitionDef, Schema};
use stratum_core::value::Value;
use tokio::sync::mpsc;

use crate::metadata::codec_bridge;
use crate::object_store::ObjectStoreClient;

const NULL_SENTINEL: &str = "\u{2205}";

/// Builds the object key for one partition index entry, concatenating
/// `field=<encoded-value>` segments in declared order.
#[must_use]
pub fn partition_key(schema: &Schema, partition: &PartitionDef, id: &str, data: &BTreeMap<String, Value>) -> String {
    let mut segments = Vec::with_capacity(partition.fields.len());
    for field in &partition.fields {
        let encoded = match (schema.attribute(field), data.get(field)) {
            (Some(attr), Some(value)) if !value.is_null() => {
                codec_bridge::encode(&attr.attr_type, value).unwrap_or_else(|_| NULL_SENTINEL.to_string())
            }
            _ => NULL_SENTINEL.to_string(),
        };
        segments.push(format!("{field}={encoded}"));
    }
    format!(
        "resource={}/partition={}/{}/id={id}",
        schema.resource_name,
        partition.name,
        segments.join("/")
    )
}

struct PartitionJob {
    client: Arc<ObjectStoreClient>,
    schema: Arc<Schema>,
    id: String,
    old: Option<BTreeMap<String, Value>>,
    new: Option<BTreeMap<String, Value>>,
}

async fn run_job(job: PartitionJob) {
    for partition in &job.schema.partitions {
        let old_key = job.old.as_ref().map(|data| partition_key(&job.schema, partition, &job.id, data));
        let new_key = job.new.as_ref().map(|data| partition_key(&job.schema, partition, &job.id, data));
        if old_key == new_key {
            continue;
        }
        if let Some(old_key) = &old_key {
            if let Err(err) = job.client.delete(old_key).await {
                tracing::warn!(key = %old_key, error = %err, "failed to delete stale partition index");
            }
        }
        if let Some(new_key) = &new_key {
            let mut metadata = BTreeMap::new();
            metadata.insert("_id".to_string(), job.id.clone());
            if let Err(err) = job.client.put(new_key, &metadata, Bytes::new(), None).await {
                tracing::warn!(key = %new_key, error = %err, "failed to write partition index");
            }
        }
    }
}

/// Fan-out engine for one resource's partition set. Async mode serializes
/// per-id ordering across `lane_count` worker lanes (`hash(id) % lane_count`);
/// sync mode awaits the fan-out inline.
pub struct PartitionEngine {
    lanes: Vec<mpsc::UnboundedSender<PartitionJob>>,
}

impl PartitionEngine {
    #[must_use]
    pub fn new(sync: bool, lane_count: usize) -> Self {
        if sync {
            return Self { lanes: Vec::new() };
        }
        let lane_count = lane_count.max(1);
        let mut lanes = Vec::with_capacity(lane_count);
        for _ in 0..lane_count {
            let (tx, mut rx) = mpsc::unbounded_channel::<PartitionJob>();
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    run_job(job).await;
                }
            });
            lanes.push(tx);
        }
        Self { lanes }
    }

    /// Applies the partition delta for one record write. `old` is the
    /// pre-write data (`None` on insert), `new` is the post-write data
    /// (`None` on hard delete).
    pub async fn apply(
        &self,
        client: Arc<ObjectStoreClient>,
        schema: Arc<Schema>,
        id: &str,
        old: Option<BTreeMap<String, Value>>,
        new: Option<BTreeMap<String, Value>>,
    ) {
        let job = PartitionJob {
            client,
            schema,
            id: id.to_string(),
            old,
            new,
        };
        if self.lanes.is_empty() {
            run_job(job).await;
            return;
        }
        let lane = lane_index(id, self.lanes.len());
        if self.lanes[lane].send(job).is_err() {
            tracing::error!("partition lane worker is gone");
        }
    }
}

fn lane_index(id: &str, lane_count: usize) -> usize {
    let mut hasher = ahash::AHasher::default();
    id.hash(&mut hasher);
    (hasher.finish() as usize) % lane_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::schema::AttributeType;

    fn schema() -> Schema {
        Schema::compile(
            "users",
            1,
            vec![stratum_core::schema::AttributeDef::new("country", AttributeType::String)],
            vec![PartitionDef {
                name: "by_country".to_string(),
                fields: vec!["country".to_string()],
            }],
        )
        .unwrap()
    }

    #[test]
    fn partition_key_concatenates_declared_fields() {
        let schema = schema();
        let mut data = BTreeMap::new();
        data.insert("country".to_string(), Value::String("US".to_string()));
        let key = partition_key(&schema, &schema.partitions[0], "u1", &data);
        assert!(key.starts_with("resource=users/partition=by_country/country="));
        assert!(key.ends_with("/id=u1"));
    }

    #[test]
    fn partition_key_uses_sentinel_for_missing_field() {
        let schema = schema();
        let data = BTreeMap::new();
        let key = partition_key(&schema, &schema.partitions[0], "u1", &data);
        assert!(key.contains(NULL_SENTINEL));
    }

    #[test]
    fn lane_index_is_stable_for_same_id() {
        assert_eq!(lane_index("abc", 16), lane_index("abc", 16));
    }
}
