//! Garbage collection: hard-deletes `applied=true` transactions past the
//! retention window. Never touches `applied=false` rows regardless of age
//! -- checkpoints are what make this safe, by summarizing pre-retention
//! history.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stratum_core::value::Value;

use crate::resource::Resource;
use crate::telemetry::Metrics;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as i64
}

/// Scans up to `scan_limit` transaction rows and deletes every one with
/// `applied=true` and `applied_at_millis` older than `retain_ms`. Returns
/// the number deleted.
pub async fn collect_once(
    tx_resource: &Arc<Resource>,
    retain_ms: i64,
    scan_limit: usize,
    resource_name: &str,
    field: &str,
    metrics: &dyn Metrics,
) -> usize {
    let cutoff = now_millis() - retain_ms;
    let rows = match tx_resource.list(scan_limit).await {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(error = %err, "gc scan failed");
            return 0;
        }
    };

    let expired: Vec<String> = rows
        .into_iter()
        .filter(|row| {
            let applied = row.data.get("applied").map(|v| matches!(v, Value::Bool(true))).unwrap_or(false);
            let applied_at = row.data.get("applied_at_millis").and_then(Value::as_i64);
            applied && applied_at.is_some_and(|at| at < cutoff)
        })
        .map(|row| row.id)
        .collect();

    if expired.is_empty() {
        return 0;
    }

    let results = tx_resource.delete_many(&expired).await;
    let deleted = results.iter().filter(|r| r.outcome.is_ok()).count();
    if deleted > 0 {
        metrics.record_gc_deletion(resource_name, field, deleted);
    }
    deleted
}

#[cfg(test)]
mod tests {
    use stratum_core::config::{ClientConfig, ResourceConfig};
    use stratum_core::value::Value;

    use super::*;
    use crate::telemetry::NoopMetrics;

    fn tx_resource() -> Arc<Resource> {
        let schema = super::super::transaction::transaction_schema("accounts", "balance");
        let client = Arc::new(crate::object_store::connect("memory://", ClientConfig::default()).unwrap());
        Arc::new(Resource::new(schema, ResourceConfig::default(), client))
    }

    async fn insert_row(resource: &Resource, applied: bool, applied_at_millis: i64) {
        let mut data = super::super::transaction::new_transaction_data(
            "acct-1",
            "balance",
            super::super::transaction::Operation::Add,
            1.0,
            0,
        );
        data.insert("applied".to_string(), Value::Bool(applied));
        if applied {
            data.insert("applied_at_millis".to_string(), Value::Int(applied_at_millis));
        }
        resource.insert(data).await.unwrap();
    }

    #[tokio::test]
    async fn collect_once_only_deletes_old_applied_rows() {
        let resource = tx_resource();
        let now = now_millis();
        insert_row(&resource, true, now - 10_000).await; // old, applied: collected
        insert_row(&resource, true, now).await; // recent, applied: kept
        insert_row(&resource, false, 0).await; // unapplied: kept regardless of age

        let deleted = collect_once(&resource, 5_000, 100, "accounts", "balance", &NoopMetrics).await;
        assert_eq!(deleted, 1);
        assert_eq!(resource.list(100).await.unwrap().len(), 2);
    }
}
