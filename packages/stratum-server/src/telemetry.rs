//! The metrics surface: counters and gauges for the operations the runtime
//! cares about, decoupled from any particular exporter. [`NoopMetrics`] is
//! the default so the core never depends on a telemetry backend being
//! installed; [`FacadeMetrics`] emits through the `metrics` facade crate,
//! becoming live the moment an embedding application installs a recorder
//! (e.g. `metrics-exporter-prometheus`) and a silent no-op otherwise.

use std::sync::Arc;

pub trait Metrics: Send + Sync {
    fn record_insert(&self, resource: &str);
    fn record_update(&self, resource: &str);
    fn record_delete(&self, resource: &str);
    fn record_consolidation(&self, resource: &str, field: &str);
    fn record_gc_deletion(&self, resource: &str, field: &str, count: usize);
    fn set_pending_transactions(&self, resource: &str, field: &str, count: usize);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_insert(&self, _resource: &str) {}
    fn record_update(&self, _resource: &str) {}
    fn record_delete(&self, _resource: &str) {}
    fn record_consolidation(&self, _resource: &str, _field: &str) {}
    fn record_gc_deletion(&self, _resource: &str, _field: &str, _count: usize) {}
    fn set_pending_transactions(&self, _resource: &str, _field: &str, _count: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetrics;

impl Metrics for FacadeMetrics {
    fn record_insert(&self, resource: &str) {
        metrics::counter!("stratum_inserts_total", "resource" => resource.to_string()).increment(1);
    }

    fn record_update(&self, resource: &str) {
        metrics::counter!("stratum_updates_total", "resource" => resource.to_string()).increment(1);
    }

    fn record_delete(&self, resource: &str) {
        metrics::counter!("stratum_deletes_total", "resource" => resource.to_string()).increment(1);
    }

    fn record_consolidation(&self, resource: &str, field: &str) {
        metrics::counter!(
            "stratum_consolidations_total",
            "resource" => resource.to_string(),
            "field" => field.to_string()
        )
        .increment(1);
    }

    fn record_gc_deletion(&self, resource: &str, field: &str, count: usize) {
        metrics::counter!(
            "stratum_gc_deletions_total",
            "resource" => resource.to_string(),
            "field" => field.to_string()
        )
        .increment(count as u64);
    }

    fn set_pending_transactions(&self, resource: &str, field: &str, count: usize) {
        metrics::gauge!(
            "stratum_pending_transactions",
            "resource" => resource.to_string(),
            "field" => field.to_string()
        )
        .set(count as f64);
    }
}

#[must_use]
pub fn noop() -> Arc<dyn Metrics> {
    Arc::new(NoopMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_never_panics() {
        let m = NoopMetrics;
        m.record_insert("widgets");
        m.record_consolidation("widgets", "balance");
        m.record_gc_deletion("widgets", "balance", 3);
        m.set_pending_transactions("widgets", "balance", 0);
    }

    #[test]
    fn facade_metrics_records_without_an_installed_recorder() {
        // No recorder installed: these are no-ops, but must not panic.
        let m = FacadeMetrics;
        m.record_insert("widgets");
        m.record_update("widgets");
        m.record_delete("widgets");
    }
}
