//! Resource lifecycle hooks: `beforeInsert`/`afterInsert`/`beforeUpdate`/
//! `afterUpdate`/`beforeDelete`/`afterDelete`, run in registration order.
//!
//! Grounded on the teacher's composite-observer pattern: a registry holding
//! an ordered list of observers, each notified in turn, with before-hooks
//! able to reject the operation and after-hooks only observing it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use stratum_core::error::StoreError;
use stratum_core::value::Value;

use super::record::Record;

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_insert(&self, _data: &mut BTreeMap<String, Value>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn after_insert(&self, _record: &Record) {}

    async fn before_update(
        &self,
        _id: &str,
        _prior: &Record,
        _patch: &mut BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn after_update(&self, _prior: &Record, _updated: &Record) {}

    async fn before_delete(&self, _record: &Record) -> Result<(), StoreError> {
        Ok(())
    }

    async fn after_delete(&self, _id: &str) {}
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub async fn run_before_insert(&self, data: &mut BTreeMap<String, Value>) -> Result<(), StoreError> {
        for hook in &self.hooks {
            hook.before_insert(data).await?;
        }
        Ok(())
    }

    pub async fn run_after_insert(&self, record: &Record) {
        for hook in &self.hooks {
            hook.after_insert(record).await;
        }
    }

    pub async fn run_before_update(
        &self,
        id: &str,
        prior: &Record,
        patch: &mut BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        for hook in &self.hooks {
            hook.before_update(id, prior, patch).await?;
        }
        Ok(())
    }

    pub async fn run_after_update(&self, prior: &Record, updated: &Record) {
        for hook in &self.hooks {
            hook.after_update(prior, updated).await;
        }
    }

    pub async fn run_before_delete(&self, record: &Record) -> Result<(), StoreError> {
        for hook in &self.hooks {
            hook.before_delete(record).await?;
        }
        Ok(())
    }

    pub async fn run_after_delete(&self, id: &str) {
        for hook in &self.hooks {
            hook.after_delete(id).await;
        }
    }
}
