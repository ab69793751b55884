//! Exclusive per-`(resource, id, field)` locks with a TTL, backed by the
//! object store's create-if-absent primitive. A stolen lock (acquired past
//! the holder's TTL by another consolidator) is detected by a fencing-token
//! mismatch at release time; the stale holder's in-flight write is not
//! retroactively undone, but it must not proceed past the mismatch check.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use stratum_core::error::StoreError;

use crate::object_store::ObjectStoreClient;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as u64
}

pub struct LockHandle {
    key: String,
    fencing_token: u64,
}

impl LockHandle {
    #[must_use]
    pub fn fencing_token(&self) -> u64 {
        self.fencing_token
    }
}

pub struct LockManager {
    client: Arc<ObjectStoreClient>,
    ttl_ms: u64,
}

impl LockManager {
    #[must_use]
    pub fn new(client: Arc<ObjectStoreClient>, ttl_ms: u64) -> Self {
        Self { client, ttl_ms }
    }

    #[must_use]
    pub fn lock_key(resource: &str, id: &str, field: &str) -> String {
        format!("locks/{resource}:{id}:{field}")
    }

    /// Attempts to acquire the lock. Returns `Ok(None)` (not an error) if
    /// another consolidator currently holds it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub async fn try_acquire(&self, resource: &str, id: &str, field: &str) -> Result<Option<LockHandle>, StoreError> {
        let key = Self::lock_key(resource, id, field);

        if let Ok(existing) = self.client.get(&key).await {
            let expires_at: u64 = existing
                .metadata
                .get("expires_at_millis")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            if now_millis() < expires_at {
                return Ok(None);
            }
            // Expired: steal by clearing the stale entry before re-creating it.
            self.client.delete(&key).await?;
        }

        let fencing_token = now_millis();
        let owner_token = uuid::Uuid::new_v4();
        let mut metadata = BTreeMap::new();
        metadata.insert("expires_at_millis".to_string(), (now_millis() + self.ttl_ms).to_string());
        metadata.insert("fencing_token".to_string(), fencing_token.to_string());
        metadata.insert("owner_token".to_string(), owner_token.to_string());

        if self.client.put_if_absent(&key, &metadata, Bytes::new()).await? {
            tracing::debug!(%key, %owner_token, "lock acquired");
            Ok(Some(LockHandle { key, fencing_token }))
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn is_expired(&self, acquired_at_millis: u64) -> bool {
        now_millis() >= acquired_at_millis + self.ttl_ms
    }

    /// Releases the lock only if it still matches our fencing token --
    /// otherwise another consolidator has already stolen it and our release
    /// would clobber their lock.
    pub async fn release(&self, handle: LockHandle) {
        if let Ok(current) = self.client.get(&handle.key).await {
            if current.metadata.get("fencing_token").map(String::as_str) == Some(handle.fencing_token.to_string().as_str()) {
                let _ = self.client.delete(&handle.key).await;
            }
        }
    }
}
