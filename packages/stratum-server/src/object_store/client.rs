//! Thin, retryable object-store client.
//!
//! This is the direct functional descendant of the teacher's `MapDataStore`
//! trait (`add`/`remove`/`load`/`load_all` against a persistence backend):
//! the same "one async trait boundary between the resource runtime and
//! durable storage" shape, generalized from a CRDT blob store to an
//! object-store-backed document store with user-metadata.
//!
//! All primitives retry transient failures with exponential backoff; a
//! semaphore bounds in-flight requests so a burst of resource operations
//! cannot exhaust the backend's connection pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use stratum_core::config::ClientConfig;
use stratum_core::error::StoreError;
use tokio::sync::Semaphore;

/// An object fetched from the store: its user-metadata and body.
#[derive(Debug, Clone)]
pub struct ObjectPayload {
    pub metadata: BTreeMap<String, String>,
    pub body: Bytes,
    pub e_tag: Option<String>,
}

/// One page of a `list` scan.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_continuation_token: Option<String>,
}

pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
    config: ClientConfig,
    in_flight: Arc<Semaphore>,
}

impl ObjectStoreClient {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, root: ObjectPath, config: ClientConfig) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            store,
            root,
            config,
            in_flight,
        }
    }

    fn full_path(&self, key: &str) -> ObjectPath {
        if self.root.as_ref().is_empty() {
            ObjectPath::from(key)
        } else {
            self.root.child(key)
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, object_store::Error>>,
    {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .expect("semaphore is never closed");

        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.max_retries && is_transient(&err) => {
                    attempt += 1;
                    let delay = self.config.retry_base_delay_ms * 2u64.pow(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay, error = %err, "retrying object-store operation");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(object_store::Error::NotFound { path, .. }) => {
                    return Err(StoreError::NotFound {
                        resource: String::new(),
                        id: path,
                    })
                }
                Err(err) if is_transient(&err) => {
                    return Err(StoreError::Transient {
                        retries: attempt,
                        reason: err.to_string(),
                    })
                }
                Err(err) => {
                    return Err(StoreError::Permanent {
                        reason: err.to_string(),
                    })
                }
            }
        }
    }

    /// Writes an object with the given user-metadata and body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] after exhausting retries, or
    /// [`StoreError::Permanent`] for non-retryable failures.
    pub async fn put(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let path = self.full_path(key);
        let attributes = build_attributes(metadata, content_type);
        self.with_retry(|| {
            let payload = PutPayload::from_bytes(body.clone());
            let opts = PutOptions {
                attributes: attributes.clone(),
                ..Default::default()
            };
            let store = self.store.clone();
            let path = path.clone();
            async move { store.put_opts(&path, payload, opts).await.map(|_| ()) }
        })
        .await
    }

    /// Writes an object only if `key` does not already exist, for use as a
    /// distributed-locking primitive. Returns `Ok(false)` (no error) if the
    /// key is already present, so callers treat lock contention as a normal
    /// branch rather than an error path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`]/[`StoreError::Permanent`] on
    /// backend failure unrelated to the key already existing.
    pub async fn put_if_absent(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<bool, StoreError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .expect("semaphore is never closed");
        let path = self.full_path(key);
        let attributes = build_attributes(metadata, None);
        let opts = PutOptions {
            attributes,
            mode: object_store::PutMode::Create,
            ..Default::default()
        };
        match self
            .store
            .put_opts(&path, PutPayload::from_bytes(body), opts)
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(err) if is_transient(&err) => Err(StoreError::Transient {
                retries: 0,
                reason: err.to_string(),
            }),
            Err(err) => Err(StoreError::Permanent {
                reason: err.to_string(),
            }),
        }
    }

    /// Fetches an object's user-metadata and body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    pub async fn get(&self, key: &str) -> Result<ObjectPayload, StoreError> {
        let path = self.full_path(key);
        self.with_retry(|| {
            let store = self.store.clone();
            let path = path.clone();
            async move {
                let result = store.get(&path).await?;
                let e_tag = result.meta.e_tag.clone();
                let attributes = result.attributes.clone();
                let body = result.bytes().await?;
                Ok((attributes, body, e_tag))
            }
        })
        .await
        .map(|(attributes, body, e_tag)| ObjectPayload {
            metadata: attributes_to_metadata(&attributes),
            body,
            e_tag,
        })
    }

    /// Checks existence and returns the current `ETag` without fetching the body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    pub async fn head(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.full_path(key);
        self.with_retry(|| {
            let store = self.store.clone();
            let path = path.clone();
            async move { store.head(&path).await.map(|meta| meta.e_tag) }
        })
        .await
    }

    /// Deletes an object. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`]/[`StoreError::Permanent`] on backend failure.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.full_path(key);
        match self
            .with_retry(|| {
                let store = self.store.clone();
                let path = path.clone();
                async move { store.delete(&path).await }
            })
            .await
        {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Lists keys under a prefix. `object_store`'s list stream already
    /// handles continuation internally; this collects a single bounded page
    /// for callers that want cursor-style pagination at the resource layer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`]/[`StoreError::Permanent`] on backend failure.
    pub async fn list(&self, prefix: &str, limit: usize) -> Result<ListPage, StoreError> {
        use futures_util::StreamExt;

        let prefix_path = self.full_path(prefix);
        let mut stream = self.store.list(Some(&prefix_path));
        let mut keys = Vec::with_capacity(limit);
        while keys.len() < limit {
            match stream.next().await {
                Some(Ok(meta)) => keys.push(meta.location.to_string()),
                Some(Err(err)) if is_transient(&err) => {
                    return Err(StoreError::Transient {
                        retries: 0,
                        reason: err.to_string(),
                    })
                }
                Some(Err(err)) => {
                    return Err(StoreError::Permanent {
                        reason: err.to_string(),
                    })
                }
                None => break,
            }
        }
        Ok(ListPage {
            next_continuation_token: None,
            keys,
        })
    }
}

fn is_transient(err: &object_store::Error) -> bool {
    matches!(
        err,
        object_store::Error::Generic { .. }
            | object_store::Error::NotImplemented
            | object_store::Error::JoinError { .. }
    )
}

fn build_attributes(metadata: &BTreeMap<String, String>, content_type: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
    }
    for (key, value) in metadata {
        attributes.insert(
            Attribute::Metadata(key.to_string().into()),
            value.to_string().into(),
        );
    }
    attributes
}

fn attributes_to_metadata(attributes: &Attributes) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter_map(|(attr, value)| match attr {
            Attribute::Metadata(key) => Some((key.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::backend;

    fn client() -> ObjectStoreClient {
        let (store, root) = backend::build("memory://").unwrap();
        ObjectStoreClient::new(store, root, ClientConfig::default())
    }

    #[tokio::test]
    async fn put_get_roundtrip_preserves_metadata() {
        let client = client();
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), "Alice".to_string());

        client
            .put("users/u1", &metadata, Bytes::from_static(b"{}"), Some("application/json"))
            .await
            .unwrap();

        let fetched = client.get("users/u1").await.unwrap();
        assert_eq!(fetched.metadata.get("name"), Some(&"Alice".to_string()));
        assert_eq!(&fetched.body[..], b"{}");
    }

    #[tokio::test]
    async fn get_missing_key_returns_not_found() {
        let client = client();
        let err = client.get("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_an_error() {
        let client = client();
        assert!(client.delete("missing").await.is_ok());
    }

    #[tokio::test]
    async fn delete_then_get_returns_not_found() {
        let client = client();
        let metadata = BTreeMap::new();
        client
            .put("k", &metadata, Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        client.delete("k").await.unwrap();
        assert!(client.get("k").await.is_err());
    }

    #[tokio::test]
    async fn put_if_absent_rejects_second_writer() {
        let client = client();
        let metadata = BTreeMap::new();
        assert!(client
            .put_if_absent("locks/l1", &metadata, Bytes::from_static(b"a"))
            .await
            .unwrap());
        assert!(!client
            .put_if_absent("locks/l1", &metadata, Bytes::from_static(b"b"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn list_finds_keys_under_prefix() {
        let client = client();
        let metadata = BTreeMap::new();
        for i in 0..3 {
            client
                .put(&format!("users/u{i}"), &metadata, Bytes::from_static(b"{}"), None)
                .await
                .unwrap();
        }
        let page = client.list("users/", 10).await.unwrap();
        assert_eq!(page.keys.len(), 3);
    }
}
