//! Backend construction from a parsed connection string.
//!
//! Mirrors the teacher's `RecordStoreFactory` dependency-injection point
//! (one config in, one fully-wired trait object out), except the product
//! here is an [`object_store::ObjectStore`] rather than a `RecordStore`.

use std::sync::Arc;

use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use stratum_core::connection::{self, Backend, ConnectionStringError};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    ConnectionString(#[from] ConnectionStringError),
    #[error("failed to construct object store backend: {0}")]
    Construction(#[from] object_store::Error),
    #[error("file backend root is not a valid path: {root}")]
    InvalidRoot { root: String },
}

/// Resolves a connection string to a boxed [`ObjectStore`] plus the prefix
/// every key should be rooted under (the `s3://.../prefix` or `file:///root`
/// path component).
pub fn build(connection_string: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath), BackendError> {
    let backend = connection::parse(connection_string)?;
    match backend {
        Backend::Memory => Ok((Arc::new(InMemory::new()), ObjectPath::from(""))),
        Backend::File { root } => {
            let fs = LocalFileSystem::new_with_prefix(&root)
                .map_err(|_| BackendError::InvalidRoot { root })?;
            Ok((Arc::new(fs), ObjectPath::from("")))
        }
        Backend::S3 {
            access_key,
            secret_key,
            bucket,
            region,
            endpoint,
            prefix,
        } => {
            let mut builder = object_store::aws::AmazonS3Builder::new().with_bucket_name(bucket);
            if let Some(key) = access_key {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = secret_key {
                builder = builder.with_secret_access_key(secret);
            }
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
            }
            let store = builder.build()?;
            Ok((Arc::new(store), ObjectPath::from(prefix)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_builds() {
        let (_, prefix) = build("memory://").unwrap();
        assert_eq!(prefix, ObjectPath::from(""));
    }

    #[test]
    fn file_backend_builds_with_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let (_, prefix) = build(&url).unwrap();
        assert_eq!(prefix, ObjectPath::from(""));
    }

    #[test]
    fn unsupported_scheme_errors() {
        assert!(build("ftp://host/path").is_err());
    }
}
