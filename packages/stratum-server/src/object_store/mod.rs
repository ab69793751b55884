//! Object-store client: backend construction plus the retryable primitives
//! the resource runtime and metadata packer build on.

pub mod backend;
pub mod client;

pub use backend::{build, BackendError};
pub use client::{ListPage, ObjectPayload, ObjectStoreClient};

use stratum_core::config::ClientConfig;

/// Builds a ready-to-use [`ObjectStoreClient`] from a connection string and
/// client tuning config in one step.
///
/// # Errors
///
/// Returns [`BackendError`] if the connection string is malformed or the
/// backend cannot be constructed.
pub fn connect(connection_string: &str, config: ClientConfig) -> Result<ObjectStoreClient, BackendError> {
    let (store, root) = backend::build(connection_string)?;
    Ok(ObjectStoreClient::new(store, root, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_builds_memory_client() {
        assert!(connect("memory://", ClientConfig::default()).is_ok());
    }
}
