//! The top-level runtime handle: one object-store client, a registry of
//! resources, and a registry of plugins.

use std::sync::Arc;

use dashmap::DashMap;
use stratum_core::config::{DatabaseConfig, ResourceConfig};
use stratum_core::error::StoreError;
use stratum_core::schema::Schema;

use crate::object_store::{self, ObjectStoreClient};
use crate::plugin::PluginRegistry;
use crate::resource::Resource;

pub struct Database {
    pub(crate) client: Arc<ObjectStoreClient>,
    resources: DashMap<String, Arc<Resource>>,
    plugins: PluginRegistry,
}

impl Database {
    /// Connects to the backend named by `config.connection_string`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is malformed or the
    /// backend cannot be constructed.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, object_store::BackendError> {
        let client = Arc::new(object_store::connect(&config.connection_string, config.client.clone())?);
        Ok(Self {
            client,
            resources: DashMap::new(),
            plugins: PluginRegistry::new(),
        })
    }

    #[must_use]
    pub fn client(&self) -> Arc<ObjectStoreClient> {
        self.client.clone()
    }

    /// Registers a resource, compiling its schema's cross-checks having
    /// already happened via [`Schema::compile`].
    pub fn register_resource(&self, schema: Schema, config: ResourceConfig) -> Arc<Resource> {
        let resource = Arc::new(Resource::new(schema.clone(), config, self.client.clone()));
        self.resources.insert(schema.resource_name.clone(), resource.clone());
        resource
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(name).map(|entry| entry.clone())
    }

    pub fn register_plugin(&mut self, plugin: Arc<dyn crate::plugin::Plugin>) {
        self.plugins.register(plugin);
    }

    /// Installs, then starts, every registered plugin in registration
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first plugin failure encountered.
    pub async fn start_plugins(&self) -> Result<(), StoreError> {
        self.plugins.install_all(self).await?;
        self.plugins.start_all().await
    }

    /// Stops every registered plugin in reverse registration order.
    pub async fn shutdown(&self, graceful: bool) {
        self.plugins.stop_all(graceful).await;
    }
}
