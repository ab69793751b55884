//! Plugin lifecycle: `install` (one-time setup), `start` (spawn background
//! loops), `stop` (drain and join). The registry installs in registration
//! order and stops in reverse order, mirroring a managed-service registry.

pub mod eventual_consistency;

use std::sync::Arc;

use async_trait::async_trait;
use stratum_core::error::StoreError;

use crate::Database;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup: create internal resources, validate configuration
    /// against the database's registered resources.
    async fn install(&self, db: &Database) -> Result<(), StoreError>;

    /// Spawns background loops. Called once, after every plugin has
    /// installed.
    async fn start(&self) -> Result<(), StoreError>;

    /// Drains and joins background loops. `graceful`: finish the in-flight
    /// batch before returning; non-graceful: cancel immediately.
    async fn stop(&self, graceful: bool) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// # Errors
    ///
    /// Returns the first plugin's install error, in registration order.
    pub async fn install_all(&self, db: &Database) -> Result<(), StoreError> {
        for plugin in &self.plugins {
            tracing::info!(plugin = plugin.name(), "installing plugin");
            plugin.install(db).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first plugin's start error, in registration order.
    pub async fn start_all(&self) -> Result<(), StoreError> {
        for plugin in &self.plugins {
            tracing::info!(plugin = plugin.name(), "starting plugin");
            plugin.start().await?;
        }
        Ok(())
    }

    /// Stops plugins in reverse registration order, logging (not
    /// short-circuiting on) individual stop failures so shutdown always
    /// reaches every plugin.
    pub async fn stop_all(&self, graceful: bool) {
        for plugin in self.plugins.iter().rev() {
            tracing::info!(plugin = plugin.name(), graceful, "stopping plugin");
            if let Err(err) = plugin.stop(graceful).await {
                tracing::warn!(plugin = plugin.name(), error = %err, "plugin stop failed");
            }
        }
    }
}
