//! Stratum server: a document-store and event-processing runtime layered
//! over an S3-compatible object store.
//!
//! [`Database`] owns one [`object_store::ObjectStoreClient`], a registry of
//! [`resource::Resource`]s (schema-validated CRUD backed by the client and
//! fanned out to [`partition`] indices), and a [`plugin::PluginRegistry`].
//! The [`plugin::eventual_consistency`] plugin layers an append-only
//! transaction log, cohort analytics, distributed locking, checkpoints, and
//! garbage collection on top of declared numeric fields.

pub mod database;
pub mod metadata;
pub mod object_store;
pub mod partition;
pub mod plugin;
pub mod resource;
pub mod telemetry;

pub use database::Database;
pub use object_store::{BackendError, ObjectStoreClient};
pub use plugin::{Plugin, PluginRegistry};
pub use resource::Resource;
pub use telemetry::{Metrics, NoopMetrics};
