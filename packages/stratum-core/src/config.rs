//! Typed configuration structs, built with defaults overridden by a
//! `STRATUM_`-prefixed environment overlay. No file format is mandated.

use serde::{Deserialize, Serialize};

/// Behavior variants for the metadata packer (governing spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingBehavior {
    /// Forbid overflow; fail if the record does not fit in metadata.
    UserMetadata,
    /// Apply per-attribute max lengths; fail if still over budget.
    EnforceLimits,
    /// Truncate string attributes deterministically until the record fits.
    TruncateData,
    /// Pack the largest attributes into the body until metadata fits. Default.
    #[default]
    BodyOverflow,
    /// Skip the metadata-fit attempt entirely; store the full record in the body.
    BodyOnly,
}

/// Tuning knobs for the object-store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub max_in_flight: usize,
    pub keep_alive_s: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            keep_alive_s: 90,
            max_retries: 5,
            retry_base_delay_ms: 50,
        }
    }
}

/// Per-resource configuration: packing behavior, metadata budget, partition
/// fan-out mode, and id generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub behavior: PackingBehavior,
    /// User-metadata byte ceiling. 2048 is the conservative default used
    /// across S3-compatible providers once reserved system keys are
    /// accounted for.
    pub metadata_budget_bytes: usize,
    pub partition_sync: bool,
    pub partition_lane_count: usize,
    pub paranoid_delete: bool,
    pub id_length: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            behavior: PackingBehavior::default(),
            metadata_budget_bytes: 2048,
            partition_sync: false,
            partition_lane_count: 16,
            paranoid_delete: false,
            id_length: 22,
        }
    }
}

/// Cohort partitioning granularity for the EventualConsistency transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortGranularity {
    Hour,
    Day,
    /// ISO-8601 week numbering.
    Week,
    Month,
}

/// Configuration for the EventualConsistency plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventualConsistencyConfig {
    pub fields: Vec<String>,
    pub cohort_granularity: CohortGranularity,
    /// `true`: consolidate synchronously on every transaction append.
    /// `false`: a background consolidator ticker batches pending transactions.
    pub sync_mode: bool,
    pub consolidation_interval_ms: u64,
    pub consolidation_concurrency: usize,
    pub lock_ttl_ms: u64,
    pub checkpoint_interval_ms: u64,
    pub gc_interval_ms: u64,
    pub gc_retain_applied_ms: u64,
    pub mark_applied_concurrency: usize,
    pub rollup_concurrency: usize,
}

impl Default for EventualConsistencyConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            cohort_granularity: CohortGranularity::Day,
            sync_mode: false,
            consolidation_interval_ms: 5_000,
            consolidation_concurrency: 8,
            lock_ttl_ms: 30_000,
            checkpoint_interval_ms: 60_000,
            gc_interval_ms: 300_000,
            gc_retain_applied_ms: 86_400_000,
            mark_applied_concurrency: 8,
            rollup_concurrency: 4,
        }
    }
}

/// Root configuration: connection string plus client and default resource
/// tuning. Constructed either as a plain struct literal or via
/// [`DatabaseConfig::from_env`], which overlays environment variables
/// prefixed `STRATUM_` onto the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub client: ClientConfig,
    pub default_resource: ResourceConfig,
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            client: ClientConfig::default(),
            default_resource: ResourceConfig::default(),
        }
    }

    /// Builds a [`DatabaseConfig`] from `STRATUM_CONNECTION_STRING` plus
    /// optional `STRATUM_CLIENT_*` / `STRATUM_RESOURCE_*` overrides, falling
    /// back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error if `STRATUM_CONNECTION_STRING` is unset.
    pub fn from_env() -> Result<Self, String> {
        let connection_string = std::env::var("STRATUM_CONNECTION_STRING")
            .map_err(|_| "STRATUM_CONNECTION_STRING is not set".to_string())?;

        let mut config = Self::new(connection_string);

        if let Ok(v) = std::env::var("STRATUM_CLIENT_MAX_IN_FLIGHT") {
            config.client.max_in_flight = v
                .parse()
                .map_err(|_| format!("invalid STRATUM_CLIENT_MAX_IN_FLIGHT: {v}"))?;
        }
        if let Ok(v) = std::env::var("STRATUM_RESOURCE_METADATA_BUDGET_BYTES") {
            config.default_resource.metadata_budget_bytes = v
                .parse()
                .map_err(|_| format!("invalid STRATUM_RESOURCE_METADATA_BUDGET_BYTES: {v}"))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_behavior_is_body_overflow() {
        assert_eq!(PackingBehavior::default(), PackingBehavior::BodyOverflow);
    }

    #[test]
    fn resource_config_defaults() {
        let config = ResourceConfig::default();
        assert_eq!(config.metadata_budget_bytes, 2048);
        assert!(!config.partition_sync);
    }

    #[test]
    fn from_env_requires_connection_string() {
        // SAFETY: tests in this module run serially enough for this simple
        // unset/check pattern; no other test reads this variable.
        unsafe {
            std::env::remove_var("STRATUM_CONNECTION_STRING");
        }
        assert!(DatabaseConfig::from_env().is_err());
    }

    #[test]
    fn from_env_overlays_connection_string() {
        unsafe {
            std::env::set_var("STRATUM_CONNECTION_STRING", "memory://");
        }
        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.connection_string, "memory://");
        unsafe {
            std::env::remove_var("STRATUM_CONNECTION_STRING");
        }
    }
}
