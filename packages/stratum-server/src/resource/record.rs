//! The stored-record shape: a resource's data plus its timestamps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stratum_core::value::Value;

/// `_created_at` / `_updated_at` / `_deleted_at` are carried inside `data`
/// itself (so they pack and pass through the schema like any other
/// attribute) but are surfaced here as typed fields for convenience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: BTreeMap<String, Value>,
    pub created_at_millis: u64,
    pub updated_at_millis: u64,
    pub deleted_at_millis: Option<u64>,
}

pub const CREATED_AT_FIELD: &str = "_created_at";
pub const UPDATED_AT_FIELD: &str = "_updated_at";
pub const DELETED_AT_FIELD: &str = "_deleted_at";

impl Record {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at_millis.is_some()
    }

    /// Reconstructs timestamp fields from the merged data map, falling back
    /// to `now` for `created_at`/`updated_at` when absent (should only
    /// happen for records written before timestamps were tracked).
    #[must_use]
    pub fn from_data(id: String, data: BTreeMap<String, Value>, now_millis: u64) -> Self {
        let created_at_millis = data
            .get(CREATED_AT_FIELD)
            .and_then(Value::as_i64)
            .map_or(now_millis, |v| v as u64);
        let updated_at_millis = data
            .get(UPDATED_AT_FIELD)
            .and_then(Value::as_i64)
            .map_or(now_millis, |v| v as u64);
        let deleted_at_millis = data.get(DELETED_AT_FIELD).and_then(Value::as_i64).map(|v| v as u64);
        Self {
            id,
            data,
            created_at_millis,
            updated_at_millis,
            deleted_at_millis,
        }
    }
}
