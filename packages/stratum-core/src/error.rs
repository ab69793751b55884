//! The typed error taxonomy shared by every layer of the store.
//!
//! Every failure surfaced to a caller is a [`StoreError`] variant. Each
//! variant carries the structured context a caller or a log line needs; the
//! stable [`ErrorKind`] a variant maps to is what callers should branch on
//! when they want to react to a *class* of failure rather than pattern-match
//! the full enum.

use thiserror::Error;

/// Stable error classes, independent of the exact variant. Mirrors the error
/// table of the governing specification: every `StoreError` belongs to
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    MetadataOverflow,
    Encoding,
    Transient,
    Permanent,
    Consolidation,
    Gc,
    LockHeld,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource {resource:?} record {id:?} not found")]
    NotFound { resource: String, id: String },

    #[error("resource {resource:?} record {id:?} already exists")]
    AlreadyExists { resource: String, id: String },

    #[error("validation failed for resource {resource:?}: {errors:?}")]
    Validation {
        resource: String,
        errors: Vec<FieldError>,
    },

    #[error(
        "metadata overflow for resource {resource:?} record {id:?}: {used} bytes exceeds budget of {budget} bytes"
    )]
    MetadataOverflow {
        resource: String,
        id: String,
        used: usize,
        budget: usize,
    },

    #[error("encoding failed for attribute {attribute:?}: {reason}")]
    Encoding { attribute: String, reason: String },

    #[error("transient failure after {retries} retries: {reason}")]
    Transient { retries: u32, reason: String },

    #[error("permanent failure: {reason}")]
    Permanent { reason: String },

    #[error(
        "consolidation failed for resource {resource:?} record {id:?} field {field:?}: {reason}"
    )]
    Consolidation {
        resource: String,
        id: String,
        field: String,
        reason: String,
    },

    #[error("garbage collection failed for resource {resource:?} record {id:?} field {field:?}: {reason}")]
    Gc {
        resource: String,
        id: String,
        field: String,
        reason: String,
    },

    #[error("lock held on {lock_key:?} by {holder:?} until {expires_at_millis}")]
    LockHeld {
        lock_key: String,
        holder: String,
        expires_at_millis: u64,
    },
}

/// A single field-level validation failure, as part of a [`StoreError::Validation`].
#[derive(Debug, Clone)]
pub struct FieldError {
    pub path: String,
    pub reason: String,
}

impl StoreError {
    /// Returns the stable error class this variant belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::MetadataOverflow { .. } => ErrorKind::MetadataOverflow,
            StoreError::Encoding { .. } => ErrorKind::Encoding,
            StoreError::Transient { .. } => ErrorKind::Transient,
            StoreError::Permanent { .. } => ErrorKind::Permanent,
            StoreError::Consolidation { .. } => ErrorKind::Consolidation,
            StoreError::Gc { .. } => ErrorKind::Gc,
            StoreError::LockHeld { .. } => ErrorKind::LockHeld,
        }
    }

    /// Whether a caller could plausibly retry this operation unchanged and
    /// expect a different outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::LockHeld)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_correctly() {
        let err = StoreError::NotFound {
            resource: "users".into(),
            id: "u1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_is_retryable() {
        let err = StoreError::Transient {
            retries: 3,
            reason: "connection reset".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn lock_held_is_retryable() {
        let err = StoreError::LockHeld {
            lock_key: "users:u1:balance".into(),
            holder: "node-a".into(),
            expires_at_millis: 0,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = StoreError::MetadataOverflow {
            resource: "users".into(),
            id: "u1".into(),
            used: 3000,
            budget: 2048,
        };
        let message = err.to_string();
        assert!(message.contains("3000"));
        assert!(message.contains("2048"));
    }
}
