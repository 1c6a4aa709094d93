// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the submodel store.
//!
//! Every failure surfaces as one of four kinds. Low-level store errors are
//! wrapped where they are detected; raw driver text only ever appears inside
//! [`StoreError::Internal`], which callers must treat as opaque.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Submodel or element absent at the given identifier/path.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed path, cursor or request body.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Duplicate identifier or idShortPath.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Infrastructure failure or broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Wrap a low-level failure with the operation it happened in.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Internal(format!("{}: {}", context, err))
    }

    /// Map a write failure: unique violations become `Conflict`, anything
    /// else `Internal`.
    pub fn from_write(context: &str, err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            StoreError::Conflict(format!("{}: identifier or idShortPath already exists", context))
        } else {
            Self::internal(context, err)
        }
    }

    /// Stable label for metrics and status mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::BadRequest(_) => "bad_request",
            StoreError::Conflict(_) => "conflict",
            StoreError::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, StoreError::BadRequest(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::internal("json", err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return true;
            }
            // Older drivers report the extended SQLite codes without a kind.
            matches!(db.code().as_deref(), Some("2067") | Some("1555"))
                || db.message().contains("UNIQUE constraint failed")
                || db.message().contains("Duplicate entry")
        }
        _ => false,
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(StoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(StoreError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(StoreError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(StoreError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn test_internal_carries_context() {
        let err = StoreError::internal("load_subtree", "disk on fire");
        assert_eq!(err, StoreError::Internal("load_subtree: disk on fire".into()));
    }

    #[test]
    fn test_non_database_write_error_is_internal() {
        let err = StoreError::from_write("insert", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[test]
    fn test_json_error_is_internal() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, StoreError::Internal(_)));
    }
}
