//! Error taxonomy shared by every cohort component.
//!
//! Only [`CoreError::Conflict`] and repeated [`CoreError::UnreachableMember`]
//! represent degraded service visible to callers; the remaining variants are
//! ordinary operation failures.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::ids::MetadataCollectionId;

/// What kind of object a conflict was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two members claim the same metadata collection id.
    Registration,
    /// Two incompatible definitions share a TypeDef name.
    TypeDef,
    /// An instance event contradicts the instance's home.
    Instance,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::Registration => "registration",
            ConflictKind::TypeDef => "typedef",
            ConflictKind::Instance => "instance",
        };
        f.write_str(s)
    }
}

/// Errors produced by cohort components.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Incompatible claims from two members. Never resolved silently.
    #[error("{kind} conflict: {reason}")]
    Conflict {
        /// Object the conflict concerns.
        kind: ConflictKind,
        /// Human-readable description of the conflict.
        reason: String,
    },

    /// A versioned update did not apply to the expected prior version.
    #[error("version mismatch for {subject}: expected {expected}, found {actual}")]
    VersionMismatch {
        /// Name or GUID of the object being updated.
        subject: String,
        /// Version the update was bound to.
        expected: u64,
        /// Version actually held.
        actual: u64,
    },

    /// A remote member could not be reached within the call bound.
    #[error("member {member} unreachable: {reason}")]
    UnreachableMember {
        member: MetadataCollectionId,
        reason: String,
    },

    /// Invalid offset or limit on a paged query.
    #[error("invalid paging parameters: offset={offset}, limit={limit}")]
    PagingError { offset: i64, limit: i64 },

    /// An event could not be decoded or failed validation.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// The named object does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A caller supplied an invalid argument.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Durable state could not be read or written.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl CoreError {
    pub fn conflict(kind: ConflictKind, reason: impl Into<String>) -> Self {
        CoreError::Conflict {
            kind,
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedEvent { reason: reason.into() }
    }

    pub fn not_found(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        CoreError::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl fmt::Display) -> Self {
        CoreError::Storage {
            reason: reason.to_string(),
        }
    }

    /// Whether this error signals degraded cohort service to callers.
    pub fn is_degraded_service(&self) -> bool {
        matches!(self, CoreError::Conflict { .. } | CoreError::UnreachableMember { .. })
    }
}

/// Validate paging parameters and convert them to indexes.
///
/// `offset` must be non-negative and `limit` strictly positive and no
/// larger than `max_limit`.
pub fn validate_paging(offset: i64, limit: i64, max_limit: usize) -> Result<(usize, usize), CoreError> {
    if offset < 0 || limit <= 0 || limit as u64 > max_limit as u64 {
        return Err(CoreError::PagingError { offset, limit });
    }
    Ok((offset as usize, limit as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_paging_accepts_bounds() {
        assert_eq!(validate_paging(0, 1, 10).unwrap(), (0, 1));
        assert_eq!(validate_paging(5, 10, 10).unwrap(), (5, 10));
    }

    #[test]
    fn test_validate_paging_rejects_negative_offset_and_bad_limits() {
        assert_eq!(validate_paging(-1, 5, 10), Err(CoreError::PagingError { offset: -1, limit: 5 }));
        assert!(validate_paging(0, 0, 10).is_err());
        assert!(validate_paging(0, -3, 10).is_err());
        assert!(validate_paging(0, 11, 10).is_err());
    }

    #[test]
    fn test_degraded_service_signals() {
        assert!(CoreError::conflict(ConflictKind::TypeDef, "x").is_degraded_service());
        assert!(!CoreError::Cancelled.is_degraded_service());
    }

    #[test]
    fn test_display_mentions_kind() {
        let err = CoreError::conflict(ConflictKind::Registration, "id clash");
        assert_eq!(err.to_string(), "registration conflict: id clash");
    }
}
