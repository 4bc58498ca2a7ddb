//! Error taxonomy for the operation boundary.
//!
//! Every failure surfaces a stable kind plus a human-readable message.
//! Nothing is silently swallowed except notification delivery, which is
//! logged by the transport caller and never rolls back the triggering write.

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum GovernError {
    /// Malformed or out-of-range input. Always recoverable by the caller.
    #[error("validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A referenced meeting/minutes/room/archive does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Authenticated, but role or ownership is insufficient.
    #[error("not permitted: {0}")]
    Authorization(String),

    /// State-machine violation: active minutes already exists, voting closed,
    /// duplicate vote, room unavailable, invalid time window.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation invalid for the record's current lifecycle phase.
    #[error("invalid state: {0}")]
    State(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl GovernError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        GovernError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GovernError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable kind for callers that map errors onto a wire
    /// format.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernError::Validation { .. } => "validation",
            GovernError::NotFound { .. } => "not_found",
            GovernError::Authorization(_) => "authorization",
            GovernError::Conflict(_) => "conflict",
            GovernError::State(_) => "state",
            GovernError::Db(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        let e = GovernError::validation("endTime", "must be after startTime");
        assert_eq!(e.kind(), "validation");
        assert!(e.to_string().contains("endTime"));

        let e = GovernError::not_found("meeting", "mtg-1");
        assert_eq!(e.kind(), "not_found");
        assert_eq!(e.to_string(), "meeting not found: mtg-1");
    }
}
