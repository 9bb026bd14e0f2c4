// Copyright 2025 Cowboy AI, LLC.

//! Error types for discovery operations

use thiserror::Error;

/// Errors that can occur in the discovery pipeline
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// Request failed validation before any side effects
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    EntityNotFound {
        /// Type of entity that wasn't found
        entity_type: String,
        /// ID that was searched for
        id: String,
    },

    /// Already exists error
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Attempted target state
        to: String,
    },

    /// Concurrency conflict on a revision-checked write
    #[error("Concurrency conflict: expected revision {expected}, but found {actual}")]
    ConcurrencyConflict {
        /// Expected revision
        expected: u64,
        /// Actual revision
        actual: u64,
    },

    /// URL could not be reduced to a normalized host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Event bus failure
    #[error("Event bus error: {0}")]
    Bus(String),

    /// Search adapter failure surfaced past the adapter layer
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::SerializationError(err.to_string())
    }
}

impl DiscoveryError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DiscoveryError::Validation(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        DiscoveryError::Store(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::EntityNotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, DiscoveryError::Validation(_))
    }

    /// Check if this is a uniqueness/concurrency conflict that callers
    /// resolve by re-reading the existing row
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DiscoveryError::AlreadyExists(_) | DiscoveryError::ConcurrencyConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DiscoveryError::EntityNotFound {
            entity_type: "Candidate".to_string(),
            id: "123".to_string(),
        };
        assert_eq!(err.to_string(), "Entity not found: Candidate with id 123");

        let err = DiscoveryError::Validation("fundingSourceTypes must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: fundingSourceTypes must not be empty"
        );

        let err = DiscoveryError::InvalidStateTransition {
            from: "Approved".to_string(),
            to: "InReview".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Approved to InReview"
        );

        let err = DiscoveryError::ConcurrencyConflict {
            expected: 5,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Concurrency conflict: expected revision 5, but found 3"
        );

        let err = DiscoveryError::InvalidUrl("no host in 'mailto:x@y'".to_string());
        assert_eq!(err.to_string(), "Invalid URL: no host in 'mailto:x@y'");
    }

    #[test]
    fn test_classification_helpers() {
        assert!(DiscoveryError::EntityNotFound {
            entity_type: "Domain".to_string(),
            id: "example.org".to_string(),
        }
        .is_not_found());
        assert!(!DiscoveryError::Validation("x".to_string()).is_not_found());

        assert!(DiscoveryError::Validation("x".to_string()).is_validation_error());
        assert!(!DiscoveryError::Store("x".to_string()).is_validation_error());

        assert!(DiscoveryError::AlreadyExists("example.org".to_string()).is_conflict());
        assert!(DiscoveryError::ConcurrencyConflict {
            expected: 1,
            actual: 2
        }
        .is_conflict());
        assert!(!DiscoveryError::Bus("down".to_string()).is_conflict());
    }

    #[test]
    fn test_serde_json_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let err: DiscoveryError = serde_err.into();
        match err {
            DiscoveryError::SerializationError(msg) => assert!(!msg.is_empty()),
            other => panic!("expected SerializationError, got {other:?}"),
        }
    }

    #[test]
    fn test_errors_clone() {
        let errors: Vec<DiscoveryError> = vec![
            DiscoveryError::Validation("v".to_string()),
            DiscoveryError::AlreadyExists("a".to_string()),
            DiscoveryError::Store("s".to_string()),
            DiscoveryError::Bus("b".to_string()),
            DiscoveryError::InternalError("i".to_string()),
        ];
        for error in errors {
            let cloned = error.clone();
            assert_eq!(error.to_string(), cloned.to_string());
        }
    }
}
