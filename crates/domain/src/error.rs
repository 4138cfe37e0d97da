//! Unified error types for the domain layer
//!
//! Provides a common error type for value-object construction and domain
//! invariants, so adapters never have to pass raw strings around.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Player identity is empty or otherwise unusable as a key
    #[error("Invalid player identity: {0}")]
    InvalidIdentity(String),

    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    /// Creates an invalid identity error.
    ///
    /// Use this when a host-supplied player key cannot be used to correlate
    /// sessions (empty, whitespace-only, too long).
    pub fn invalid_identity(msg: impl Into<String>) -> Self {
        Self::InvalidIdentity(msg.into())
    }

    /// Creates a validation error for business rule violations.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this is an invalid identity error.
    pub fn is_invalid_identity(&self) -> bool {
        matches!(self, Self::InvalidIdentity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identity_error() {
        let err = DomainError::invalid_identity("player identity cannot be empty");
        assert!(err.is_invalid_identity());
        assert_eq!(
            err.to_string(),
            "Invalid player identity: player identity cannot be empty"
        );
    }

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("nickname too long");
        assert!(!err.is_invalid_identity());
        assert_eq!(err.to_string(), "Validation failed: nickname too long");
    }
}
