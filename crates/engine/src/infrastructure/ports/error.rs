//! Error types for port operations.

use std::time::Duration;

/// Repository operation errors with context for debugging.
///
/// Every variant names the gateway operation that failed so a log line is
/// enough to reconstruct the lost write by hand.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Database unreachable (connect refused, I/O error, TLS failure).
    #[error("Connection failure in {operation}: {message}")]
    ConnectionFailure {
        operation: &'static str,
        message: String,
    },

    /// The call did not finish within the per-call budget.
    #[error("Timed out in {operation} after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Key, foreign-key or NOT NULL constraint rejected a write.
    #[error("Constraint violation in {operation}: {message}")]
    ConstraintViolation {
        operation: &'static str,
        message: String,
    },

    /// A non-atomic coupled write applied its first half only.
    #[error("Partial write in {operation} for {player_id}: {message}")]
    PartialWrite {
        operation: &'static str,
        player_id: String,
        message: String,
    },

    /// Any other database error - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Connection string could not be understood.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RepoError {
    /// Create a ConnectionFailure error with operation context.
    pub fn connection(operation: &'static str, message: impl ToString) -> Self {
        Self::ConnectionFailure {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Timeout error for an operation that exceeded `timeout`.
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(operation: &'static str, message: impl ToString) -> Self {
        Self::ConstraintViolation {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a PartialWrite error.
    pub fn partial_write(
        operation: &'static str,
        player_id: impl ToString,
        message: impl ToString,
    ) -> Self {
        Self::PartialWrite {
            operation,
            player_id: player_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Configuration error.
    pub fn configuration(message: impl ToString) -> Self {
        Self::Configuration(message.to_string())
    }

    /// Transient failures: the same write may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. } | Self::Timeout { .. })
    }

    /// Failures that point at a bug rather than the environment.
    pub fn is_logic_error(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Short machine-friendly label, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::Timeout { .. } => "timeout",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::PartialWrite { .. } => "partial_write_risk",
            Self::Database { .. } => "database",
            Self::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(RepoError::connection("connect", "refused").is_retryable());
        assert!(RepoError::timeout("connect", Duration::from_secs(5)).is_retryable());
    }

    #[test]
    fn logic_errors_are_not_retryable() {
        let err = RepoError::constraint("record_role_change", "FOREIGN KEY constraint failed");
        assert!(!err.is_retryable());
        assert!(err.is_logic_error());
        assert!(!RepoError::partial_write("record_completed_session", "abc123", "x").is_retryable());
        assert!(!RepoError::database("ensure_schema", "syntax").is_retryable());
    }

    #[test]
    fn messages_carry_operation() {
        let err = RepoError::timeout("upsert_player_meta", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Timed out in upsert_player_meta after 1500ms");

        let err = RepoError::partial_write("record_completed_session", "abc123", "total not added");
        assert!(err.to_string().contains("abc123"));
        assert_eq!(err.kind(), "partial_write_risk");
    }
}
