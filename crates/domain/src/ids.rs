//! Player identity newtype.
//!
//! The host hands us a string key per player (e.g. `76561198000000000@steam`).
//! It is the only thing sessions are correlated on, so it is validated once at
//! the edge and carried as a `PlayerId` from then on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum identity length; matches the `VARCHAR(255)` key column.
const MAX_PLAYER_ID_LENGTH: usize = 255;

/// A validated player identity (non-empty, not whitespace-only, <=255 bytes).
///
/// The value is kept verbatim: surrounding whitespace is part of the key the
/// host chose, so it is not trimmed away.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    /// Create a new validated player identity.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidIdentity` if:
    /// - The identity is empty or whitespace-only
    /// - The identity exceeds 255 bytes
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::invalid_identity(
                "player identity cannot be empty",
            ));
        }
        if id.len() > MAX_PLAYER_ID_LENGTH {
            return Err(DomainError::invalid_identity(format!(
                "player identity cannot exceed {} bytes",
                MAX_PLAYER_ID_LENGTH
            )));
        }
        Ok(Self(id))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PlayerId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for PlayerId {
    type Error = DomainError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> String {
        id.0
    }
}

impl AsRef<str> for PlayerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_regular_identity() {
        let id = PlayerId::new("76561198000000000@steam").expect("valid id");
        assert_eq!(id.as_str(), "76561198000000000@steam");
        assert_eq!(id.to_string(), "76561198000000000@steam");
    }

    #[test]
    fn rejects_empty_identity() {
        let err = PlayerId::new("").unwrap_err();
        assert!(err.is_invalid_identity());
    }

    #[test]
    fn rejects_whitespace_only_identity() {
        assert!(PlayerId::new("   \t").is_err());
    }

    #[test]
    fn keeps_identity_verbatim() {
        let id = PlayerId::new(" abc123 ").expect("valid id");
        assert_eq!(id.as_str(), " abc123 ");
    }

    #[test]
    fn rejects_overlong_identity() {
        let long = "x".repeat(MAX_PLAYER_ID_LENGTH + 1);
        assert!(PlayerId::new(long).is_err());
        assert!(PlayerId::new("x".repeat(MAX_PLAYER_ID_LENGTH)).is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<PlayerId, _> = serde_json::from_str("\"abc123\"");
        assert!(ok.is_ok());

        let empty: Result<PlayerId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }
}
