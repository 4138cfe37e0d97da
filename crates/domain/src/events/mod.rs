//! Host Events
//!
//! Notifications delivered by the game-server plugin host. Identities arrive
//! as raw strings: the host does not guarantee they are populated, so
//! validation into [`PlayerId`](crate::PlayerId) happens in the tracker, not
//! at deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A player finished authentication and is now on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerVerified {
    pub identity: String,
    pub nickname: String,
    #[serde(default)]
    pub group_name: Option<String>,
}

/// A player disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub identity: String,
    pub nickname: String,
}

/// A player's in-game role is about to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanging {
    pub identity: String,
    pub nickname: String,
    /// Host role representation, stringified.
    pub new_role: String,
}

impl RoleChanging {
    /// Build a role change from whatever role type the host uses.
    pub fn new(identity: impl Into<String>, nickname: impl Into<String>, role: impl fmt::Display) -> Self {
        Self {
            identity: identity.into(),
            nickname: nickname.into(),
            new_role: role.to_string(),
        }
    }
}

/// Any event the tracker subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    PlayerVerified(PlayerVerified),
    PlayerLeft(PlayerLeft),
    RoleChanging(RoleChanging),
}

impl HostEvent {
    pub fn kind(&self) -> HostEventKind {
        match self {
            Self::PlayerVerified(_) => HostEventKind::PlayerVerified,
            Self::PlayerLeft(_) => HostEventKind::PlayerLeft,
            Self::RoleChanging(_) => HostEventKind::RoleChanging,
        }
    }

    /// Raw identity as sent by the host (may be empty).
    pub fn identity(&self) -> &str {
        match self {
            Self::PlayerVerified(e) => &e.identity,
            Self::PlayerLeft(e) => &e.identity,
            Self::RoleChanging(e) => &e.identity,
        }
    }
}

impl From<PlayerVerified> for HostEvent {
    fn from(e: PlayerVerified) -> Self {
        Self::PlayerVerified(e)
    }
}

impl From<PlayerLeft> for HostEvent {
    fn from(e: PlayerLeft) -> Self {
        Self::PlayerLeft(e)
    }
}

impl From<RoleChanging> for HostEvent {
    fn from(e: RoleChanging) -> Self {
        Self::RoleChanging(e)
    }
}

/// Subscription key on the host event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEventKind {
    PlayerVerified,
    PlayerLeft,
    RoleChanging,
}

impl HostEventKind {
    pub const ALL: [HostEventKind; 3] = [
        HostEventKind::PlayerVerified,
        HostEventKind::PlayerLeft,
        HostEventKind::RoleChanging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerVerified => "player_verified",
            Self::PlayerLeft => "player_left",
            Self::RoleChanging => "role_changing",
        }
    }
}

impl fmt::Display for HostEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_json() {
        let json = r#"{"type":"player_verified","identity":"abc123","nickname":"Nick","group_name":"admin"}"#;
        let event: HostEvent = serde_json::from_str(json).expect("parse");
        assert_eq!(event.kind(), HostEventKind::PlayerVerified);
        assert_eq!(event.identity(), "abc123");
    }

    #[test]
    fn group_name_is_optional() {
        let json = r#"{"type":"player_verified","identity":"abc123","nickname":"Nick"}"#;
        let event: HostEvent = serde_json::from_str(json).expect("parse");
        match event {
            HostEvent::PlayerVerified(e) => assert_eq!(e.group_name, None),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn empty_identity_still_parses() {
        let json = r#"{"type":"player_left","identity":"","nickname":"Nick"}"#;
        let event: HostEvent = serde_json::from_str(json).expect("parse");
        assert_eq!(event.identity(), "");
    }

    #[test]
    fn role_is_stringified() {
        #[derive(Debug)]
        enum Role {
            ClassD,
        }
        impl fmt::Display for Role {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self)
            }
        }

        let change = RoleChanging::new("abc123", "Nick", Role::ClassD);
        assert_eq!(change.new_role, "ClassD");
    }

    #[test]
    fn kind_names_match_json_tags() {
        for kind in HostEventKind::ALL {
            let json = serde_json::to_string(&kind).expect("serialize");
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
