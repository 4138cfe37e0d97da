//! Role transition entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// A role transition about to be appended to `PlayerRoles`.
///
/// The nickname is carried so the parent `PlayerStats` row can be created
/// when a role change arrives for a player the store has never seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub player_id: PlayerId,
    pub nickname: String,
    pub role_name: String,
    pub changed_at: DateTime<Utc>,
}

/// A persisted row of `PlayerRoles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChangeRecord {
    pub role_id: i64,
    pub player_id: PlayerId,
    pub role_name: String,
    pub changed_at: DateTime<Utc>,
}
