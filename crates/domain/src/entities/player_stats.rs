//! Per-player aggregate row and the metadata that feeds it.

use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// Nickname and admin group reported by the host when a player is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMeta {
    pub player_id: PlayerId,
    pub nickname: String,
    /// Server group name; `None` for players without one.
    pub admin_role: Option<String>,
}

impl PlayerMeta {
    /// Build metadata from host values. A blank group name means "no group".
    pub fn new(player_id: PlayerId, nickname: impl Into<String>, group_name: Option<&str>) -> Self {
        let admin_role = group_name
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Self {
            player_id,
            nickname: nickname.into(),
            admin_role,
        }
    }
}

/// A persisted row of `PlayerStats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub nickname: String,
    pub total_time_seconds: f64,
    pub admin_role: Option<String>,
}

/// Mismatch between a player's running total and their session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalDrift {
    pub player_id: PlayerId,
    /// `PlayerStats.TotalTime` before repair
    pub recorded_total: f64,
    /// Sum of `PlayerSessions.SessionTime`
    pub session_sum: f64,
}

impl TotalDrift {
    /// Drift below this is float accumulation noise, not a lost write.
    pub const TOLERANCE_SECONDS: f64 = 1e-6;

    pub fn new(player_id: PlayerId, recorded_total: f64, session_sum: f64) -> Option<Self> {
        if (recorded_total - session_sum).abs() <= Self::TOLERANCE_SECONDS {
            return None;
        }
        Some(Self {
            player_id,
            recorded_total,
            session_sum,
        })
    }

    /// Positive when the total is ahead of the sessions.
    pub fn delta(&self) -> f64 {
        self.recorded_total - self.session_sum
    }
}
