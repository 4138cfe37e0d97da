//! Player session entities.
//!
//! A session starts when the host verifies a player and ends when the player
//! leaves. Only completed sessions ever reach the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// A session that has ended and is ready to be persisted.
///
/// Durations are fractional seconds and never negative: a leave timestamp
/// earlier than the join (clock skew) clamps to zero and sets `clamped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    player_id: PlayerId,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    seconds: f64,
    clamped: bool,
}

impl CompletedSession {
    /// Close a session that started at `started_at` and ended at `ended_at`.
    pub fn between(player_id: PlayerId, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let millis = ended_at.signed_duration_since(started_at).num_milliseconds();
        let (seconds, clamped) = if millis < 0 {
            (0.0, true)
        } else {
            (millis as f64 / 1000.0, false)
        };

        Self {
            player_id,
            started_at,
            ended_at,
            seconds,
            clamped,
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Session length in seconds.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// True when the raw duration was negative and had to be clamped to zero.
    pub fn is_clamped(&self) -> bool {
        self.clamped
    }
}

/// A persisted row of `PlayerSessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: i64,
    pub player_id: PlayerId,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub session_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn player() -> PlayerId {
        PlayerId::new("abc123").expect("valid id")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).single().expect("valid time")
    }

    #[test]
    fn duration_is_end_minus_start() {
        let session = CompletedSession::between(player(), t0(), t0() + Duration::seconds(125));
        assert_eq!(session.seconds(), 125.0);
        assert!(!session.is_clamped());
    }

    #[test]
    fn keeps_sub_second_precision() {
        let session =
            CompletedSession::between(player(), t0(), t0() + Duration::milliseconds(1_500));
        assert_eq!(session.seconds(), 1.5);
    }

    #[test]
    fn zero_length_session_is_not_clamped() {
        let session = CompletedSession::between(player(), t0(), t0());
        assert_eq!(session.seconds(), 0.0);
        assert!(!session.is_clamped());
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        let session = CompletedSession::between(player(), t0(), t0() - Duration::seconds(3));
        assert_eq!(session.seconds(), 0.0);
        assert!(session.is_clamped());
        assert_eq!(session.ended_at(), t0() - Duration::seconds(3));
    }
}
