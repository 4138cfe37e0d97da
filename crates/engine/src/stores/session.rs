//! Active session storage.
//!
//! Maps a player identity to the moment the host verified them. Entries are
//! never persisted: a restart abandons every open session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use playtime_domain::{CompletedSession, PlayerId};

/// Concurrent identity → start-time map.
pub struct SessionStore {
    active: DashMap<PlayerId, DateTime<Utc>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Start (or restart) a session. Last join wins.
    ///
    /// Returns the start time that was discarded, if the player already had an
    /// open session (a leave event was missed).
    pub fn record_join(&self, player_id: PlayerId, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.active.insert(player_id, at)
    }

    /// Close the player's session, if one is open.
    pub fn take_leave(&self, player_id: &PlayerId, at: DateTime<Utc>) -> Option<CompletedSession> {
        let (player_id, started_at) = self.active.remove(player_id)?;
        let session = CompletedSession::between(player_id, started_at, at);
        if session.is_clamped() {
            tracing::warn!(
                player_id = %session.player_id(),
                started_at = %started_at,
                ended_at = %at,
                "Leave precedes join; session duration clamped to zero"
            );
        }
        Some(session)
    }

    /// Drop every open session. Returns how many were abandoned.
    pub fn abandon_all(&self) -> usize {
        let count = self.active.len();
        self.active.clear();
        count
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, player_id: &PlayerId) -> bool {
        self.active.contains_key(player_id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
