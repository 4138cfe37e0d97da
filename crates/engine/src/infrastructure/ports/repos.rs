//! Repository port for playtime persistence.

use async_trait::async_trait;
use playtime_domain::{
    CompletedSession, PlayerId, PlayerMeta, PlayerStats, RoleChange, RoleChangeRecord,
    SessionRecord, TotalDrift,
};

use super::error::RepoError;

// =============================================================================
// Playtime Storage
// =============================================================================

/// Durable writes for the tracker.
///
/// Each call owns its own short-lived connection; implementations must not
/// hold a connection between calls. `ensure_schema` has to succeed before any
/// other call is made.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaytimeRepo: Send + Sync {
    /// Create `PlayerStats`, `PlayerSessions` and `PlayerRoles` if absent.
    async fn ensure_schema(&self) -> Result<(), RepoError>;

    /// Insert the player with a zero total, or update nickname and role only.
    async fn upsert_player_meta(&self, meta: &PlayerMeta) -> Result<(), RepoError>;

    /// Add the session to the player's total and append a `PlayerSessions` row.
    ///
    /// `nickname` is only used if the `PlayerStats` row has to be created.
    async fn record_completed_session(
        &self,
        nickname: &str,
        session: &CompletedSession,
    ) -> Result<(), RepoError>;

    /// Append a `PlayerRoles` row, creating the parent player row first if needed.
    async fn record_role_change(&self, change: &RoleChange) -> Result<(), RepoError>;

    // Queries
    async fn get_player_stats(&self, player_id: &PlayerId)
        -> Result<Option<PlayerStats>, RepoError>;
    async fn list_sessions(&self, player_id: &PlayerId) -> Result<Vec<SessionRecord>, RepoError>;
    async fn list_role_changes(
        &self,
        player_id: &PlayerId,
    ) -> Result<Vec<RoleChangeRecord>, RepoError>;

    /// Reset every drifted `TotalTime` to the sum of its sessions.
    ///
    /// Returns the drifts that were repaired.
    async fn reconcile_totals(&self) -> Result<Vec<TotalDrift>, RepoError>;
}
