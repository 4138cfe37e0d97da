//! Start a session when the host verifies a player.

use std::sync::Arc;

use playtime_domain::{PlayerId, PlayerMeta, PlayerVerified};

use super::{defer_if_retryable, TrackError};
use crate::infrastructure::ports::{ClockPort, PlaytimeRepo};
use crate::stores::{PendingWrite, PendingWriteQueue, SessionStore};

pub struct RecordJoin {
    repo: Arc<dyn PlaytimeRepo>,
    sessions: Arc<SessionStore>,
    pending: Arc<PendingWriteQueue>,
    clock: Arc<dyn ClockPort>,
}

impl RecordJoin {
    pub fn new(
        repo: Arc<dyn PlaytimeRepo>,
        sessions: Arc<SessionStore>,
        pending: Arc<PendingWriteQueue>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            repo,
            sessions,
            pending,
            clock,
        }
    }

    /// Open the session, then upsert nickname and role.
    ///
    /// The session stays open even when the upsert fails.
    pub async fn execute(&self, event: &PlayerVerified) -> Result<(), TrackError> {
        let player_id = PlayerId::new(event.identity.as_str())?;
        let now = self.clock.now();

        if let Some(previous) = self.sessions.record_join(player_id.clone(), now) {
            tracing::warn!(
                player_id = %player_id,
                previous_start = %previous,
                started_at = %now,
                "Player joined with a session already open; earlier start discarded"
            );
        }

        let meta = PlayerMeta::new(player_id, event.nickname.as_str(), event.group_name.as_deref());
        if let Err(e) = self.repo.upsert_player_meta(&meta).await {
            defer_if_retryable(&self.pending, PendingWrite::PlayerMeta(meta), &e, now).await;
            return Err(e.into());
        }

        tracing::debug!(player_id = %meta.player_id, started_at = %now, "Session started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockClockPort, MockPlaytimeRepo, RepoError};
    use chrono::{TimeZone, Utc};

    fn verified(identity: &str, group: Option<&str>) -> PlayerVerified {
        PlayerVerified {
            identity: identity.into(),
            nickname: "Nick".into(),
            group_name: group.map(str::to_string),
        }
    }

    fn fixed_clock() -> MockClockPort {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap();
        let mut clock = MockClockPort::new();
        clock.expect_now().returning(move || now);
        clock
    }

    #[tokio::test]
    async fn opens_session_and_upserts_meta() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .withf(|meta| {
                meta.player_id.as_str() == "abc123"
                    && meta.nickname == "Nick"
                    && meta.admin_role.as_deref() == Some("admin")
            })
            .times(1)
            .returning(|_| Ok(()));

        let sessions = Arc::new(SessionStore::new());
        let use_case = RecordJoin::new(
            Arc::new(repo),
            sessions.clone(),
            Arc::new(PendingWriteQueue::default()),
            Arc::new(fixed_clock()),
        );

        use_case
            .execute(&verified("abc123", Some("admin")))
            .await
            .expect("join");
        assert!(sessions.is_active(&PlayerId::new("abc123").unwrap()));
    }

    #[tokio::test]
    async fn missing_group_stores_null_role() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .withf(|meta| meta.admin_role.is_none())
            .times(1)
            .returning(|_| Ok(()));

        let use_case = RecordJoin::new(
            Arc::new(repo),
            Arc::new(SessionStore::new()),
            Arc::new(PendingWriteQueue::default()),
            Arc::new(fixed_clock()),
        );

        use_case
            .execute(&verified("abc123", Some("")))
            .await
            .expect("join");
    }

    #[tokio::test]
    async fn empty_identity_touches_nothing() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta().times(0);
        let mut clock = MockClockPort::new();
        clock.expect_now().times(0);

        let sessions = Arc::new(SessionStore::new());
        let use_case = RecordJoin::new(
            Arc::new(repo),
            sessions.clone(),
            Arc::new(PendingWriteQueue::default()),
            Arc::new(clock),
        );

        let err = use_case
            .execute(&verified("  ", None))
            .await
            .expect_err("rejected");
        assert!(matches!(err, TrackError::InvalidIdentity(_)));
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test]
    async fn connection_failure_keeps_session_and_defers_meta() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .returning(|_| Err(RepoError::connection("upsert_player_meta", "refused")));

        let sessions = Arc::new(SessionStore::new());
        let pending = Arc::new(PendingWriteQueue::default());
        let use_case = RecordJoin::new(
            Arc::new(repo),
            sessions.clone(),
            pending.clone(),
            Arc::new(fixed_clock()),
        );

        let err = use_case
            .execute(&verified("abc123", None))
            .await
            .expect_err("db down");
        assert!(matches!(err, TrackError::Repo(_)));
        assert!(sessions.is_active(&PlayerId::new("abc123").unwrap()));
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn constraint_failure_is_not_deferred() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .returning(|_| Err(RepoError::constraint("upsert_player_meta", "NOT NULL")));

        let pending = Arc::new(PendingWriteQueue::default());
        let use_case = RecordJoin::new(
            Arc::new(repo),
            Arc::new(SessionStore::new()),
            pending.clone(),
            Arc::new(fixed_clock()),
        );

        assert!(use_case.execute(&verified("abc123", None)).await.is_err());
        assert!(pending.is_empty().await);
    }
}
