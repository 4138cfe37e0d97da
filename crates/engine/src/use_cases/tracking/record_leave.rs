//! Close a session when a player disconnects.

use std::sync::Arc;

use playtime_domain::{CompletedSession, PlayerId, PlayerLeft};

use super::{defer_if_retryable, TrackError};
use crate::infrastructure::ports::{ClockPort, PlaytimeRepo};
use crate::stores::{PendingWrite, PendingWriteQueue, SessionStore};

#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// Session closed and persisted.
    Recorded(CompletedSession),
    /// No open session for this player (duplicate or missed join).
    NoActiveSession,
}

pub struct RecordLeave {
    repo: Arc<dyn PlaytimeRepo>,
    sessions: Arc<SessionStore>,
    pending: Arc<PendingWriteQueue>,
    clock: Arc<dyn ClockPort>,
}

impl RecordLeave {
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

    /// The open session is removed whether or not the write succeeds.
    pub async fn execute(&self, event: &PlayerLeft) -> Result<LeaveOutcome, TrackError> {
        let player_id = PlayerId::new(event.identity.as_str())?;
        let now = self.clock.now();

        let Some(session) = self.sessions.take_leave(&player_id, now) else {
            tracing::info!(player_id = %player_id, "Leave without an open session; nothing recorded");
            return Ok(LeaveOutcome::NoActiveSession);
        };

        if let Err(e) = self
            .repo
            .record_completed_session(&event.nickname, &session)
            .await
        {
            let write = PendingWrite::Session {
                nickname: event.nickname.clone(),
                session: session.clone(),
            };
            if !defer_if_retryable(&self.pending, write, &e, now).await {
                tracing::error!(
                    player_id = %player_id,
                    session_start = %session.started_at(),
                    session_end = %session.ended_at(),
                    seconds = session.seconds(),
                    error = %e,
                    "Session write failed and will not be retried; session lost"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            player_id = %player_id,
            seconds = session.seconds(),
            "Session recorded"
        );
        Ok(LeaveOutcome::Recorded(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::ports::{MockClockPort, MockPlaytimeRepo, RepoError};
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()
    }

    fn left(identity: &str) -> PlayerLeft {
        PlayerLeft {
            identity: identity.into(),
            nickname: "Nick".into(),
        }
    }

    fn pid(raw: &str) -> PlayerId {
        PlayerId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn records_exact_duration() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session()
            .withf(|nickname, session| {
                nickname == "Nick"
                    && session.player_id().as_str() == "abc123"
                    && session.seconds() == 125.0
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let clock = Arc::new(ManualClock::new(start()));
        let sessions = Arc::new(SessionStore::new());
        sessions.record_join(pid("abc123"), start());
        clock.advance_secs(125);

        let use_case = RecordLeave::new(
            Arc::new(repo),
            sessions.clone(),
            Arc::new(PendingWriteQueue::default()),
            clock,
        );

        match use_case.execute(&left("abc123")).await.expect("leave") {
            LeaveOutcome::Recorded(session) => assert_eq!(session.seconds(), 125.0),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test]
    async fn leave_without_join_writes_nothing() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session().times(0);
        let mut clock = MockClockPort::new();
        clock.expect_now().returning(start);

        let use_case = RecordLeave::new(
            Arc::new(repo),
            Arc::new(SessionStore::new()),
            Arc::new(PendingWriteQueue::default()),
            Arc::new(clock),
        );

        assert_eq!(
            use_case.execute(&left("ghost")).await.expect("leave"),
            LeaveOutcome::NoActiveSession
        );
    }

    #[tokio::test]
    async fn empty_identity_is_rejected() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session().times(0);
        let mut clock = MockClockPort::new();
        clock.expect_now().times(0);

        let sessions = Arc::new(SessionStore::new());
        sessions.record_join(pid("abc123"), start());

        let use_case = RecordLeave::new(
            Arc::new(repo),
            sessions.clone(),
            Arc::new(PendingWriteQueue::default()),
            Arc::new(clock),
        );

        let err = use_case.execute(&left("")).await.expect_err("rejected");
        assert!(matches!(err, TrackError::InvalidIdentity(_)));
        assert_eq!(sessions.active_count(), 1);
    }

    #[tokio::test]
    async fn retryable_failure_removes_session_and_defers_write() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session().returning(|_, _| {
            Err(RepoError::timeout(
                "record_completed_session",
                std::time::Duration::from_secs(5),
            ))
        });

        let clock = Arc::new(ManualClock::new(start()));
        let sessions = Arc::new(SessionStore::new());
        let pending = Arc::new(PendingWriteQueue::default());
        sessions.record_join(pid("abc123"), start());
        clock.advance_secs(60);

        let use_case = RecordLeave::new(Arc::new(repo), sessions.clone(), pending.clone(), clock);

        assert!(use_case.execute(&left("abc123")).await.is_err());
        assert!(!sessions.is_active(&pid("abc123")));

        let queued = pending.pop_front().await.expect("queued write");
        match queued.write {
            PendingWrite::Session { nickname, session } => {
                assert_eq!(nickname, "Nick");
                assert_eq!(session.seconds(), 60.0);
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_write_is_not_deferred() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session().returning(|_, _| {
            Err(RepoError::partial_write(
                "record_completed_session",
                "abc123",
                "lost connection",
            ))
        });

        let mut clock = MockClockPort::new();
        clock.expect_now().returning(start);
        let sessions = Arc::new(SessionStore::new());
        let pending = Arc::new(PendingWriteQueue::default());
        sessions.record_join(pid("abc123"), start());

        let use_case =
            RecordLeave::new(Arc::new(repo), sessions.clone(), pending.clone(), Arc::new(clock));

        let err = use_case.execute(&left("abc123")).await.expect_err("partial");
        assert!(matches!(err, TrackError::Repo(RepoError::PartialWrite { .. })));
        assert!(pending.is_empty().await);
        assert_eq!(sessions.active_count(), 0);
    }
}
