//! Replay deferred writes.

use std::sync::Arc;

use crate::infrastructure::ports::{ClockPort, PlaytimeRepo};
use crate::stores::PendingWriteQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub dropped: usize,
    pub remaining: usize,
    /// Another flush was already running; nothing was attempted.
    pub skipped: bool,
}

pub struct FlushPendingWrites {
    repo: Arc<dyn PlaytimeRepo>,
    pending: Arc<PendingWriteQueue>,
    clock: Arc<dyn ClockPort>,
}

impl FlushPendingWrites {
    pub fn new(
        repo: Arc<dyn PlaytimeRepo>,
        pending: Arc<PendingWriteQueue>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            repo,
            pending,
            clock,
        }
    }

    /// Drain in FIFO order, stopping at the first transient failure.
    ///
    /// A transient failure only drops the head once it is older than the
    /// maximum pending age; how often it was replayed does not matter.
    pub async fn execute(&self) -> FlushReport {
        let Some(_flushing) = self.pending.try_begin_flush() else {
            return FlushReport {
                skipped: true,
                ..FlushReport::default()
            };
        };

        let mut report = FlushReport::default();
        while let Some(mut entry) = self.pending.pop_front().await {
            let operation = entry.write.operation();
            let result = entry.write.apply(self.repo.as_ref()).await;
            match result {
                Ok(()) => {
                    report.written += 1;
                    tracing::info!(
                        player_id = %entry.write.player_id(),
                        operation,
                        attempts = entry.attempts + 1,
                        "Deferred write applied"
                    );
                }
                Err(e) if e.is_retryable() => {
                    entry.attempts += 1;
                    if entry.is_expired(self.clock.now()) {
                        report.dropped += 1;
                        tracing::error!(
                            player_id = %entry.write.player_id(),
                            operation,
                            attempts = entry.attempts,
                            queued_at = %entry.queued_at,
                            write = ?entry.write,
                            error = %e,
                            "Deferred write expired before the database came back; data lost"
                        );
                        // The next entry may be younger.
                        continue;
                    }
                    tracing::debug!(operation, attempts = entry.attempts, error = %e, "Database still unavailable");
                    self.pending.requeue_front(entry).await;
                    break;
                }
                Err(e) => {
                    report.dropped += 1;
                    tracing::error!(
                        player_id = %entry.write.player_id(),
                        operation,
                        write = ?entry.write,
                        error = %e,
                        "Deferred write rejected; data lost"
                    );
                }
            }
        }

        report.remaining = self.pending.len().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::{FixedClock, ManualClock};
    use crate::infrastructure::ports::{MockPlaytimeRepo, RepoError};
    use crate::stores::{PendingWrite, MAX_PENDING_AGE_SECS};
    use chrono::{DateTime, TimeZone, Utc};
    use playtime_domain::{CompletedSession, PlayerId, PlayerMeta};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()
    }

    fn meta(raw: &str) -> PendingWrite {
        PendingWrite::PlayerMeta(PlayerMeta::new(PlayerId::new(raw).unwrap(), "Nick", None))
    }

    fn session(raw: &str, seconds: i64) -> PendingWrite {
        PendingWrite::Session {
            nickname: "Nick".into(),
            session: CompletedSession::between(
                PlayerId::new(raw).unwrap(),
                t0(),
                t0() + chrono::Duration::seconds(seconds),
            ),
        }
    }

    fn flush(repo: MockPlaytimeRepo, pending: &Arc<PendingWriteQueue>) -> FlushPendingWrites {
        FlushPendingWrites::new(Arc::new(repo), pending.clone(), Arc::new(FixedClock(t0())))
    }

    #[tokio::test]
    async fn drains_queue_in_order() {
        let mut seq = mockall::Sequence::new();
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_record_completed_session()
            .withf(|_, s| s.seconds() == 30.0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let pending = Arc::new(PendingWriteQueue::default());
        pending.push(meta("a"), t0()).await;
        pending.push(session("a", 30), t0()).await;

        let report = flush(repo, &pending).execute().await;
        assert_eq!(report.written, 2);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn stops_at_first_transient_failure() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .times(1)
            .returning(|_| Err(RepoError::connection("upsert_player_meta", "refused")));

        let pending = Arc::new(PendingWriteQueue::default());
        pending.push(meta("a"), t0()).await;
        pending.push(meta("b"), t0()).await;

        let report = flush(repo, &pending).execute().await;
        assert_eq!(report.written, 0);
        assert_eq!(report.remaining, 2);

        let head = pending.pop_front().await.expect("head");
        assert_eq!(head.write.player_id().as_str(), "a");
        assert_eq!(head.attempts, 2);
    }

    #[tokio::test]
    async fn drops_rejected_writes_and_continues() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .withf(|m| m.player_id.as_str() == "bad")
            .returning(|_| Err(RepoError::constraint("upsert_player_meta", "NOT NULL")));
        repo.expect_upsert_player_meta()
            .withf(|m| m.player_id.as_str() == "good")
            .returning(|_| Ok(()));

        let pending = Arc::new(PendingWriteQueue::default());
        pending.push(meta("bad"), t0()).await;
        pending.push(meta("good"), t0()).await;

        let report = flush(repo, &pending).execute().await;
        assert_eq!(report.dropped, 1);
        assert_eq!(report.written, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn repeated_failed_replays_keep_the_write() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_record_completed_session()
            .times(20)
            .returning(|_, _| Err(RepoError::connection("record_completed_session", "refused")));

        let pending = Arc::new(PendingWriteQueue::default());
        pending.push(session("a", 600), t0()).await;
        let use_case = flush(repo, &pending);

        for _ in 0..20 {
            let report = use_case.execute().await;
            assert_eq!(report.dropped, 0);
            assert_eq!(report.remaining, 1);
        }
        assert_eq!(pending.pop_front().await.expect("head").attempts, 21);
    }

    #[tokio::test]
    async fn drops_writes_older_than_max_age() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_upsert_player_meta()
            .withf(|m| m.player_id.as_str() == "old")
            .times(1)
            .returning(|_| Err(RepoError::connection("upsert_player_meta", "refused")));
        repo.expect_upsert_player_meta()
            .withf(|m| m.player_id.as_str() == "young")
            .times(1)
            .returning(|_| Err(RepoError::connection("upsert_player_meta", "refused")));

        let clock = Arc::new(ManualClock::new(t0()));
        let pending = Arc::new(PendingWriteQueue::default());
        pending.push(meta("old"), t0()).await;
        pending
            .push(meta("young"), t0() + chrono::Duration::seconds(60))
            .await;
        clock.advance_secs(MAX_PENDING_AGE_SECS);

        let report = FlushPendingWrites::new(Arc::new(repo), pending.clone(), clock)
            .execute()
            .await;
        assert_eq!(report.dropped, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(
            pending.pop_front().await.expect("head").write.player_id().as_str(),
            "young"
        );
    }

    #[tokio::test]
    async fn concurrent_flush_is_skipped() {
        let pending = Arc::new(PendingWriteQueue::default());
        let use_case = flush(MockPlaytimeRepo::new(), &pending);

        let _guard = pending.try_begin_flush().expect("claim");
        assert!(use_case.execute().await.skipped);
    }
}
