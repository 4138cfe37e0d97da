//! Deferred writes awaiting a database that was unreachable.
//!
//! Only writes that failed with a retryable error land here. An entry is
//! given up on when the queue is full (oldest first) or when it has waited
//! longer than [`MAX_PENDING_AGE_SECS`]. Failed replays alone never drop it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use playtime_domain::{CompletedSession, PlayerId, PlayerMeta, RoleChange};

use crate::infrastructure::ports::{PlaytimeRepo, RepoError};

pub const DEFAULT_PENDING_CAPACITY: usize = 1024;

/// How long an entry may wait for the database before it is dropped.
pub const MAX_PENDING_AGE_SECS: i64 = 6 * 60 * 60;

/// A gateway write that can be replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    PlayerMeta(PlayerMeta),
    Session {
        nickname: String,
        session: CompletedSession,
    },
    RoleChange(RoleChange),
}

impl PendingWrite {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::PlayerMeta(_) => "upsert_player_meta",
            Self::Session { .. } => "record_completed_session",
            Self::RoleChange(_) => "record_role_change",
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        match self {
            Self::PlayerMeta(meta) => &meta.player_id,
            Self::Session { session, .. } => session.player_id(),
            Self::RoleChange(change) => &change.player_id,
        }
    }

    pub async fn apply(&self, repo: &dyn PlaytimeRepo) -> Result<(), RepoError> {
        match self {
            Self::PlayerMeta(meta) => repo.upsert_player_meta(meta).await,
            Self::Session { nickname, session } => {
                repo.record_completed_session(nickname, session).await
            }
            Self::RoleChange(change) => repo.record_role_change(change).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedWrite {
    pub write: PendingWrite,
    /// Attempts made so far, including the one that first failed.
    pub attempts: u32,
    /// When the original write failed.
    pub queued_at: DateTime<Utc>,
}

impl QueuedWrite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.queued_at >= chrono::Duration::seconds(MAX_PENDING_AGE_SECS)
    }
}

pub struct PendingWriteQueue {
    entries: Mutex<VecDeque<QueuedWrite>>,
    flushing: Mutex<()>,
    capacity: usize,
}

impl PendingWriteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            flushing: Mutex::new(()),
            capacity: capacity.max(1),
        }
    }

    /// Queue a write that just failed once at `queued_at`.
    ///
    /// Returns the evicted entry when the queue was full.
    pub async fn push(
        &self,
        write: PendingWrite,
        queued_at: DateTime<Utc>,
    ) -> Option<QueuedWrite> {
        let mut entries = self.entries.lock().await;
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(QueuedWrite {
            write,
            attempts: 1,
            queued_at,
        });
        evicted
    }

    pub async fn pop_front(&self) -> Option<QueuedWrite> {
        self.entries.lock().await.pop_front()
    }

    /// Put an entry back at the head after a failed replay.
    pub async fn requeue_front(&self, entry: QueuedWrite) {
        self.entries.lock().await.push_front(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Claim the right to flush. `None` while another flush is running.
    pub fn try_begin_flush(&self) -> Option<MutexGuard<'_, ()>> {
        self.flushing.try_lock().ok()
    }
}

impl Default for PendingWriteQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0)
            .single()
            .expect("valid time")
    }

    fn meta(raw: &str) -> PendingWrite {
        PendingWrite::PlayerMeta(PlayerMeta::new(
            PlayerId::new(raw).expect("valid id"),
            "Nick",
            None,
        ))
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let queue = PendingWriteQueue::new(8);
        queue.push(meta("a"), t0()).await;
        queue.push(meta("b"), t0()).await;

        let first = queue.pop_front().await.expect("first");
        assert_eq!(first.write.player_id().as_str(), "a");
        assert_eq!(first.attempts, 1);

        queue.requeue_front(first).await;
        assert_eq!(
            queue.pop_front().await.expect("head").write.player_id().as_str(),
            "a"
        );
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let queue = PendingWriteQueue::new(2);
        assert!(queue.push(meta("a"), t0()).await.is_none());
        assert!(queue.push(meta("b"), t0()).await.is_none());

        let evicted = queue.push(meta("c"), t0()).await.expect("evicted");
        assert_eq!(evicted.write.player_id().as_str(), "a");
        assert_eq!(queue.len().await, 2);
    }

    #[test]
    fn entries_expire_after_max_age() {
        let entry = QueuedWrite {
            write: meta("a"),
            attempts: 40,
            queued_at: t0(),
        };
        let deadline = t0() + chrono::Duration::seconds(MAX_PENDING_AGE_SECS);

        assert!(!entry.is_expired(deadline - chrono::Duration::seconds(1)));
        assert!(entry.is_expired(deadline));
    }

    #[tokio::test]
    async fn flush_is_single_flight() {
        let queue = PendingWriteQueue::default();
        let guard = queue.try_begin_flush().expect("first flush");
        assert!(queue.try_begin_flush().is_none());
        drop(guard);
        assert!(queue.try_begin_flush().is_some());
    }

    #[test]
    fn operations_name_gateway_calls() {
        let id = PlayerId::new("abc").expect("valid id");
        let at = Utc.timestamp_opt(0, 0).single().expect("valid time");
        let session = PendingWrite::Session {
            nickname: "Nick".into(),
            session: CompletedSession::between(id.clone(), at, at),
        };
        let role = PendingWrite::RoleChange(RoleChange {
            player_id: id,
            nickname: "Nick".into(),
            role_name: "Scientist".into(),
            changed_at: at,
        });

        assert_eq!(meta("abc").operation(), "upsert_player_meta");
        assert_eq!(session.operation(), "record_completed_session");
        assert_eq!(role.operation(), "record_role_change");
    }
}
