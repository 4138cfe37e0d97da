//! Tracking use cases.
//!
//! One use case per host event, plus replay of deferred writes and
//! total reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use playtime_domain::DomainError;

use crate::infrastructure::ports::RepoError;
use crate::stores::{PendingWrite, PendingWriteQueue};

mod flush_pending;
mod reconcile;
mod record_join;
mod record_leave;
mod record_role_change;

pub use flush_pending::{FlushPendingWrites, FlushReport};
pub use reconcile::ReconcileTotals;
pub use record_join::RecordJoin;
pub use record_leave::{LeaveOutcome, RecordLeave};
pub use record_role_change::RecordRoleChange;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(#[from] DomainError),
    #[error("Tracker is not ready: schema has not been initialized")]
    NotReady,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl TrackError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::NotReady => "not_ready",
            Self::Repo(e) => e.kind(),
        }
    }
}

/// Container for tracking use cases.
pub struct TrackingUseCases {
    pub record_join: Arc<RecordJoin>,
    pub record_leave: Arc<RecordLeave>,
    pub record_role_change: Arc<RecordRoleChange>,
    pub flush_pending: Arc<FlushPendingWrites>,
    pub reconcile: Arc<ReconcileTotals>,
}

impl TrackingUseCases {
    pub fn new(
        record_join: Arc<RecordJoin>,
        record_leave: Arc<RecordLeave>,
        record_role_change: Arc<RecordRoleChange>,
        flush_pending: Arc<FlushPendingWrites>,
        reconcile: Arc<ReconcileTotals>,
    ) -> Self {
        Self {
            record_join,
            record_leave,
            record_role_change,
            flush_pending,
            reconcile,
        }
    }
}

/// Queue `write` for replay if `error` is transient. Returns whether it was queued.
pub(crate) async fn defer_if_retryable(
    pending: &PendingWriteQueue,
    write: PendingWrite,
    error: &RepoError,
    failed_at: DateTime<Utc>,
) -> bool {
    if !error.is_retryable() {
        return false;
    }

    let operation = write.operation();
    let player_id = write.player_id().to_string();
    if let Some(evicted) = pending.push(write, failed_at).await {
        tracing::error!(
            player_id = %evicted.write.player_id(),
            operation = evicted.write.operation(),
            attempts = evicted.attempts,
            queued_at = %evicted.queued_at,
            write = ?evicted.write,
            "Pending write queue full; oldest write dropped"
        );
    }
    tracing::warn!(
        player_id = %player_id,
        operation,
        error = %error,
        "Write deferred until the database is reachable"
    );
    true
}
