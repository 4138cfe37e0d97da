//! Append a role change. Independent of session state.

use std::sync::Arc;

use playtime_domain::{PlayerId, RoleChange, RoleChanging};

use super::{defer_if_retryable, TrackError};
use crate::infrastructure::ports::{ClockPort, PlaytimeRepo};
use crate::stores::{PendingWrite, PendingWriteQueue};

pub struct RecordRoleChange {
    repo: Arc<dyn PlaytimeRepo>,
    pending: Arc<PendingWriteQueue>,
    clock: Arc<dyn ClockPort>,
}

impl RecordRoleChange {
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

    pub async fn execute(&self, event: &RoleChanging) -> Result<(), TrackError> {
        let player_id = PlayerId::new(event.identity.as_str())?;
        let change = RoleChange {
            player_id,
            nickname: event.nickname.clone(),
            role_name: event.new_role.clone(),
            changed_at: self.clock.now(),
        };

        if let Err(e) = self.repo.record_role_change(&change).await {
            let write = PendingWrite::RoleChange(change.clone());
            if !defer_if_retryable(&self.pending, write, &e, change.changed_at).await {
                tracing::error!(
                    player_id = %change.player_id,
                    role = %change.role_name,
                    changed_at = %change.changed_at,
                    error = %e,
                    "Role change write failed and will not be retried"
                );
            }
            return Err(e.into());
        }

        tracing::debug!(player_id = %change.player_id, role = %change.role_name, "Role change recorded");
        Ok(())
    }
}
