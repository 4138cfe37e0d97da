//! Repair `TotalTime` values that no longer match their sessions.

use std::sync::Arc;

use playtime_domain::TotalDrift;

use super::TrackError;
use crate::infrastructure::ports::PlaytimeRepo;

pub struct ReconcileTotals {
    repo: Arc<dyn PlaytimeRepo>,
}

impl ReconcileTotals {
    pub fn new(repo: Arc<dyn PlaytimeRepo>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self) -> Result<Vec<TotalDrift>, TrackError> {
        let drifts = self.repo.reconcile_totals().await?;
        for drift in &drifts {
            tracing::warn!(
                player_id = %drift.player_id,
                recorded_total = drift.recorded_total,
                session_sum = drift.session_sum,
                delta = drift.delta(),
                "TotalTime repaired from session history"
            );
        }
        tracing::info!(repaired = drifts.len(), "Reconciliation finished");
        Ok(drifts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockPlaytimeRepo, RepoError};
    use playtime_domain::PlayerId;

    #[tokio::test]
    async fn returns_repaired_drifts() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_reconcile_totals().times(1).returning(|| {
            Ok(vec![TotalDrift::new(PlayerId::new("abc123").unwrap(), 999.0, 125.0).unwrap()])
        });

        let drifts = ReconcileTotals::new(Arc::new(repo))
            .execute()
            .await
            .expect("reconcile");
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].session_sum, 125.0);
    }

    #[tokio::test]
    async fn propagates_gateway_errors() {
        let mut repo = MockPlaytimeRepo::new();
        repo.expect_reconcile_totals()
            .returning(|| Err(RepoError::connection("reconcile_totals", "refused")));

        let err = ReconcileTotals::new(Arc::new(repo))
            .execute()
            .await
            .expect_err("db down");
        assert!(matches!(err, TrackError::Repo(RepoError::ConnectionFailure { .. })));
    }
}
