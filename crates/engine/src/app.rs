//! Tracker composition and lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use playtime_domain::{HostEvent, HostEventKind, PlayerId, TotalDrift};

use crate::infrastructure::host_bus::{HostEventBus, HostEventHandler, SubscriptionId};
use crate::infrastructure::ports::{ClockPort, PlaytimeRepo, RepoError};
use crate::stores::{PendingWriteQueue, SessionStore};
use crate::use_cases::tracking::{
    FlushPendingWrites, FlushReport, ReconcileTotals, RecordJoin, RecordLeave, RecordRoleChange,
};
use crate::use_cases::{InitializeSchema, RetryConfig, TrackError, TrackingUseCases};

/// The playtime tracker.
///
/// Events are only accepted after `enable` has initialized the schema.
/// Handlers never propagate failures into the host: every error is logged
/// with the player, the operation and the time of the event.
pub struct PlaytimeTracker {
    enabled: bool,
    clock: Arc<dyn ClockPort>,
    sessions: Arc<SessionStore>,
    pending: Arc<PendingWriteQueue>,
    schema: InitializeSchema,
    pub use_cases: TrackingUseCases,
    ready: AtomicBool,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl PlaytimeTracker {
    pub fn new(
        repo: Arc<dyn PlaytimeRepo>,
        clock: Arc<dyn ClockPort>,
        enabled: bool,
        retry: RetryConfig,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionStore::new());
        let pending = Arc::new(PendingWriteQueue::default());

        let use_cases = TrackingUseCases::new(
            Arc::new(RecordJoin::new(
                repo.clone(),
                sessions.clone(),
                pending.clone(),
                clock.clone(),
            )),
            Arc::new(RecordLeave::new(
                repo.clone(),
                sessions.clone(),
                pending.clone(),
                clock.clone(),
            )),
            Arc::new(RecordRoleChange::new(
                repo.clone(),
                pending.clone(),
                clock.clone(),
            )),
            Arc::new(FlushPendingWrites::new(
                repo.clone(),
                pending.clone(),
                clock.clone(),
            )),
            Arc::new(ReconcileTotals::new(repo.clone())),
        );

        Arc::new(Self {
            enabled,
            clock,
            sessions,
            pending,
            schema: InitializeSchema::new(repo, retry),
            use_cases,
            ready: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Initialize the schema, then subscribe to the three host events.
    ///
    /// A disabled tracker logs and returns `Ok` without subscribing. If the
    /// schema cannot be created the tracker stays not-ready and nothing is
    /// subscribed.
    pub async fn enable(self: &Arc<Self>, bus: &dyn HostEventBus) -> Result<(), RepoError> {
        if !self.enabled {
            tracing::info!("Playtime tracking disabled by configuration");
            return Ok(());
        }

        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.is_empty() {
            return Ok(());
        }

        self.schema.execute().await?;
        self.ready.store(true, Ordering::Release);

        for kind in HostEventKind::ALL {
            let handler: Arc<dyn HostEventHandler> = self.clone();
            subscriptions.push(bus.subscribe(kind, handler).await);
        }
        tracing::info!("Playtime tracking enabled");
        Ok(())
    }

    /// Unsubscribe and abandon open sessions. Returns how many were abandoned.
    pub async fn disable(&self, bus: &dyn HostEventBus) -> usize {
        let mut subscriptions = self.subscriptions.lock().await;
        for id in subscriptions.drain(..) {
            bus.unsubscribe(id).await;
        }
        self.ready.store(false, Ordering::Release);

        let abandoned = self.sessions.abandon_all();
        let pending = self.pending.len().await;
        if abandoned > 0 || pending > 0 {
            tracing::warn!(
                abandoned_sessions = abandoned,
                pending_writes = pending,
                "Tracker disabled with unfinished work"
            );
        }
        tracing::info!("Playtime tracking disabled");
        abandoned
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Route one host event to its use case, replaying deferred writes first.
    ///
    /// An event with an invalid identity is rejected before anything touches
    /// the database.
    pub async fn dispatch(&self, event: HostEvent) -> Result<(), TrackError> {
        if !self.is_ready() {
            return Err(TrackError::NotReady);
        }
        PlayerId::new(event.identity())?;

        if !self.pending.is_empty().await {
            self.use_cases.flush_pending.execute().await;
        }

        match event {
            HostEvent::PlayerVerified(e) => self.use_cases.record_join.execute(&e).await,
            HostEvent::PlayerLeft(e) => self.use_cases.record_leave.execute(&e).await.map(|_| ()),
            HostEvent::RoleChanging(e) => self.use_cases.record_role_change.execute(&e).await,
        }
    }

    pub async fn flush_pending(&self) -> FlushReport {
        self.use_cases.flush_pending.execute().await
    }

    pub async fn reconcile(&self) -> Result<Vec<TotalDrift>, TrackError> {
        if !self.is_ready() {
            return Err(TrackError::NotReady);
        }
        self.use_cases.reconcile.execute().await
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    pub async fn pending_writes(&self) -> usize {
        self.pending.len().await
    }
}

#[async_trait]
impl HostEventHandler for PlaytimeTracker {
    async fn handle(&self, event: HostEvent) {
        let operation = event.kind();
        let identity = event.identity().to_string();
        let at = self.clock.now();

        let Err(e) = self.dispatch(event).await else {
            return;
        };
        let kind = e.kind();
        match &e {
            TrackError::InvalidIdentity(_) | TrackError::NotReady => tracing::warn!(
                player_id = %identity,
                operation = %operation,
                at = %at,
                kind,
                error = %e,
                "Host event rejected"
            ),
            TrackError::Repo(repo) if repo.is_retryable() => tracing::warn!(
                player_id = %identity,
                operation = %operation,
                at = %at,
                kind,
                error = %e,
                "Database unavailable; write deferred"
            ),
            TrackError::Repo(RepoError::PartialWrite { .. }) => tracing::error!(
                player_id = %identity,
                operation = %operation,
                at = %at,
                kind,
                error = %e,
                "Session row written but total not updated; run reconcile"
            ),
            TrackError::Repo(repo) if repo.is_logic_error() => tracing::error!(
                player_id = %identity,
                operation = %operation,
                at = %at,
                kind,
                error = %e,
                "Database rejected the write as invalid; data lost, check the schema"
            ),
            TrackError::Repo(_) => tracing::error!(
                player_id = %identity,
                operation = %operation,
                at = %at,
                kind,
                error = %e,
                "Failed to record host event"
            ),
        }
    }
}
