//! Host event bus.
//!
//! The tracker registers one handler per event kind at enable time and
//! removes them at disable time. `InProcessEventBus` is the bus used by the
//! binary and by tests; a real plugin host would implement [`HostEventBus`]
//! over its own callback mechanism.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use playtime_domain::{HostEvent, HostEventKind};

/// Receives host events for the kinds it was subscribed to.
#[async_trait]
pub trait HostEventHandler: Send + Sync {
    async fn handle(&self, event: HostEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[async_trait]
pub trait HostEventBus: Send + Sync {
    async fn subscribe(
        &self,
        kind: HostEventKind,
        handler: Arc<dyn HostEventHandler>,
    ) -> SubscriptionId;

    /// Returns `false` if the subscription was already gone.
    async fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

type Subscription = (HostEventKind, Arc<dyn HostEventHandler>);

pub struct InProcessEventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Deliver `event` to every handler subscribed to its kind, in
    /// subscription order. Returns how many handlers received it.
    pub async fn publish(&self, event: HostEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn HostEventHandler>> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in &handlers {
            handler.handle(event.clone()).await;
        }
        handlers.len()
    }

    pub async fn subscriber_count(&self, kind: HostEventKind) -> usize {
        self.subscriptions
            .read()
            .await
            .values()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostEventBus for InProcessEventBus {
    async fn subscribe(
        &self,
        kind: HostEventKind,
        handler: Arc<dyn HostEventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().await.insert(id, (kind, handler));
        tracing::debug!(kind = %kind, subscription = id.0, "Host event handler subscribed");
        id
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().await.remove(&id).is_some()
    }
}
