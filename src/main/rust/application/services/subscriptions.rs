use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::entities::SessionId;
use crate::domain::value_objects::{ConnectionHealth, FrameRef, Metrics, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    /// The state machine moved
    Transition,
    /// New metrics or frame within the same state
    Frame,
}

/// What subscribers observe: `(state, metrics, frame)` plus bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub kind: UpdateKind,
    /// Increases by one for every published update
    pub sequence: u64,
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    pub metrics: Arc<Metrics>,
    pub latest_frame: Option<FrameRef>,
    pub health: Option<ConnectionHealth>,
}

impl SessionUpdate {
    pub(crate) fn idle() -> Self {
        Self {
            kind: UpdateKind::Transition,
            sequence: 0,
            session_id: None,
            state: SessionState::Idle,
            metrics: Arc::new(Metrics::empty()),
            latest_frame: None,
            health: None,
        }
    }
}

type TransitionSender = mpsc::UnboundedSender<SessionUpdate>;

/// Fan-out of session updates.
///
/// Transitions are queued per subscriber without bound so none is ever
/// coalesced away. Frame updates only replace the latest snapshot.
pub(crate) struct SubscriberRegistry {
    transitions: Mutex<Vec<(u64, TransitionSender)>>,
    next_id: AtomicU64,
    latest: watch::Sender<SessionUpdate>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        let (latest, _) = watch::channel(SessionUpdate::idle());
        Self {
            transitions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            latest,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionUpdate {
        self.latest.borrow().clone()
    }

    pub(crate) fn publish(&self, update: SessionUpdate) {
        if update.kind == UpdateKind::Transition {
            let mut subscribers = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|(_, tx)| tx.send(update.clone()).is_ok());
        }
        self.latest.send_replace(update);
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        // registering under the lock orders this subscriber against publish()
        let mut subscribers = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        let latest = self.latest.subscribe();
        subscribers.push((id, tx));
        drop(subscribers);

        Subscription {
            id,
            transitions: rx,
            latest,
            registry: Arc::downgrade(self),
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.transitions.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn remove(&self, id: u64) {
        let mut subscribers = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|(sid, _)| *sid != id);
    }
}

/// Stream of session updates for one subscriber.
///
/// Every transition published after subscribing is delivered, in order.
/// Frame updates are coalesced: a slow reader only sees the latest one.
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    id: u64,
    transitions: mpsc::UnboundedReceiver<SessionUpdate>,
    latest: watch::Receiver<SessionUpdate>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    /// Next update; `None` once the manager is gone
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        loop {
            tokio::select! {
                biased;
                update = self.transitions.recv() => return update,
                changed = self.latest.changed() => {
                    if changed.is_err() {
                        return self.transitions.recv().await;
                    }
                    let update = self.latest.borrow_and_update().clone();
                    if update.kind == UpdateKind::Frame {
                        return Some(update);
                    }
                }
            }
        }
    }

    /// Latest published update without waiting
    pub fn latest(&self) -> SessionUpdate {
        self.latest.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Callback subscription; the callback runs on its own task.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn spawn<F>(mut subscription: Subscription, mut callback: F) -> Self
    where
        F: FnMut(SessionUpdate) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                callback(update);
            }
        });
        Self { task }
    }

    /// Stop invoking the callback
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(kind: UpdateKind, sequence: u64, state: SessionState) -> SessionUpdate {
        SessionUpdate {
            kind,
            sequence,
            state,
            ..SessionUpdate::idle()
        }
    }

    #[tokio::test]
    async fn test_transitions_are_never_coalesced() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut subscription = registry.subscribe();

        registry.publish(update(UpdateKind::Transition, 1, SessionState::Validating));
        registry.publish(update(UpdateKind::Transition, 2, SessionState::Connecting));
        registry.publish(update(UpdateKind::Transition, 3, SessionState::Active));

        let mut states = Vec::new();
        for _ in 0..3 {
            states.push(subscription.recv().await.unwrap().state);
        }
        assert_eq!(
            states,
            vec![
                SessionState::Validating,
                SessionState::Connecting,
                SessionState::Active
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_updates_keep_only_latest() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut subscription = registry.subscribe();

        registry.publish(update(UpdateKind::Frame, 1, SessionState::Active));
        registry.publish(update(UpdateKind::Frame, 2, SessionState::Active));

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.kind, UpdateKind::Frame);
        assert_eq!(received.sequence, 2);
    }

    #[tokio::test]
    async fn test_transitions_come_before_frames() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut subscription = registry.subscribe();

        registry.publish(update(UpdateKind::Transition, 1, SessionState::Active));
        registry.publish(update(UpdateKind::Frame, 2, SessionState::Active));

        assert_eq!(subscription.recv().await.unwrap().sequence, 1);
        assert_eq!(subscription.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new());
        let subscription = registry.subscribe();
        let _other = registry.subscribe();
        assert_eq!(registry.subscriber_count(), 2);

        subscription.unsubscribe();
        assert_eq!(registry.subscriber_count(), 1);

        registry.publish(update(UpdateKind::Transition, 1, SessionState::Validating));
        assert_eq!(registry.snapshot().sequence, 1);
    }

    #[tokio::test]
    async fn test_recv_ends_when_registry_is_dropped() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut subscription = registry.subscribe();
        registry.publish(update(UpdateKind::Transition, 1, SessionState::Validating));
        drop(registry);

        assert_eq!(subscription.recv().await.unwrap().sequence, 1);
        assert!(subscription.recv().await.is_none());
    }
}
