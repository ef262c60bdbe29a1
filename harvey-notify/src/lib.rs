//! # harvey-notify — notification bus (C5)
//!
//! Single-process publish/subscribe bus that forwards pricing-context
//! cache transitions to per-session subscribers. Subscribers get
//! a bounded queue; a publisher that outruns a subscriber's consumption
//! drops that subscriber after two consecutive buffer overflows,
//! emitting a `lagged` event first so the consumer can tell its stream
//! has a gap rather than silently stalling.
//!
//! Ordering is FIFO per publisher within a session: events for a single
//! canonical URL are published strictly `in-flight -> (ready|error)`,
//! mirroring the cache-entry state machine in `harvey-cache`.

#![deny(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use harvey_types::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Default bounded queue depth per subscriber.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Number of consecutive overflows tolerated before a subscriber is dropped.
const MAX_CONSECUTIVE_OVERFLOWS: u32 = 2;

/// Cache-entry state reflected in a published event, mirroring
/// [`harvey_types::CacheEntry`]'s terminal/in-flight variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformEventState {
    /// A transformation started.
    InFlight,
    /// The transformation succeeded.
    Ready,
    /// The transformation failed.
    Error,
}

/// Payload of a `url_transform` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlTransformEvent {
    /// Pricing-context item id this transition applies to, if known.
    pub id: Option<String>,
    /// Canonical URL the cache entry is keyed on.
    pub canonical_url: String,
    /// New state.
    pub state: TransformEventState,
    /// Resolved YAML, present when `state == Ready`.
    pub yaml: Option<String>,
    /// Failure cause, present when `state == Error`.
    pub error: Option<String>,
}

/// An event delivered to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// A cache state transition.
    UrlTransform(UrlTransformEvent),
    /// The subscriber's queue overflowed; some events between the last
    /// delivered one and this marker were dropped.
    Lagged,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<BusEvent>,
    consecutive_overflows: u32,
}

/// A live subscription. Drop to stop receiving (the bus prunes dead
/// senders lazily on next publish).
pub struct Subscription {
    /// Opaque id, useful for diagnostics/logging.
    pub id: u64,
    /// Receiving half of the subscriber's bounded queue.
    pub rx: mpsc::Receiver<BusEvent>,
}

/// Publish/subscribe bus scoped by [`SessionId`].
pub struct NotifyBus {
    subs: Mutex<HashMap<SessionId, Vec<Subscriber>>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl NotifyBus {
    /// A bus with the default queue depth.
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// A bus with an explicit per-subscriber queue depth (test hook).
    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth,
        }
    }

    /// Subscribe to events for a single session.
    pub async fn subscribe(&self, session: SessionId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subs.lock().await;
        subs.entry(session).or_default().push(Subscriber {
            id,
            tx,
            consecutive_overflows: 0,
        });
        Subscription { id, rx }
    }

    /// Drop a specific subscription early (e.g. on HTTP disconnect or
    /// session GC), rather than waiting for the next failed send.
    pub async fn unsubscribe(&self, session: &SessionId, id: u64) {
        let mut subs = self.subs.lock().await;
        if let Some(list) = subs.get_mut(session) {
            list.retain(|s| s.id != id);
        }
    }

    /// Publish an event to every live subscriber of `session`.
    ///
    /// Non-blocking: a full queue is handled with `try_send`, never
    /// an awaited backpressured send.
    pub async fn publish(&self, session: &SessionId, event: UrlTransformEvent) {
        let mut subs = self.subs.lock().await;
        let Some(list) = subs.get_mut(session) else {
            debug!(%session, "publish with no subscribers");
            return;
        };

        list.retain_mut(|sub| match sub.tx.try_send(BusEvent::UrlTransform(event.clone())) {
            Ok(()) => {
                sub.consecutive_overflows = 0;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.consecutive_overflows += 1;
                warn!(
                    subscriber = sub.id,
                    overflows = sub.consecutive_overflows,
                    "subscriber queue full"
                );
                let _ = sub.tx.try_send(BusEvent::Lagged);
                sub.consecutive_overflows < MAX_CONSECUTIVE_OVERFLOWS
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscribers for a session (test/diagnostic hook).
    pub async fn subscriber_count(&self, session: &SessionId) -> usize {
        self.subs
            .lock()
            .await
            .get(session)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

impl Default for NotifyBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle suitable for cloning into cache/server state.
pub type SharedNotifyBus = Arc<NotifyBus>;

#[cfg(test)]
mod tests {
    use super::*;

    fn event(url: &str, state: TransformEventState) -> UrlTransformEvent {
        UrlTransformEvent {
            id: None,
            canonical_url: url.to_string(),
            state,
            yaml: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn delivers_to_subscriber_of_same_session() {
        let bus = NotifyBus::new();
        let session = SessionId::new("s1");
        let mut sub = bus.subscribe(session.clone()).await;

        bus.publish(&session, event("https://x", TransformEventState::Ready))
            .await;

        let received = sub.rx.recv().await.unwrap();
        assert!(matches!(received, BusEvent::UrlTransform(_)));
    }

    #[tokio::test]
    async fn does_not_cross_session_boundaries() {
        let bus = NotifyBus::new();
        let s1 = SessionId::new("s1");
        let s2 = SessionId::new("s2");
        let mut sub = bus.subscribe(s1.clone()).await;

        bus.publish(&s2, event("https://x", TransformEventState::Ready))
            .await;

        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_gets_lagged_then_is_dropped() {
        let bus = NotifyBus::with_queue_depth(1);
        let session = SessionId::new("s1");
        let sub = bus.subscribe(session.clone()).await;

        // Fill the one slot, then overflow twice.
        bus.publish(&session, event("https://x", TransformEventState::InFlight))
            .await;
        bus.publish(&session, event("https://x", TransformEventState::Ready))
            .await;
        bus.publish(&session, event("https://x", TransformEventState::Ready))
            .await;

        assert_eq!(bus.subscriber_count(&session).await, 0);
        drop(sub);
    }

    #[tokio::test]
    async fn unsubscribe_removes_immediately() {
        let bus = NotifyBus::new();
        let session = SessionId::new("s1");
        let sub = bus.subscribe(session.clone()).await;
        bus.unsubscribe(&session, sub.id).await;
        assert_eq!(bus.subscriber_count(&session).await, 0);
    }
}
