//! Subscription queries, subscriber handles, and the warm-restart cache.

use crate::dialect::Message;
use crate::protocol::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Unique id of a subscriber handle
pub type SubscriberId = u64;

/// Capacity of a subscriber's delivery channel. A subscriber that falls
/// this far behind starts losing frames; MAVLink is lossy by design and
/// delivery must never block the router loop.
const DELIVERY_QUEUE_CAP: usize = 1024;

/// Frame filter for a subscription.
///
/// All fields default to wildcard: `None` message type matches every type,
/// a zero id matches every id. `as_frame` selects whole-frame delivery over
/// message-only delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub message_type: Option<String>,
    pub source_system: u8,
    pub source_component: u8,
    pub target_system: u8,
    pub target_component: u8,
    pub as_frame: bool,
}

/// What a subscriber receives, depending on [`Query::as_frame`]
#[derive(Debug, Clone)]
pub enum Delivery {
    Message(Message),
    Frame(Frame),
}

/// Delivery endpoint registered with the router.
///
/// Clones share the same id and channel, so a handle can live both in the
/// router's subscription set and in the [`SubscriptionCache`].
#[derive(Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    deliveries: Sender<Delivery>,
    liveness: Receiver<()>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// True when the receiving side is gone
    pub(crate) fn is_down(&self) -> bool {
        matches!(self.liveness.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Non-blocking delivery; `Err` means the subscriber is gone. A full
    /// queue drops the delivery instead of blocking.
    pub(crate) fn deliver(&self, delivery: Delivery) -> std::result::Result<(), ()> {
        match self.deliveries.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log::warn!("subscriber {} queue full, dropping frame", self.id);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(()),
        }
    }

    /// Block until the subscriber side is dropped. Monitor threads park
    /// here; the liveness channel never carries data, so `recv` returns
    /// only on disconnect.
    pub(crate) fn wait_down(&self) {
        while self.liveness.recv().is_ok() {}
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle").field("id", &self.id).finish()
    }
}

/// Receiving side held by the subscribing component. Dropping it signals
/// liveness loss to the router.
pub struct Subscriber {
    deliveries: Receiver<Delivery>,
    _liveness: Sender<()>,
}

impl Subscriber {
    pub fn try_recv(&self) -> Option<Delivery> {
        self.deliveries.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Delivery> {
        self.deliveries.recv_timeout(timeout).ok()
    }
}

/// Create a connected handle/subscriber pair
pub fn subscriber() -> (SubscriberHandle, Subscriber) {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    let (delivery_tx, delivery_rx) = bounded(DELIVERY_QUEUE_CAP);
    let (liveness_tx, liveness_rx) = bounded(0);
    (
        SubscriberHandle {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            deliveries: delivery_tx,
            liveness: liveness_rx,
        },
        Subscriber {
            deliveries: delivery_rx,
            _liveness: liveness_tx,
        },
    )
}

/// One registered subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub query: Query,
    pub handle: SubscriberHandle,
}

/// Process-wide store of the current subscription list.
///
/// Created outside the router and handed to `Router::start`, so a
/// restarted router finds the previous list and reinstalls it. `set`
/// replaces the contents wholesale. If the cache itself is dropped,
/// subscriptions are lost and subscribers must re-subscribe.
#[derive(Clone, Default)]
pub struct SubscriptionCache {
    inner: Arc<Mutex<Vec<Subscription>>>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored list
    pub fn get(&self) -> Vec<Subscription> {
        self.inner.lock().map(|list| list.clone()).unwrap_or_default()
    }

    /// Replace the stored list
    pub fn set(&self, list: Vec<Subscription>) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner = list;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_tracks_subscriber_drop() {
        let (handle, sub) = subscriber();
        assert!(!handle.is_down());
        drop(sub);
        assert!(handle.is_down());
    }

    #[test]
    fn wait_down_returns_after_drop() {
        let (handle, sub) = subscriber();
        let watcher = std::thread::spawn(move || handle.wait_down());
        drop(sub);
        watcher.join().unwrap();
    }

    #[test]
    fn delivery_reaches_subscriber() {
        let (handle, sub) = subscriber();
        handle
            .deliver(Delivery::Message(Message::unknown(7)))
            .unwrap();
        match sub.try_recv() {
            Some(Delivery::Message(m)) => assert!(m.is_unknown()),
            other => panic!("unexpected delivery: {:?}", other.is_some()),
        }
    }

    #[test]
    fn cache_set_replaces() {
        let cache = SubscriptionCache::new();
        assert!(cache.get().is_empty());
        let (handle, _sub) = subscriber();
        cache.set(vec![Subscription {
            query: Query::default(),
            handle: handle.clone(),
        }]);
        assert_eq!(cache.get().len(), 1);
        cache.set(Vec::new());
        assert!(cache.get().is_empty());
    }

    #[test]
    fn handles_have_unique_ids() {
        let (a, _sa) = subscriber();
        let (b, _sb) = subscriber();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }
}
