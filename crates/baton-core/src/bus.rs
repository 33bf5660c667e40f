use crate::event::Event;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Default number of events retained by the bus's in-memory history.
const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Trait for receiving events published on an [`EventBus`].
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Called once per published event, in publication order.
    async fn on_event(&self, event: &Event);
}

/// Identifier returned by [`EventBus::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

/// Publish/subscribe fan-out of lifecycle events.
///
/// Delivery is at-most-once per emission with no retention beyond a bounded
/// in-memory history. The listener registry may be mutated concurrently with
/// publication: `publish` snapshots the registry before dispatch, so a
/// listener added or removed mid-publication affects only later events.
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
    history: Mutex<VecDeque<Event>>,
    history_capacity: usize,
}

impl EventBus {
    /// Creates a bus with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a bus retaining at most `capacity` events in memory.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            history_capacity: capacity,
        }
    }

    /// Registers a listener. Returns an id for [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().await.push((id, listener));
        id
    }

    /// Registers a channel-backed listener and returns the receiving half.
    ///
    /// This is the lifecycle-event channel of the dual-channel streaming
    /// design: consumers that want events as a stream rather than a callback
    /// read from the returned receiver. Dropping the receiver is harmless;
    /// sends to a closed channel are discarded.
    pub async fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelListener { tx })).await;
        (id, rx)
    }

    /// Removes a listener. Returns whether it was present.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Publishes an event to all current listeners and records it in history.
    pub async fn publish(&self, event: Event) {
        {
            let mut history = self.history.lock();
            if history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Snapshot so subscribe/unsubscribe during dispatch cannot invalidate
        // the iteration.
        let snapshot: Vec<Arc<dyn EventListener>> = {
            let listeners = self.listeners.read().await;
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            listener.on_event(&event).await;
        }
    }

    /// The retained event history, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.history.lock().iter().cloned().collect()
    }

    /// Number of registered listeners.
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl EventListener for ChannelListener {
    async fn on_event(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }
}
