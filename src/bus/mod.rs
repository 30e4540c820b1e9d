//! Event dispatch to observers
//!
//! Every event kind has at most one registered observer (last registration
//! wins), invoked synchronously on the notifying task. Events are also fanned
//! out on a tokio::sync::broadcast channel for async consumers that only want
//! to watch.

pub mod events;

pub use events::{EventKind, PlayerEvent};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Observer callback for one event kind
pub type Observer = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

pub struct EventBus {
    observers: RwLock<HashMap<EventKind, Observer>>,
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Create a new event bus with specified broadcast capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            observers: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Register the observer for `kind`, replacing any previous one
    pub fn on<F>(&self, kind: EventKind, observer: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.write_observers().insert(kind, Arc::new(observer));
    }

    /// Deliver to the registered observer (if any), then broadcast.
    ///
    /// The registry lock is released before the observer runs, so an
    /// observer may itself register or remove observers.
    pub fn notify(&self, event: PlayerEvent) {
        let observer = self.read_observers().get(&event.kind()).cloned();
        if let Some(observer) = observer {
            observer(&event);
        }
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    fn read_observers(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EventKind, Observer>> {
        self.observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_observers(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EventKind, Observer>> {
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
