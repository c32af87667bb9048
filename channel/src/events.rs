//! Channel Lifecycle Events
//!
//! Explicit observer registration in place of multicast events: subscribers
//! get an id back and are removed by that id. The decorator registers exactly
//! one forwarding observer on its inner channel while open and is guaranteed
//! to deregister it on every close/abort path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Lifecycle transitions a channel reports to its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Closed,
    Faulted,
}

/// Receiver of channel lifecycle events.
pub trait ChannelObserver: Send + Sync {
    fn on_event(&self, event: ChannelEvent);
}

/// Token returned by `subscribe`, used to unsubscribe.
pub type ObserverId = u64;

/// Registry of lifecycle observers for one channel.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<dyn ChannelObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ChannelObserver>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.lock().retain(|(observer_id, _)| *observer_id != id);
    }

    /// Number of live subscriptions. Used by lifecycle-hygiene tests.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Notify every observer. The list is snapshotted first so observers may
    /// subscribe or unsubscribe from inside their callback.
    pub fn notify(&self, event: ChannelEvent) {
        let snapshot: Vec<_> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl ChannelObserver for Counter {
        fn on_event(&self, _event: ChannelEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let registry = ObserverRegistry::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let id = registry.subscribe(counter.clone());
        registry.notify(ChannelEvent::Opened);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        registry.unsubscribe(id);
        registry.notify(ChannelEvent::Closed);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_id_is_noop() {
        let registry = ObserverRegistry::new();
        registry.unsubscribe(42);
        assert_eq!(registry.len(), 0);
    }
}
