//! # Event Source
//!
//! Multi-subscriber callback list. Handlers are snapshotted before each
//! raise, so a handler may subscribe or unsubscribe without deadlocking.

use parking_lot::Mutex;
use std::error::Error;
use std::sync::Arc;

/// Error type surfaced by handlers and lifecycle hooks.
pub type HookError = Box<dyn Error + Send + Sync>;

/// Result type for handlers and lifecycle hooks.
pub type HookResult = Result<(), HookError>;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<A> = Arc<dyn Fn(&A) -> HookResult + Send + Sync>;

/// An ordered list of fallible subscribers raised with a shared argument.
///
/// Raising walks a snapshot of the current subscribers, collecting every
/// handler error rather than stopping at the first. Subscriptions made
/// during a raise take effect from the next raise.
pub struct EventSource<A> {
    inner: Mutex<Inner<A>>,
}

struct Inner<A> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<A>)>,
}

impl<A> EventSource<A> {
    /// Creates an event source with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                handlers: Vec::new(),
            }),
        }
    }

    /// Number of current subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Whether there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().handlers.is_empty()
    }

    /// Adds a subscriber and returns its id.
    pub fn subscribe(
        &self,
        handler: impl Fn(&A) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscriber. Returns `false` if the id was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(sid, _)| *sid != id);
        inner.handlers.len() != before
    }

    /// Removes every subscriber.
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }

    /// Invokes all current subscribers with `arg`, gathering the errors.
    ///
    /// Every handler runs even when an earlier one fails.
    pub fn raise(&self, arg: &A) -> Vec<HookError> {
        let snapshot: Vec<Handler<A>> = {
            let inner = self.inner.lock();
            inner.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        let mut errors = Vec::new();
        for handler in snapshot {
            if let Err(err) = handler(arg) {
                errors.push(err);
            }
        }
        errors
    }
}

impl<A> Default for EventSource<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_raise_invokes_all_subscribers_in_order() {
        let source = EventSource::<u32>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3u32 {
            let calls = Arc::clone(&calls);
            source.subscribe(move |arg| {
                calls.lock().push((tag, *arg));
                Ok(())
            });
        }
        let errors = source.raise(&5);
        assert!(errors.is_empty());
        assert_eq!(*calls.lock(), vec![(0, 5), (1, 5), (2, 5)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let source = EventSource::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let id = source.subscribe(move |()| {
            hits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        source.raise(&());
        assert!(source.unsubscribe(id));
        assert!(!source.unsubscribe(id));
        source.raise(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_do_not_stop_later_subscribers() {
        let source = EventSource::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        source.subscribe(|()| Err("boom".into()));
        let hits2 = Arc::clone(&hits);
        source.subscribe(move |()| {
            hits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let errors = source.raise(&());
        assert_eq!(errors.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_during_raise_is_deferred() {
        let source = Arc::new(EventSource::<()>::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let source2 = Arc::clone(&source);
        let hits2 = Arc::clone(&hits);
        source.subscribe(move |()| {
            let hits3 = Arc::clone(&hits2);
            source2.subscribe(move |()| {
                hits3.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        source.raise(&());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        source.raise(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
