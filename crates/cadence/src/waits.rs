//! # Wait Pool
//!
//! One pooled slot per outstanding timing-point wait. Slots are recycled
//! through a generational [`SlotPool`], so a resolution carrying a stale
//! handle (the wait was dropped or already resolved and the slot reused)
//! lands on nothing.

use std::task::Waker;

use parking_lot::Mutex;
use tracing::trace;

use cadence_core::{SlotId, SlotPool};

/// A slot while checked out to one in-flight wait.
struct WaitSlot {
    waker: Option<Waker>,
    resolved: bool,
}

/// Pool of pending timing-point waits.
///
/// In the steady state a coroutine suspending once per frame reuses the
/// same slot every frame; nothing is allocated per suspension.
pub(crate) struct WaitPool {
    slots: Mutex<SlotPool<WaitSlot>>,
}

impl WaitPool {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(SlotPool::with_capacity(capacity)),
        }
    }

    /// Checks a slot out for a new wait.
    pub(crate) fn register(&self) -> SlotId {
        self.slots.lock().insert(WaitSlot {
            waker: None,
            resolved: false,
        })
    }

    /// Records the waker to notify on resolution.
    pub(crate) fn set_waker(&self, id: SlotId, waker: &Waker) {
        if let Some(slot) = self.slots.lock().get_mut(id) {
            match &slot.waker {
                Some(current) if current.will_wake(waker) => {}
                _ => slot.waker = Some(waker.clone()),
            }
        }
    }

    /// Marks the wait behind `id` resolved and wakes it.
    ///
    /// A stale id is ignored: the wait was dropped or cancelled and the
    /// slot may already serve a different wait.
    pub(crate) fn resolve(&self, id: SlotId) {
        let waker = {
            let mut slots = self.slots.lock();
            match slots.get_mut(id) {
                Some(slot) => {
                    slot.resolved = true;
                    slot.waker.take()
                }
                None => {
                    trace!(index = id.index(), "stale wait resolution ignored");
                    return;
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Whether the wait behind `id` has resolved. `None` when the id is
    /// stale.
    pub(crate) fn is_resolved(&self, id: SlotId) -> Option<bool> {
        self.slots.lock().get(id).map(|slot| slot.resolved)
    }

    /// Returns the slot to the pool, advancing its token.
    pub(crate) fn release(&self, id: SlotId) {
        let _ = self.slots.lock().remove(id);
    }

    /// Number of waits currently outstanding.
    pub(crate) fn pending_count(&self) -> usize {
        self.slots.lock().live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_marks_slot() {
        let pool = WaitPool::with_capacity(4);
        let id = pool.register();
        assert_eq!(pool.is_resolved(id), Some(false));
        pool.resolve(id);
        assert_eq!(pool.is_resolved(id), Some(true));
        pool.release(id);
        assert_eq!(pool.is_resolved(id), None);
    }

    #[test]
    fn test_stale_resolution_does_not_touch_new_wait() {
        let pool = WaitPool::with_capacity(4);
        let old = pool.register();
        pool.release(old);

        let new = pool.register();
        assert_eq!(new.index(), old.index());

        pool.resolve(old);
        assert_eq!(pool.is_resolved(new), Some(false));
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = WaitPool::with_capacity(4);
        let id = pool.register();
        pool.release(id);
        pool.release(id);
        assert_eq!(pool.pending_count(), 0);
    }
}
