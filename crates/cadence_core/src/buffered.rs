//! # Deferred-Mutation Collection
//!
//! A list whose adds and removes always go through buffers, merged into the
//! live view at an explicit apply step. Code iterating the live view during
//! a frame phase never observes a mutation requested in that same phase.

use parking_lot::{Mutex, RwLock};

/// Completion callback invoked once a buffered mutation has been applied.
type AppliedFn<T> = Box<dyn FnOnce(&T) + Send>;

/// A collection with buffered mutations.
///
/// `add` and `remove` never touch the live view synchronously; they land in
/// buffers merged by [`BufferedList::apply_add`] and
/// [`BufferedList::apply_remove`]. The apply steps run their per-item
/// completion callbacks with no internal lock held, so a callback may itself
/// request further adds or removes (those land in the fresh buffers).
///
/// Element identity for removal is decided by the `matches` comparator given
/// at construction (typically pointer equality on shared handles).
pub struct BufferedList<T> {
    live: RwLock<Vec<T>>,
    added: Mutex<Vec<(T, AppliedFn<T>)>>,
    removed: Mutex<Vec<(T, AppliedFn<T>)>>,
    matches: fn(&T, &T) -> bool,
    sort_key: Option<fn(&T) -> i64>,
}

impl<T: Clone> BufferedList<T> {
    /// Creates a list using `matches` to pair removal requests with live
    /// items.
    #[must_use]
    pub fn new(matches: fn(&T, &T) -> bool) -> Self {
        Self {
            live: RwLock::new(Vec::new()),
            added: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            matches,
            sort_key: None,
        }
    }

    /// Keeps the live view stably sorted by `key` after every apply-add.
    #[must_use]
    pub fn with_sort_key(mut self, key: fn(&T) -> i64) -> Self {
        self.sort_key = Some(key);
        self
    }

    /// Number of items in the live view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// Whether the live view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Clones the live view.
    ///
    /// The snapshot stays stable while callers fan out over it, even if the
    /// visited items buffer further mutations.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.live.read().clone()
    }

    /// Buffers an addition. `on_added` runs after the item becomes live.
    pub fn add(&self, item: T, on_added: impl FnOnce(&T) + Send + 'static) {
        self.added.lock().push((item, Box::new(on_added)));
    }

    /// Buffers a removal. `on_removed` runs after the apply step, whether or
    /// not a matching live item was found (an item whose activation never
    /// completed may be removed before it was ever applied).
    pub fn remove(&self, item: T, on_removed: impl FnOnce(&T) + Send + 'static) {
        self.removed.lock().push((item, Box::new(on_removed)));
    }

    /// Merges the add buffer into the live view.
    ///
    /// Returns `true` when anything was applied. Completion callbacks run
    /// after the merge (and re-sort, when configured), outside all locks.
    pub fn apply_add(&self) -> bool {
        let pending = std::mem::take(&mut *self.added.lock());
        if pending.is_empty() {
            return false;
        }
        {
            let mut live = self.live.write();
            live.extend(pending.iter().map(|(item, _)| item.clone()));
            if let Some(key) = self.sort_key {
                live.sort_by_key(key);
            }
        }
        for (item, on_added) in pending {
            on_added(&item);
        }
        true
    }

    /// Removes buffered items from the live view.
    ///
    /// Returns `true` when anything was processed.
    pub fn apply_remove(&self) -> bool {
        let pending = std::mem::take(&mut *self.removed.lock());
        if pending.is_empty() {
            return false;
        }
        {
            let mut live = self.live.write();
            for (item, _) in &pending {
                if let Some(pos) = live.iter().position(|x| (self.matches)(x, item)) {
                    live.remove(pos);
                }
            }
        }
        for (item, on_removed) in pending {
            on_removed(&item);
        }
        true
    }

    /// Drops the live view and both buffers without running callbacks.
    pub fn clear(&self) {
        self.added.lock().clear();
        self.removed.lock().clear();
        self.live.write().clear();
    }
}
