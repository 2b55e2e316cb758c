//! # Generational Slot Pool
//!
//! A fixed-cost allocator for objects that are checked out and returned at a
//! high rate, with handles that become harmless once their slot is reused.
//!
//! Every slot carries a 16-bit token that advances each time the slot is
//! freed. A [`SlotId`] records the token it was issued with; any access
//! through a stale id returns `None` instead of touching the recycled value.

/// Handle to a value stored in a [`SlotPool`].
///
/// The id is only valid while the token matches the slot's current token.
/// After the slot is freed and reused, old ids silently miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId {
    /// Index into the pool's slot array.
    index: u32,
    /// The slot token at the time the id was issued.
    token: u16,
}

impl SlotId {
    /// Returns the index portion of the id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the token portion of the id.
    #[inline]
    #[must_use]
    pub const fn token(self) -> u16 {
        self.token
    }
}

/// One slot: the current token plus the stored value, if any.
struct Slot<T> {
    token: u16,
    value: Option<T>,
}

/// A generational slot pool.
///
/// Insertion takes a slot from the free list (or grows the backing array),
/// removal returns the slot to the free list and advances its token. All
/// operations are O(1); the backing storage is only reallocated when the
/// live count exceeds every slot ever created.
///
/// # Thread Safety
///
/// Not thread-safe on its own. Callers wrap it in a lock when shared.
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> SlotPool<T> {
    /// Creates a pool with pre-allocated capacity for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Returns the number of live values.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Returns the total number of slots ever created (live + free).
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Stores `value`, reusing a free slot when one exists.
    pub fn insert(&mut self, value: T) -> SlotId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return SlotId {
                index,
                token: slot.token,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            token: 0,
            value: Some(value),
        });
        SlotId { index, token: 0 }
    }

    /// Returns a reference to the value behind `id`, or `None` if the id is
    /// stale or the slot is empty.
    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.token != id.token {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable variant of [`SlotPool::get`].
    #[must_use]
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.token != id.token {
            return None;
        }
        slot.value.as_mut()
    }

    /// Frees the slot behind `id`, returning its value.
    ///
    /// The slot's token advances so that every outstanding copy of `id`
    /// becomes stale. Returns `None` when `id` is already stale.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.token != id.token {
            return None;
        }
        let value = slot.value.take()?;
        slot.token = slot.token.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(value)
    }

    /// Frees every slot, advancing each occupied slot's token.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.token = slot.token.wrapping_add(1);
                self.free.push(u32::try_from(index).unwrap_or(u32::MAX));
            }
        }
        self.live = 0;
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut pool: SlotPool<u32> = SlotPool::new();
        let id = pool.insert(42);
        assert_eq!(pool.get(id), Some(&42));
        assert_eq!(pool.live_count(), 1);

        assert_eq!(pool.remove(id), Some(42));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.get(id), None);
    }

    #[test]
    fn test_stale_id_misses_after_reuse() {
        let mut pool: SlotPool<&str> = SlotPool::new();
        let old = pool.insert("first");
        pool.remove(old);

        let new = pool.insert("second");
        assert_eq!(new.index(), old.index());
        assert_ne!(new.token(), old.token());

        // The stale id must not reach the new occupant.
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.remove(old), None);
        assert_eq!(pool.get(new), Some(&"second"));
    }

    #[test]
    fn test_free_list_reuse_keeps_slot_count_flat() {
        let mut pool: SlotPool<u8> = SlotPool::with_capacity(4);
        for round in 0..100_u8 {
            let id = pool.insert(round);
            pool.remove(id);
        }
        assert_eq!(pool.slot_count(), 1);
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut pool: SlotPool<u32> = SlotPool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        pool.clear();
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get(b), None);
        assert_eq!(pool.live_count(), 0);
    }
}
