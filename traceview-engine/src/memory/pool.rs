//! Fixed-block object pools (spec §4.3 "Pools").
//!
//! The original allocates raw blocks and placement-news objects into them;
//! per spec §9's "arena + indices" redesign note we replace that with a
//! plain slot arena addressed by `(pool, slot)` index pairs instead of raw
//! pointers, so eviction of a pool can never leave a dangling reference
//! inside the LRU structure.

/// An arena-relative handle: which slot inside one `Pool<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub u32);

/// Block count per pool is chosen so the pool covers roughly `2^11 * 2^e`
/// slots, `e = log2(GB of available memory)`, matching the original's
/// `m_mem_block_size` derivation.
pub fn default_block_capacity(avail_bytes: u64) -> usize {
    let gigabytes = avail_bytes >> 30;
    let mut exponent: u64 = 1;
    let mut n = gigabytes.max(1);
    while n > 1 {
        n >>= 1;
        exponent <<= 1;
    }
    (exponent << 11) as usize
}

/// A single fixed-slot-size arena for one object kind. Slots are reused via
/// a free list rather than returned to the OS individually; the whole pool
/// is dropped once its bitmap goes fully clear (`is_empty`).
pub struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            slots: Vec::with_capacity(cap),
            free: Vec::with_capacity(cap),
            live: 0,
        }
    }

    /// Allocates a slot for `value`, reusing a freed slot if one exists.
    pub fn alloc(&mut self, value: T) -> Slot {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(value);
            self.live += 1;
            return Slot(idx);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(value));
        self.live += 1;
        Slot(idx)
    }

    /// Frees a slot, returning its value. `None` if the slot was already
    /// free (double-free is a caller bug, not a panic).
    pub fn free(&mut self, slot: Slot) -> Option<T> {
        let cell = self.slots.get_mut(slot.0 as usize)?;
        let value = cell.take()?;
        self.free.push(slot.0);
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.slots.get(slot.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        self.slots.get_mut(slot.0 as usize)?.as_mut()
    }

    /// True once every allocated slot has been freed — the Rust analogue of
    /// the original's `bitmask.None()` pool-reclamation check.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Bytes currently attributable to this pool for budget accounting:
    /// one `size_of::<T>()` per allocated (not merely reserved) slot.
    pub fn bytes_used(&self) -> u64 {
        (self.live * std::mem::size_of::<T>()) as u64
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_reuses_slot() {
        let mut pool: Pool<u64> = Pool::new();
        let a = pool.alloc(1);
        let b = pool.alloc(2);
        assert_ne!(a, b);
        pool.free(a);
        assert!(!pool.is_empty());
        let c = pool.alloc(3);
        assert_eq!(c, a, "freed slot should be reused before growing");
    }

    #[test]
    fn pool_reports_empty_after_all_freed() {
        let mut pool: Pool<u64> = Pool::new();
        let a = pool.alloc(1);
        let b = pool.alloc(2);
        pool.free(a);
        assert!(!pool.is_empty());
        pool.free(b);
        assert!(pool.is_empty());
    }

    #[test]
    fn block_capacity_grows_with_available_memory() {
        let small = default_block_capacity(1 << 30);
        let large = default_block_capacity(8 << 30);
        assert!(large >= small);
    }
}
