//! Plain least-recently-used replacement.

use std::collections::HashMap;

use ahash::RandomState;

use crate::list::{Arena, List, SlotId};
use crate::{DEFAULT_EVICT_RATIO, MIN_CAPACITY, Policy, prune_cap};

/// A single-queue least-recently-used policy.
///
/// Every access moves a key to the front of one list; eviction pops from the
/// back until the size is at the prune capacity. There is no admission filter
/// and no ghost tracking, so a scan of one-time keys can flush the whole
/// cache; prefer [`crate::TwoQ`] for mixed workloads.
#[derive(Debug)]
pub struct BasicLru {
    items: HashMap<Box<[u8]>, SlotId, RandomState>,
    arena: Arena,
    list: List,
    cap: u64,
    prune_cap: u64,
    size: u64,
}

impl BasicLru {
    /// Create a policy with the given capacity and the default eviction
    /// ratio.
    pub fn with_capacity(cap: u64) -> Self {
        Self::new(cap, DEFAULT_EVICT_RATIO)
    }

    /// Create a policy with the given capacity and eviction ratio (the share
    /// of capacity freed beyond the limit when an eviction pass runs).
    /// Capacity is raised to [`MIN_CAPACITY`]; the ratio is clamped to
    /// `[0, 1]`.
    pub fn new(cap: u64, evict_ratio: f64) -> Self {
        let cap = cap.max(MIN_CAPACITY);
        Self {
            items: HashMap::default(),
            arena: Arena::new(),
            list: List::new(),
            cap,
            prune_cap: prune_cap(cap, evict_ratio),
            size: 0,
        }
    }

    fn prune(&mut self) -> (Vec<Vec<u8>>, u64) {
        if self.size <= self.cap {
            return (Vec::new(), 0);
        }
        self.evict()
    }

    /// Pop from the back until the size reaches the prune capacity.
    fn evict(&mut self) -> (Vec<Vec<u8>>, u64) {
        let mut evicted = Vec::new();
        let mut freed = 0;
        while self.size > self.prune_cap {
            let Some(id) = self.list.back() else {
                break;
            };
            self.list.remove(&mut self.arena, id);
            let (key, size) = self.arena.remove(id);
            self.size -= size;
            freed += size;
            self.items.remove(&key);
            evicted.push(key.into_vec());
        }
        (evicted, freed)
    }
}

impl Policy for BasicLru {
    fn get(&mut self, key: &[u8]) -> Option<u64> {
        let &id = self.items.get(key)?;
        self.list.move_to_front(&mut self.arena, id);
        Some(self.arena.slot(id).size)
    }

    fn put_and_evict(&mut self, key: &[u8], size: u64) -> (Vec<Vec<u8>>, u64) {
        if let Some(&id) = self.items.get(key) {
            let slot = self.arena.slot_mut(id);
            self.size = self.size - slot.size + size;
            slot.size = size;
            self.list.move_to_front(&mut self.arena, id);
            return self.prune();
        }
        let id = self.arena.insert(key.into(), size);
        self.size += size;
        self.list.push_front(&mut self.arena, id);
        self.items.insert(key.into(), id);
        self.prune()
    }

    fn put_on_startup(&mut self, key: &[u8], size: u64) -> bool {
        if self.size + size > self.cap {
            return false;
        }
        let id = self.arena.insert(key.into(), size);
        self.size += size;
        self.list.push_front(&mut self.arena, id);
        self.items.insert(key.into(), id);
        true
    }

    fn clear(&mut self) {
        self.items.clear();
        self.arena.clear();
        self.list.clear();
        self.size = 0;
    }

    fn cap(&self) -> u64 {
        self.cap
    }

    fn len(&self) -> u64 {
        self.list.len() as u64
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_capacity_applies_defaults() {
        let lru = BasicLru::with_capacity(0);
        assert_eq!(lru.cap(), 1000);
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.size(), 0);
        assert_eq!(lru.prune_cap, 999);
    }

    #[test]
    fn new_clamps_the_eviction_ratio() {
        let lru = BasicLru::new(0, -1.0);
        assert_eq!(lru.prune_cap, lru.cap);

        let lru = BasicLru::new(0, 2.0);
        assert_eq!(lru.prune_cap, 0);
    }

    #[test]
    fn get_missing_key_returns_none() {
        let mut lru = BasicLru::with_capacity(0);
        assert_eq!(lru.get(b"nokey"), None);
    }

    #[test]
    fn get_returns_size_and_refreshes_recency() {
        let mut lru = BasicLru::with_capacity(0);
        lru.put_and_evict(b"good", 100);
        lru.put_and_evict(b"other", 50);

        assert_eq!(lru.get(b"good"), Some(100));
        let front = lru.list.front().unwrap();
        assert_eq!(lru.arena.slot(front).key.as_ref(), b"good");
    }

    #[test]
    fn put_inserts_a_new_key() {
        let mut lru = BasicLru::with_capacity(0);
        let (evicted, bytes) = lru.put_and_evict(b"key", 100);
        assert!(evicted.is_empty());
        assert_eq!(bytes, 0);
        assert_eq!(lru.size(), 100);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn put_updates_an_existing_key_size() {
        let mut lru = BasicLru::with_capacity(0);
        lru.put_and_evict(b"key", 100);
        lru.put_and_evict(b"key2", 150);
        let (evicted, bytes) = lru.put_and_evict(b"key", 200);
        assert!(evicted.is_empty());
        assert_eq!(bytes, 0);
        assert_eq!(lru.size(), 350);
        assert_eq!(lru.len(), 2);
        let front = lru.list.front().unwrap();
        assert_eq!(lru.arena.slot(front).key.as_ref(), b"key");
        assert_eq!(lru.arena.slot(front).size, 200);
    }

    #[test]
    fn put_prunes_down_to_the_prune_capacity() {
        let mut lru = BasicLru::new(1000, 0.5);
        for i in 0..6u32 {
            let key = i.to_string();
            let (evicted, bytes) = lru.put_and_evict(key.as_bytes(), 150);
            assert!(evicted.is_empty());
            assert_eq!(bytes, 0);
        }
        let (evicted, bytes) = lru.put_and_evict(b"6", 150);
        assert_eq!(evicted.len(), 4);
        assert_eq!(bytes, 600);
        assert_eq!(lru.size(), 450);
        assert_eq!(lru.len(), 3);
        let back = lru.list.back().unwrap();
        assert_eq!(lru.arena.slot(back).key.as_ref(), b"4");
    }

    #[test]
    fn clear_empties_the_lru() {
        let mut lru = BasicLru::with_capacity(0);
        lru.put_and_evict(b"key", 100);
        assert_eq!(lru.size(), 100);
        assert_eq!(lru.len(), 1);

        lru.clear();
        assert_eq!(lru.size(), 0);
        assert_eq!(lru.len(), 0);
        assert!(lru.items.is_empty());
        assert_eq!(lru.get(b"key"), None);
    }

    #[test]
    fn put_on_startup_drops_overflow() {
        let mut lru = BasicLru::with_capacity(0);
        for i in 0..10u32 {
            let key = i.to_string();
            assert!(lru.put_on_startup(key.as_bytes(), 100));
        }
        assert!(!lru.put_on_startup(b"10", 100));
        assert_eq!(lru.size(), lru.cap());
        assert_eq!(lru.len(), 10);
    }

    #[test]
    fn evict_with_an_empty_list_returns_nothing() {
        let mut lru = BasicLru::with_capacity(0);
        lru.size = 1200;
        let (evicted, bytes) = lru.evict();
        assert!(evicted.is_empty());
        assert_eq!(bytes, 0);
        assert_eq!(lru.len(), 0);
    }
}
