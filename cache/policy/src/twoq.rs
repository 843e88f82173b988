//! The 2Q replacement engine.

use std::collections::HashMap;

use ahash::RandomState;

use crate::list::{Arena, Residency, SlotId};
use crate::queue::SubQueue;
use crate::{
    DEFAULT_COLD_RATIO, DEFAULT_EVICT_RATIO, DEFAULT_WARM_HOT_RATIO, MIN_CAPACITY, Policy,
    clamp_ratio, prune_cap,
};

/// The 2Q replacement engine.
///
/// The engine consists of a master key index, the total capacity in bytes,
/// and three queues. The hot queue holds frequently accessed keys (requested
/// more than once), the warm queue holds keys requested only once, and the
/// cold queue remembers recently evicted keys as ghosts. Keys in hot or warm
/// have live values in the backing store; keys evicted from either are pushed
/// to the front of cold and their values are expected to be deleted. A put of
/// a key found in cold goes straight to the front of hot instead of warm,
/// which is what lets a quickly re-requested key skip a second probation.
///
/// When a put pushes `hot + warm` past the total capacity, the warm queue is
/// pruned first so that one-hit keys are discarded before frequently used
/// ones, then the hot queue, then cold is trimmed to its own capacity. Each
/// pass stops at the prune capacities, never at zero, so eviction cost is
/// amortized.
#[derive(Debug)]
pub struct TwoQ {
    items: HashMap<Box<[u8]>, SlotId, RandomState>,
    arena: Arena,
    cap: u64,
    prune_cap: u64,
    hot: SubQueue,
    warm: SubQueue,
    cold: SubQueue,
}

impl TwoQ {
    /// Create an engine with the given capacity and the default ratios.
    pub fn with_capacity(cap: u64) -> Self {
        Self::new(
            cap,
            DEFAULT_EVICT_RATIO,
            DEFAULT_WARM_HOT_RATIO,
            DEFAULT_COLD_RATIO,
        )
    }

    /// Create an engine with the given capacity, eviction ratio, warm/hot
    /// ratio, and cold ratio.
    ///
    /// `evict_ratio` is the share of capacity (by size) freed beyond the
    /// limit when an eviction pass runs. `warm_hot_ratio` is the share of
    /// capacity reserved for the warm queue, the remainder going to hot; it
    /// matters when deciding which queue evicts. `cold_ratio` sizes the ghost
    /// queue relative to total capacity.
    ///
    /// Capacity is raised to [`MIN_CAPACITY`]; the ratios are clamped to
    /// `[0, 1]` (`cold_ratio` only to be non-negative).
    pub fn new(cap: u64, evict_ratio: f64, warm_hot_ratio: f64, cold_ratio: f64) -> Self {
        let cap = cap.max(MIN_CAPACITY);
        let evict_ratio = clamp_ratio(evict_ratio);
        let cold_ratio = cold_ratio.max(0.0);
        let warm_cap = (clamp_ratio(warm_hot_ratio) * cap as f64) as u64;
        let hot_cap = cap - warm_cap;
        let cold_cap = (cold_ratio * cap as f64) as u64;
        Self {
            items: HashMap::default(),
            arena: Arena::new(),
            cap,
            prune_cap: prune_cap(cap, evict_ratio),
            hot: SubQueue::new(Residency::Hot, evict_ratio, hot_cap),
            warm: SubQueue::new(Residency::Warm, evict_ratio, warm_cap),
            cold: SubQueue::new(Residency::Cold, evict_ratio, cold_cap),
        }
    }

    /// Evict from warm then hot into cold until the engine is back at its
    /// prune capacity, then trim cold. No-op while within capacity.
    fn prune(&mut self) -> (Vec<Vec<u8>>, u64) {
        if self.hot.size() + self.warm.size() <= self.cap {
            return (Vec::new(), 0);
        }
        let mut evicted = Vec::new();
        let hot_size = self.hot.size();
        let warm_freed = self.warm.evict_into(
            &mut self.cold,
            &mut self.arena,
            hot_size,
            self.prune_cap,
            &mut evicted,
        );
        let warm_size = self.warm.size();
        let hot_freed = self.hot.evict_into(
            &mut self.cold,
            &mut self.arena,
            warm_size,
            self.prune_cap,
            &mut evicted,
        );
        self.trim_cold();
        (evicted, warm_freed + hot_freed)
    }

    /// Drop ghosts off the back of cold until it fits its capacity. Unlike
    /// the hot and warm passes this ignores the prune capacity and the
    /// dropped keys are not surfaced: their values are already gone.
    fn trim_cold(&mut self) {
        while self.cold.size() > self.cold.cap() {
            let Some(id) = self.cold.pop_back(&mut self.arena) else {
                return;
            };
            let (key, _) = self.arena.remove(id);
            self.items.remove(&key);
        }
    }
}

impl Policy for TwoQ {
    fn get(&mut self, key: &[u8]) -> Option<u64> {
        let &id = self.items.get(key)?;
        match self.arena.slot(id).residency {
            Residency::Hot => self.hot.touch(&mut self.arena, id),
            Residency::Warm => {
                self.warm.remove(&mut self.arena, id);
                self.hot.push_front(&mut self.arena, id);
            }
            // A ghost's value is gone; for read purposes the key is absent.
            Residency::Cold => return None,
        }
        Some(self.arena.slot(id).size)
    }

    fn put_and_evict(&mut self, key: &[u8], size: u64) -> (Vec<Vec<u8>>, u64) {
        if let Some(&id) = self.items.get(key) {
            match self.arena.slot(id).residency {
                Residency::Hot => {
                    self.hot.update_size(&mut self.arena, id, size);
                    self.hot.touch(&mut self.arena, id);
                    return (Vec::new(), 0);
                }
                Residency::Warm => {
                    self.warm.remove(&mut self.arena, id);
                    self.arena.slot_mut(id).size = size;
                    self.hot.push_front(&mut self.arena, id);
                    return (Vec::new(), 0);
                }
                Residency::Cold => {
                    self.cold.remove(&mut self.arena, id);
                    self.arena.slot_mut(id).size = size;
                    self.hot.push_front(&mut self.arena, id);
                    return self.prune();
                }
            }
        }
        let id = self.arena.insert(key.into(), size);
        self.warm.push_front(&mut self.arena, id);
        self.items.insert(key.into(), id);
        self.prune()
    }

    fn put_on_startup(&mut self, key: &[u8], size: u64) -> bool {
        if self.size() + size <= self.cap {
            let id = self.arena.insert(key.into(), size);
            self.warm.push_front(&mut self.arena, id);
            self.items.insert(key.into(), id);
            return true;
        }
        if self.cold.size() + size <= self.cold.cap() {
            let id = self.arena.insert(key.into(), size);
            self.cold.push_front(&mut self.arena, id);
            self.items.insert(key.into(), id);
        }
        false
    }

    fn clear(&mut self) {
        self.items.clear();
        self.arena.clear();
        self.cold.clear();
        self.warm.clear();
        self.hot.clear();
    }

    fn cap(&self) -> u64 {
        self.cap
    }

    fn len(&self) -> u64 {
        (self.hot.len() + self.warm.len()) as u64
    }

    fn size(&self) -> u64 {
        self.hot.size() + self.warm.size()
    }
}
