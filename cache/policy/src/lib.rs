//! Size-bounded replacement policies for a byte cache.
//!
//! This crate provides the in-memory index that decides which keys a cache
//! keeps, promotes, and evicts. Two engines are included:
//!
//! - [`TwoQ`] - the 2Q algorithm, as defined by Theodore Johnson and Dennis
//!   Shasha: <http://www.vldb.org/conf/1994/P439.PDF>. Keys requested once sit
//!   in a warm queue, keys requested repeatedly are promoted to a hot queue,
//!   and recently evicted keys are remembered in a cold ghost queue so that a
//!   quick re-request is promoted straight back to hot.
//! - [`BasicLru`] - a single-queue least-recently-used policy.
//!
//! Both engines track sizes in bytes, not item counts, and both implement the
//! [`Policy`] trait so a cache can select its engine at construction time.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                          TwoQ                                |
//! |                                                              |
//! |  index: Map<Key, SlotId>      arena: slots + free list       |
//! |                                                              |
//! |  WARM (first request)   HOT (repeat requests)   COLD (ghost) |
//! |  front ........ back    front ......... back    front . back |
//! |    ^ new keys     | evict  ^ promoted      | evict  | trim   |
//! |    +--------------+--------+---------------+--------+--> out |
//! +--------------------------------------------------------------+
//! ```
//!
//! The engines are not synchronized; callers wrap them in their own lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod basic;
mod list;
mod queue;
mod twoq;

pub use basic::BasicLru;
pub use twoq::TwoQ;

/// Minimum capacity of a policy in bytes. Smaller requests are raised to this.
pub const MIN_CAPACITY: u64 = 1000;

/// Default share of bytes freed beyond capacity on each eviction pass.
pub const DEFAULT_EVICT_RATIO: f64 = 0.001;

/// Default share of capacity reserved for the warm queue of a [`TwoQ`].
pub const DEFAULT_WARM_HOT_RATIO: f64 = 0.25;

/// Default size of a [`TwoQ`]'s cold ghost queue relative to total capacity.
pub const DEFAULT_COLD_RATIO: f64 = 0.5;

/// A replacement policy over keys and value sizes.
///
/// A policy is an index, not a store: it records which keys the cache holds
/// and how large their values are, and answers eviction questions. The caller
/// owns the values themselves.
pub trait Policy: Send {
    /// Record an access to `key` and return the size of its value, or `None`
    /// if the key is not resident.
    fn get(&mut self, key: &[u8]) -> Option<u64>;

    /// Insert `key` with the given value size, updating recency, and evict as
    /// needed. Returns the evicted keys and the total bytes they accounted
    /// for. The caller is expected to delete the returned keys from its
    /// backing store.
    fn put_and_evict(&mut self, key: &[u8], size: u64) -> (Vec<Vec<u8>>, u64);

    /// Bulk-load `key` while rebuilding the index at startup. Returns `true`
    /// if the key was admitted as a resident entry; a `false` return means
    /// the caller should drop the key's persisted value.
    fn put_on_startup(&mut self, key: &[u8], size: u64) -> bool;

    /// Remove every entry.
    fn clear(&mut self);

    /// Total capacity in bytes.
    fn cap(&self) -> u64;

    /// Number of resident items.
    fn len(&self) -> u64;

    /// Returns `true` if no items are resident.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes accounted to resident items.
    fn size(&self) -> u64;
}

/// Clamp a ratio to `[0.0, 1.0]`.
pub(crate) fn clamp_ratio(ratio: f64) -> f64 {
    ratio.clamp(0.0, 1.0)
}

/// Capacity left after an eviction pass: `(1 - evict_ratio) * cap`.
pub(crate) fn prune_cap(cap: u64, evict_ratio: f64) -> u64 {
    ((1.0 - clamp_ratio(evict_ratio)) * cap as f64) as u64
}
