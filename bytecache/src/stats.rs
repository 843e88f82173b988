//! Cache statistics.

use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

/// A point-in-time snapshot of a cache's counters and occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// When counting started: cache open, or the last counter reset.
    pub start_time: SystemTime,
    /// Time elapsed since `start_time`.
    pub uptime: Duration,
    /// Lookups answered from the local cache.
    pub hits: u64,
    /// Lookups that went to the remote store, including downgraded hits.
    pub misses: u64,
    /// Bytes served from the local cache.
    pub get_bytes: u64,
    /// Values written into the local cache.
    pub puts: u64,
    /// Bytes written into the local cache.
    pub put_bytes: u64,
    /// Items evicted to make room.
    pub evicted: u64,
    /// Bytes evicted to make room.
    pub evicted_bytes: u64,
    /// Bytes currently resident. Occupancy, not a counter: reset leaves it.
    pub size: u64,
    /// Total capacity in bytes.
    pub capacity: u64,
    /// Items currently resident.
    pub num_items: u64,
}

/// The mutable counter block. All mutation happens under the cache's index
/// lock, so plain integers suffice.
#[derive(Debug)]
pub(crate) struct Counters {
    start_time: SystemTime,
    started: Instant,
    pub hits: u64,
    pub misses: u64,
    pub get_bytes: u64,
    pub puts: u64,
    pub put_bytes: u64,
    pub evicted: u64,
    pub evicted_bytes: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            started: Instant::now(),
            hits: 0,
            misses: 0,
            get_bytes: 0,
            puts: 0,
            put_bytes: 0,
            evicted: 0,
            evicted_bytes: 0,
        }
    }

    /// Snapshot the counters together with the given occupancy figures.
    pub fn snapshot(&self, size: u64, capacity: u64, num_items: u64) -> Stats {
        Stats {
            start_time: self.start_time,
            uptime: self.started.elapsed(),
            hits: self.hits,
            misses: self.misses,
            get_bytes: self.get_bytes,
            puts: self.puts,
            put_bytes: self.put_bytes,
            evicted: self.evicted,
            evicted_bytes: self.evicted_bytes,
            size,
            capacity,
            num_items,
        }
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
