//! Coalescing of concurrent origin fetches.
//!
//! At most one fetch per key is in flight at a time. The first caller to miss
//! on a key becomes the leader and performs the fetch; callers arriving while
//! the entry exists become followers and block until the leader publishes its
//! result. The entry is removed only after the leader's post-fetch work (the
//! background write-back) has run, so bursts keep coalescing; a caller
//! arriving after removal starts a fresh flight.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::error::CacheError;

pub(crate) type FetchResult = Result<Bytes, CacheError>;

/// A fetch in progress: a one-shot result cell plus a barrier for followers.
pub(crate) struct Pending {
    result: Mutex<Option<FetchResult>>,
    done: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Publish the fetch result and release every waiting follower. Called
    /// exactly once, by the leader.
    pub fn complete(&self, result: FetchResult) {
        let mut slot = self.result.lock();
        *slot = Some(result);
        self.done.notify_all();
    }

    /// Block until the leader publishes, then return its result.
    pub fn wait(&self) -> FetchResult {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// The caller's role in a fetch.
pub(crate) enum Flight {
    /// This caller owns the fetch and must `complete` it.
    Leader(Arc<Pending>),
    /// Another caller owns the fetch; wait on it.
    Follower(Arc<Pending>),
}

/// Registry of in-flight fetches, keyed by the requested key.
///
/// The internal lock guards only the map and is never held while fetching.
pub(crate) struct Registry {
    flights: Mutex<HashMap<Vec<u8>, Arc<Pending>, RandomState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::default()),
        }
    }

    /// Join the flight for `key`, creating it if absent. Exactly one caller
    /// is handed `Leader` per flight.
    pub fn begin(&self, key: &[u8]) -> Flight {
        let mut flights = self.flights.lock();
        if let Some(pending) = flights.get(key) {
            return Flight::Follower(Arc::clone(pending));
        }
        let pending = Arc::new(Pending::new());
        flights.insert(key.to_vec(), Arc::clone(&pending));
        Flight::Leader(pending)
    }

    /// Retire the flight for `key`. The next `begin` elects a new leader.
    pub fn end(&self, key: &[u8]) {
        self.flights.lock().remove(key);
    }
}
