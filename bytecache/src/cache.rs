//! The read-through cache coordinator.
//!
//! Binds the replacement policy to the persistent byte store and the remote
//! origin. Lookups consult the in-memory index first; index hits are served
//! from the local database, and misses are fetched from the origin with
//! at-most-one concurrent fetch per key. A fetched value is returned to the
//! caller immediately and written back to the database and the index in the
//! background.
//!
//! Lock discipline: the index lock covers the policy and the counters and
//! nothing else; database and origin calls always run with it released. The
//! in-flight-fetch map has its own lock, only ever taken alone.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use cache_policy::Policy;
use parking_lot::Mutex;

use crate::bufpool::{self, ValueBuf};
use crate::config::{Config, DEFAULT_BUCKET, DEFAULT_DB_PATH};
use crate::db::ByteStore;
use crate::error::CacheError;
use crate::flight::{Flight, Registry};
use crate::stats::{Counters, Stats};
use crate::store::{NoStore, PostStoreFn, Store};

/// A persistent read-through byte cache.
///
/// Cloning yields another handle to the same cache; handles are safe to use
/// from any number of threads.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    db: ByteStore,
    store: Box<dyn Store>,
    post_store: Option<PostStoreFn>,
    index: Mutex<Index>,
    flights: Registry,
}

/// Everything guarded by the index lock.
struct Index {
    policy: Box<dyn Policy>,
    counters: Counters,
}

/// Configures and opens a [`Cache`].
///
/// Unset knobs fall back to the defaults: the database at
/// [`DEFAULT_DB_PATH`], the table named [`DEFAULT_BUCKET`], a 2Q policy at
/// the default capacity, and no remote store (misses fail with
/// [`CacheError::NoStore`]).
pub struct CacheBuilder {
    db_path: PathBuf,
    bucket: String,
    policy: Option<Box<dyn Policy>>,
    store: Option<Box<dyn Store>>,
    post_store: Option<PostStoreFn>,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBuilder {
    /// Create a builder with every knob at its default.
    pub fn new() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bucket: DEFAULT_BUCKET.to_string(),
            policy: None,
            store: None,
            post_store: None,
        }
    }

    /// Start from a [`Config`], adopting its path, bucket, and policy.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .db_path(&config.db_path)
            .bucket(&config.bucket)
            .policy_boxed(config.build_policy())
    }

    /// Set the database file path. An empty path selects the default.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            self.db_path = path;
        }
        self
    }

    /// Set the table name inside the database. An empty name selects the
    /// default.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        if !bucket.is_empty() {
            self.bucket = bucket;
        }
        self
    }

    /// Set the replacement policy.
    pub fn policy(self, policy: impl Policy + 'static) -> Self {
        self.policy_boxed(Box::new(policy))
    }

    /// Set an already-boxed replacement policy.
    pub fn policy_boxed(mut self, policy: Box<dyn Policy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the remote store behind the cache.
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Set a hook that rewrites the remote store's `(value, error)` outcome
    /// before it is cached and returned. Runs under the same panic guard as
    /// the store call itself.
    pub fn post_store_fn(
        mut self,
        hook: impl Fn(Result<Option<Bytes>, CacheError>) -> Result<Option<Bytes>, CacheError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.post_store = Some(Box::new(hook));
        self
    }

    /// Open the remote store and the local database, then rebuild the index
    /// from whatever the database already holds. Entries that no longer fit
    /// are deleted from the database during the same pass.
    pub fn open(self) -> Result<Cache, CacheError> {
        let store = self.store.unwrap_or_else(|| Box::new(NoStore));
        store.open()?;

        let db = ByteStore::open(&self.db_path, &self.bucket).map_err(CacheError::backing)?;
        let policy = self
            .policy
            .unwrap_or_else(|| Config::default().build_policy());

        let cache = Cache {
            shared: Arc::new(Shared {
                db,
                store,
                post_store: self.post_store,
                index: Mutex::new(Index {
                    policy,
                    counters: Counters::new(),
                }),
                flights: Registry::new(),
            }),
        };
        cache.reconcile()?;
        tracing::debug!(path = %self.db_path.display(), bucket = %self.bucket, "cache opened");
        Ok(cache)
    }
}

impl Cache {
    /// Start configuring a cache.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// Retrieve the value for `key`.
    ///
    /// Served from the local database when the index has the key; otherwise
    /// fetched from the remote store, returned to the caller, and cached in
    /// the background. Concurrent misses on one key share a single remote
    /// fetch.
    pub fn get(&self, key: &[u8]) -> Result<Bytes, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        if let Some(size) = self.hit(key) {
            match self.shared.db.get(key) {
                Ok(Some(value)) => return Ok(Bytes::from(value)),
                Ok(None) => self.hit_to_miss(size),
                Err(e) => {
                    tracing::warn!(error = %e, "hit-path read failed; treating as a miss");
                    self.hit_to_miss(size);
                }
            }
        }
        self.fetch(key)
    }

    /// Retrieve the value for `key` into a pooled buffer.
    ///
    /// Same flow as [`Cache::get`], but a hit is copied into a buffer drawn
    /// from a process-wide pool instead of a fresh allocation. The buffer's
    /// storage is recycled when the returned [`ValueBuf`] is dropped.
    pub fn get_buffered(&self, key: &[u8]) -> Result<ValueBuf, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        if let Some(size) = self.hit(key) {
            let mut buf = bufpool::take();
            match self.shared.db.read_into(key, &mut buf) {
                Ok(true) => return Ok(ValueBuf::pooled(buf)),
                Ok(false) => {
                    bufpool::put(buf);
                    self.hit_to_miss(size);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "hit-path read failed; treating as a miss");
                    bufpool::put(buf);
                    self.hit_to_miss(size);
                }
            }
        }
        self.fetch(key).map(ValueBuf::owned)
    }

    /// Discard every entry from the index and the database. Capacity and the
    /// configured policy are unchanged.
    pub fn empty(&self) -> Result<(), CacheError> {
        {
            let mut index = self.shared.index.lock();
            index.policy.clear();
        }
        self.shared.db.truncate().map_err(CacheError::backing)
    }

    /// Snapshot the cache's counters and occupancy.
    pub fn stats(&self) -> Stats {
        let index = self.shared.index.lock();
        index.counters.snapshot(
            index.policy.size(),
            index.policy.cap(),
            index.policy.len(),
        )
    }

    /// Zero the counters and restart the stats clock, returning the snapshot
    /// taken just before the reset. Occupancy figures are not counters and
    /// are unaffected.
    pub fn reset_stats(&self) -> Stats {
        let mut index = self.shared.index.lock();
        let stats = index.counters.snapshot(
            index.policy.size(),
            index.policy.cap(),
            index.policy.len(),
        );
        index.counters.reset();
        stats
    }

    /// Close the remote store and release the cache.
    ///
    /// The index is cleared regardless of the store's close outcome, and the
    /// store's error (if any) is returned. The database file itself closes
    /// once the last handle (including any still-running background
    /// write-back) goes away; committed writes are already durable.
    pub fn close(self) -> Result<(), CacheError> {
        let result = self.shared.store.close();
        {
            let mut index = self.shared.index.lock();
            index.policy.clear();
        }
        tracing::debug!("cache closed");
        result
    }

    /// Rebuild the index from the database contents at open. Keys the policy
    /// declines are deleted from the database in the same transaction.
    fn reconcile(&self) -> Result<(), CacheError> {
        let mut kept = 0u64;
        let mut dropped = 0u64;
        {
            let mut index = self.shared.index.lock();
            let policy = &mut index.policy;
            self.shared
                .db
                .retain_entries(|key, value| {
                    if policy.put_on_startup(key, value.len() as u64) {
                        kept += 1;
                        true
                    } else {
                        dropped += 1;
                        false
                    }
                })
                .map_err(CacheError::backing)?;
        }
        if kept + dropped > 0 {
            tracing::info!(kept, dropped, "rebuilt index from existing entries");
        }
        Ok(())
    }

    /// Record the lookup in the index: the value size on a hit, `None` on a
    /// miss.
    fn hit(&self, key: &[u8]) -> Option<u64> {
        let mut index = self.shared.index.lock();
        match index.policy.get(key) {
            Some(size) => {
                index.counters.hits += 1;
                index.counters.get_bytes += size;
                Some(size)
            }
            None => {
                index.counters.misses += 1;
                None
            }
        }
    }

    /// Revert a lookup counted as a hit whose value turned out to be missing
    /// from the database. Saturating, in case a stats reset slipped between
    /// the hit and the downgrade.
    fn hit_to_miss(&self, size: u64) {
        let mut index = self.shared.index.lock();
        index.counters.hits = index.counters.hits.saturating_sub(1);
        index.counters.get_bytes = index.counters.get_bytes.saturating_sub(size);
        index.counters.misses += 1;
    }

    /// Fetch `key` from the remote store, coalescing with any fetch already
    /// in flight. The leader returns the value immediately and leaves the
    /// write-back running in the background; the flight is retired only after
    /// that write-back completes.
    fn fetch(&self, key: &[u8]) -> Result<Bytes, CacheError> {
        let pending = match self.shared.flights.begin(key) {
            Flight::Follower(pending) => return pending.wait(),
            Flight::Leader(pending) => pending,
        };

        let result = self.fetch_origin(key);
        pending.complete(result.clone());

        match result {
            Err(e) => {
                self.shared.flights.end(key);
                Err(e)
            }
            Ok(value) => {
                self.spawn_write_back(key.to_vec(), value.clone());
                Ok(value)
            }
        }
    }

    /// Call the remote store (and the post-store hook), converting panics
    /// into errors and an absent or empty value into [`CacheError::NoValue`].
    fn fetch_origin(&self, key: &[u8]) -> Result<Bytes, CacheError> {
        let shared = &self.shared;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let raw = shared.store.get(key);
            match &shared.post_store {
                Some(hook) => hook(raw),
                None => raw,
            }
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(error = %message, "remote store fetch panicked");
            Err(CacheError::Store(format!("panic: {message}")))
        });

        match outcome {
            Ok(Some(value)) if !value.is_empty() => Ok(value),
            Ok(_) => Err(CacheError::NoValue),
            Err(e) => Err(e),
        }
    }

    fn spawn_write_back(&self, key: Vec<u8>, value: Bytes) {
        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();
        let task_value = value.clone();
        let spawned = thread::Builder::new()
            .name("bytecache-writeback".to_string())
            .spawn(move || {
                shared.write_back(&task_key, &task_value);
                shared.flights.end(&task_key);
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "no thread for write-back; running it inline");
            self.shared.write_back(&key, &value);
            self.shared.flights.end(&key);
        }
    }
}

impl Shared {
    /// Persist a fetched value, admit it to the index, and delete whatever
    /// the admission evicted. A database write failure drops the insertion;
    /// the caller already has its value either way.
    fn write_back(&self, key: &[u8], value: &[u8]) {
        if let Err(e) = self.db.put(key, value) {
            tracing::warn!(error = %e, "write-back failed; value not cached");
            return;
        }
        let size = value.len() as u64;
        let evicted = {
            let mut index = self.index.lock();
            let (evicted, evicted_bytes) = index.policy.put_and_evict(key, size);
            index.counters.puts += 1;
            index.counters.put_bytes += size;
            index.counters.evicted += evicted.len() as u64;
            index.counters.evicted_bytes += evicted_bytes;
            evicted
        };
        if !evicted.is_empty() {
            if let Err(e) = self.db.delete_many(&evicted) {
                tracing::warn!(error = %e, keys = evicted.len(), "failed to delete evicted keys");
            }
        }
    }
}

/// Render a panic payload for an error message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_policy::TwoQ;

    fn scratch_cache(dir: &tempfile::TempDir) -> CacheBuilder {
        Cache::builder().db_path(dir.path().join("cache.db"))
    }

    #[test]
    fn builder_keeps_defaults_for_empty_overrides() {
        let builder = Cache::builder().db_path("").bucket("");
        assert_eq!(builder.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(builder.bucket, DEFAULT_BUCKET);
    }

    #[test]
    fn builder_applies_overrides() {
        let builder = Cache::builder().db_path("cache.db").bucket("pages");
        assert_eq!(builder.db_path, PathBuf::from("cache.db"));
        assert_eq!(builder.bucket, "pages");
    }

    #[test]
    fn builder_adopts_a_config() {
        let config = Config {
            db_path: "pages.db".into(),
            bucket: "pages".into(),
            capacity: 2048,
            policy: crate::config::PolicyConfig::Lru { evict_ratio: 0.01 },
        };
        let builder = CacheBuilder::from_config(&config);
        assert_eq!(builder.db_path, PathBuf::from("pages.db"));
        assert_eq!(builder.bucket, "pages");
        assert_eq!(builder.policy.as_ref().map(|p| p.cap()), Some(2048));
    }

    #[test]
    fn open_fails_on_an_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = Cache::builder()
            .db_path(dir.path().join("missing").join("cache.db"))
            .open();
        assert!(matches!(result, Err(CacheError::Backing(_))));
    }

    #[test]
    fn empty_keys_are_rejected_before_any_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let cache = scratch_cache(&dir).open().unwrap();
        assert_eq!(cache.get(b""), Err(CacheError::EmptyKey));
        assert!(matches!(
            cache.get_buffered(b""),
            Err(CacheError::EmptyKey)
        ));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn misses_without_a_store_fail_with_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let cache = scratch_cache(&dir).open().unwrap();
        assert_eq!(cache.get(b"key"), Err(CacheError::NoStore));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn a_seeded_index_without_data_downgrades_to_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = TwoQ::with_capacity(1000);
        policy.put_and_evict(b"k", 400);
        let cache = scratch_cache(&dir).policy(policy).open().unwrap();

        assert_eq!(cache.get(b"k"), Err(CacheError::NoStore));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.get_bytes, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn panic_messages_cover_the_common_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42i32), "unknown panic");
    }
}
