//! Persistent read-through byte cache.
//!
//! A [`Cache`] sits between callers and a slow remote store. Values are
//! looked up by opaque byte keys: hits are served from a local single-file
//! database, misses are fetched from the remote store, returned to the
//! caller, and written into the cache in the background. Which keys stay
//! resident is decided by a replacement policy, by default the 2Q engine
//! from [`cache_policy`], which keeps one-hit keys from flushing frequently
//! used ones.
//!
//! Concurrent misses on the same key are coalesced into a single remote
//! fetch whose result fans out to every waiting caller. The in-memory index
//! is rebuilt from the database on open, trimming whatever no longer fits.
//!
//! # Example
//!
//! ```ignore
//! use bytecache::{Cache, FnStore};
//! use bytes::Bytes;
//!
//! let cache = Cache::builder()
//!     .db_path("/var/cache/pages.db")
//!     .store(FnStore::new(|key| {
//!         // fetch from the real backend here
//!         Ok(Some(Bytes::from(format!("value for {key:?}"))))
//!     }))
//!     .open()?;
//!
//! let value = cache.get(b"page-1")?;       // first call reaches the backend
//! let value = cache.get(b"page-1")?;       // served locally once settled
//! # Ok::<(), bytecache::CacheError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bufpool;
mod cache;
mod config;
mod db;
mod error;
mod flight;
mod stats;
mod store;

pub use bufpool::ValueBuf;
pub use cache::{Cache, CacheBuilder};
pub use config::{Config, DEFAULT_BUCKET, DEFAULT_CAPACITY, DEFAULT_DB_PATH, PolicyConfig};
pub use error::CacheError;
pub use stats::Stats;
pub use store::{FnStore, NoStore, PostStoreFn, Store};

// The policy surface, re-exported so callers can tune or swap engines
// without naming the policy crate.
pub use cache_policy::{BasicLru, Policy, TwoQ};
