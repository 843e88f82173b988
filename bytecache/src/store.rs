//! The remote store: the slow origin behind the cache.

use bytes::Bytes;

use crate::error::CacheError;

/// Rewrites the remote store's outcome before the cache uses it.
///
/// Receives exactly what the store's `get` produced and returns what the
/// cache should treat as the fetch result: the value it returns is what gets
/// cached and handed to every coalesced caller, and an error it returns
/// suppresses caching. Runs under the cache's panic guard.
pub type PostStoreFn = Box<
    dyn Fn(Result<Option<Bytes>, CacheError>) -> Result<Option<Bytes>, CacheError> + Send + Sync,
>;

/// A remote data store the cache reads through to.
///
/// `get` returns `Ok(Some(value))` on success and `Ok(None)` when the key has
/// no value; the cache converts `Ok(None)` (and empty values) into
/// [`CacheError::NoValue`]. Implementations are called from multiple threads,
/// at most once concurrently per key. Panics inside `get` are caught and
/// reported as [`CacheError::Store`].
pub trait Store: Send + Sync {
    /// Open the store. Called once before any `get`.
    fn open(&self) -> Result<(), CacheError>;

    /// Close the store. Called once; no `get` follows.
    fn close(&self) -> Result<(), CacheError>;

    /// Retrieve the value for `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, CacheError>;
}

/// The store used when none is configured: every `get` fails with
/// [`CacheError::NoStore`], so the cache serves local hits only.
#[derive(Debug, Default)]
pub struct NoStore;

impl Store for NoStore {
    fn open(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::NoStore)
    }
}

/// Adapts a closure into a [`Store`] with no-op open/close.
pub struct FnStore<F> {
    get: F,
}

impl<F> FnStore<F>
where
    F: Fn(&[u8]) -> Result<Option<Bytes>, CacheError> + Send + Sync,
{
    /// Wrap `get` as a store.
    pub fn new(get: F) -> Self {
        Self { get }
    }
}

impl<F> Store for FnStore<F>
where
    F: Fn(&[u8]) -> Result<Option<Bytes>, CacheError> + Send + Sync,
{
    fn open(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, CacheError> {
        (self.get)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_store_fails_every_get() {
        let store = NoStore;
        assert!(store.open().is_ok());
        assert_eq!(store.get(b"key"), Err(CacheError::NoStore));
        assert!(store.close().is_ok());
    }

    #[test]
    fn fn_store_delegates_to_the_closure() {
        let store = FnStore::new(|key: &[u8]| {
            assert_eq!(key, b"key");
            Ok(Some(Bytes::from_static(b"value")))
        });
        assert!(store.open().is_ok());
        assert_eq!(
            store.get(b"key").unwrap(),
            Some(Bytes::from_static(b"value"))
        );
        assert!(store.close().is_ok());
    }
}
