//! Persistent key/value storage backed by redb.
//!
//! One database file per cache, one named table per cache instance. Reads run
//! under a read transaction snapshot; every mutation commits its own write
//! transaction. redb serializes writers internally, so this type is shared
//! freely across threads and the index lock is never held around database
//! calls.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

/// Byte entries persisted for the cache.
pub(crate) struct ByteStore {
    db: Database,
    bucket: String,
}

impl ByteStore {
    /// Open (or create) the database at `path` and ensure the named table
    /// exists.
    pub fn open(path: &Path, bucket: &str) -> Result<Self, redb::Error> {
        let db = Database::create(path)?;
        let store = Self {
            db,
            bucket: bucket.to_string(),
        };
        let wtx = store.db.begin_write()?;
        wtx.open_table(store.table())?;
        wtx.commit()?;
        Ok(store)
    }

    fn table(&self) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
        TableDefinition::new(&self.bucket)
    }

    /// Read the value for `key`, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, redb::Error> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(self.table())?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Read the value for `key` into `buf`, returning whether it was found.
    pub fn read_into(&self, key: &[u8], buf: &mut Vec<u8>) -> Result<bool, redb::Error> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(self.table())?;
        match table.get(key)? {
            Some(guard) => {
                buf.extend_from_slice(guard.value());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write `key -> value`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), redb::Error> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(self.table())?;
            table.insert(key, value)?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// Delete `keys` in a single transaction. Individual failures are
    /// swallowed so a bulk eviction always commits.
    pub fn delete_many(&self, keys: &[Vec<u8>]) -> Result<(), redb::Error> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(self.table())?;
            for key in keys {
                let _ = table.remove(key.as_slice());
            }
        }
        wtx.commit()?;
        Ok(())
    }

    /// Drop and recreate the table, discarding every entry.
    pub fn truncate(&self) -> Result<(), redb::Error> {
        let wtx = self.db.begin_write()?;
        wtx.delete_table(self.table())?;
        wtx.open_table(self.table())?;
        wtx.commit()?;
        Ok(())
    }

    /// Walk every entry inside one write transaction, keeping those for which
    /// `keep` returns `true` and deleting the rest before the commit.
    pub fn retain_entries(
        &self,
        mut keep: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), redb::Error> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(self.table())?;
            let mut doomed = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                if !keep(key.value(), value.value()) {
                    doomed.push(key.value().to_vec());
                }
            }
            for key in &doomed {
                table.remove(key.as_slice())?;
            }
        }
        wtx.commit()?;
        Ok(())
    }
}
