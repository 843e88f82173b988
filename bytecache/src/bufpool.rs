//! Process-wide pool of reusable read buffers.
//!
//! Hit-path reads copy the stored value into a pooled `Vec<u8>` instead of a
//! fresh allocation. The vec travels to the caller inside a [`ValueBuf`] and
//! returns to the pool when that is dropped, so release is automatic and
//! happens exactly once. After the drop the bytes must not be assumed stable;
//! the backing storage is handed to the next reader.

use std::io::{self, Write};
use std::mem;
use std::ops::Deref;

use bytes::Bytes;
use parking_lot::Mutex;

/// Most buffers retained by the pool at once.
const MAX_POOLED: usize = 64;

/// Largest buffer capacity worth retaining; bigger ones are freed on return.
const MAX_POOLED_CAPACITY: usize = 4 * 1024 * 1024;

static POOL: Pool = Pool::new();

struct Pool {
    bufs: Mutex<Vec<Vec<u8>>>,
}

impl Pool {
    const fn new() -> Self {
        Self {
            bufs: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<u8> {
        self.bufs.lock().pop().unwrap_or_default()
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut bufs = self.bufs.lock();
        if bufs.len() < MAX_POOLED {
            bufs.push(buf);
        }
    }
}

/// Borrow a buffer from the process-wide pool.
pub(crate) fn take() -> Vec<u8> {
    POOL.take()
}

/// Return a buffer to the process-wide pool.
pub(crate) fn put(buf: Vec<u8>) {
    POOL.put(buf)
}

enum Backing {
    Pooled(Vec<u8>),
    Owned(Bytes),
}

/// A value read from the cache, possibly backed by pooled storage.
///
/// Dereferences to the value bytes. Dropping the buffer releases any pooled
/// backing storage for reuse, so keep it alive for as long as the bytes are
/// needed and no longer.
pub struct ValueBuf {
    backing: Backing,
}

impl ValueBuf {
    /// Wrap a pooled buffer; its storage returns to the pool on drop.
    pub(crate) fn pooled(buf: Vec<u8>) -> Self {
        Self {
            backing: Backing::Pooled(buf),
        }
    }

    /// Wrap bytes that never touch the pool.
    pub(crate) fn owned(value: Bytes) -> Self {
        Self {
            backing: Backing::Owned(value),
        }
    }

    /// The value bytes.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Pooled(buf) => buf,
            Backing::Owned(value) => value,
        }
    }

    /// Write the value to `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let data = self.as_slice();
        writer.write_all(data)?;
        Ok(data.len())
    }
}

impl Deref for ValueBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ValueBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for ValueBuf {
    fn drop(&mut self) {
        if let Backing::Pooled(buf) = mem::replace(&mut self.backing, Backing::Owned(Bytes::new()))
        {
            POOL.put(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_buffers_are_reused() {
        let pool = Pool::new();
        let mut buf = pool.take();
        buf.extend_from_slice(b"warmup");
        let capacity = buf.capacity();
        pool.put(buf);

        let buf = pool.take();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let pool = Pool::new();
        pool.put(Vec::with_capacity(MAX_POOLED_CAPACITY + 1));
        assert_eq!(pool.take().capacity(), 0);
    }

    #[test]
    fn pool_retains_a_bounded_number_of_buffers() {
        let pool = Pool::new();
        for _ in 0..(MAX_POOLED + 8) {
            pool.put(Vec::with_capacity(16));
        }
        assert_eq!(pool.bufs.lock().len(), MAX_POOLED);
    }

    #[test]
    fn value_buf_exposes_pooled_bytes() {
        let mut buf = take();
        buf.extend_from_slice(b"value");
        let value = ValueBuf::pooled(buf);
        assert_eq!(&*value, b"value");
        assert_eq!(value.as_ref(), b"value");
        assert_eq!(value.len(), 5);
    }

    #[test]
    fn value_buf_exposes_owned_bytes() {
        let value = ValueBuf::owned(Bytes::from_static(b"value"));
        assert_eq!(&*value, b"value");
    }

    #[test]
    fn write_to_copies_the_whole_value() {
        let value = ValueBuf::owned(Bytes::from_static(b"test"));
        let mut out = Vec::new();
        let written = value.write_to(&mut out).unwrap();
        assert_eq!(written, 4);
        assert_eq!(out, b"test");
    }
}
