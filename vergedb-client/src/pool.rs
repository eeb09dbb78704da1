//! Recyclable encode buffers.

use bytes::BytesMut;
use std::sync::Mutex;

/// Fresh buffers start with at least this much capacity.
const MIN_BUFFER_CAPACITY: usize = 1024;

/// A process-safe pool of reusable byte buffers.
///
/// Callers must release every acquired buffer on all exit paths; a released
/// buffer comes back empty but keeps its capacity.
#[derive(Debug, Default)]
pub struct BufferPool {
    pool: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a pooled buffer, or a fresh one if the pool is empty or
    /// unavailable.
    pub fn acquire(&self) -> BytesMut {
        self.pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_else(|| BytesMut::with_capacity(MIN_BUFFER_CAPACITY))
    }

    /// Resets the buffer and returns it to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_fresh_buffer_capacity() {
        let pool = BufferPool::new();
        let buf = pool.acquire();
        assert!(buf.capacity() >= MIN_BUFFER_CAPACITY);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_release_resets_length() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.put_slice(b"some request bytes");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= MIN_BUFFER_CAPACITY);
    }

    #[test]
    fn test_reuse() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.reserve(4096);
        let reserved = buf.capacity();
        pool.release(buf);

        // The recycled buffer keeps its grown capacity.
        let buf = pool.acquire();
        assert!(buf.capacity() >= reserved);
    }
}
