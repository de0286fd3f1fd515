//! A pooled byte-buffer lease for payloads that cross thread
//! boundaries: inbound frame payloads, persistence completion
//! payloads, outbound serialized snapshots.
//!
//! Buffers are rented from a [`BytePool`] and returned on every exit
//! path, including an early `drop` — the pool itself tracks
//! outstanding rentals so tests can assert no lease was ever leaked.

use std::sync::{Arc, Mutex};

struct PoolInner {
    free: Vec<Vec<u8>>,
    outstanding: usize,
}

/// A pool of reusable byte buffers. Cheap to clone (an `Arc` handle);
/// all clones share the same backing free list and outstanding count.
#[derive(Clone)]
pub struct BytePool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Default for BytePool {
    fn default() -> Self {
        Self::new()
    }
}

impl BytePool {
    /// Create an empty pool; buffers are allocated on first rent and
    /// reused afterward.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::new(),
                outstanding: 0,
            })),
        }
    }

    /// Rent a buffer with at least `capacity` bytes, copying `data`
    /// into it. Reuses a freed buffer when one of sufficient capacity
    /// is available.
    pub fn rent(&self, data: &[u8]) -> PooledLease {
        let mut buf = {
            let mut guard = self.inner.lock().expect("byte pool mutex poisoned");
            guard.outstanding += 1;
            match guard.free.iter().position(|b| b.capacity() >= data.len()) {
                Some(idx) => guard.free.swap_remove(idx),
                None => Vec::with_capacity(data.len()),
            }
        };
        buf.clear();
        buf.extend_from_slice(data);
        PooledLease {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }

    /// Number of leases rented but not yet disposed. Used by tests to
    /// assert every `rent` was eventually released.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().expect("byte pool mutex poisoned").outstanding
    }
}

/// A byte buffer rented from a [`BytePool`]. Returns its backing
/// storage to the pool on drop, so it is safe to let a lease fall out
/// of scope on any exit path (including an early `return` or a panic
/// unwind) without leaking the allocation or the outstanding count.
pub struct PooledLease {
    buf: Option<Vec<u8>>,
    pool: Arc<Mutex<PoolInner>>,
}

impl PooledLease {
    /// Borrow the leased bytes.
    pub fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Number of bytes held by this lease.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether this lease holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Explicitly release this lease back to its pool. Equivalent to
    /// dropping it, but makes disposal visible at call sites that want
    /// to document the release point.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for PooledLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut guard = self.pool.lock().expect("byte pool mutex poisoned");
            guard.outstanding -= 1;
            guard.free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_and_dispose_tracks_outstanding() {
        let pool = BytePool::new();
        assert_eq!(pool.outstanding(), 0);
        let lease = pool.rent(b"hello");
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(lease.bytes(), b"hello");
        lease.dispose();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn dropping_without_explicit_dispose_still_releases() {
        let pool = BytePool::new();
        {
            let _lease = pool.rent(b"x");
            assert_eq!(pool.outstanding(), 1);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn buffers_are_reused_after_release() {
        let pool = BytePool::new();
        let a = pool.rent(b"0123456789");
        a.dispose();
        let b = pool.rent(b"ab");
        assert_eq!(b.bytes(), b"ab");
        // Pool should not have grown beyond one backing buffer.
        assert_eq!(
            pool.inner.lock().unwrap().free.len() + pool.outstanding(),
            1
        );
    }
}
