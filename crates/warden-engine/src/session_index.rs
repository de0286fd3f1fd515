//! The deterministic active-session index (C1): a sorted array with
//! binary-search insert/remove and a snapshot view that reuses its
//! backing array.

use std::sync::Mutex;

use warden_core::id::SessionId;

struct Inner {
    sorted: Vec<SessionId>,
}

/// A sorted set of currently active session ids. Maintained as a
/// sorted `Vec` rather than a hashed set so iteration order is always
/// ascending session id value, matching the ordering guarantees the
/// simulation core and outbound pump rely on.
pub struct ActiveSessionIndex {
    inner: Mutex<Inner>,
}

impl Default for ActiveSessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveSessionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { sorted: Vec::new() }),
        }
    }

    /// Insert a session id. Returns `false` if it was invalid or
    /// already present.
    pub fn insert(&self, session: SessionId) -> bool {
        if !session.is_valid() {
            return false;
        }
        let mut inner = self.inner.lock().expect("session index mutex poisoned");
        match inner.sorted.binary_search(&session) {
            Ok(_) => false,
            Err(pos) => {
                inner.sorted.insert(pos, session);
                true
            }
        }
    }

    /// Remove a session id. Returns `false` if it was not present.
    pub fn remove(&self, session: SessionId) -> bool {
        let mut inner = self.inner.lock().expect("session index mutex poisoned");
        match inner.sorted.binary_search(&session) {
            Ok(pos) => {
                inner.sorted.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether `session` is currently active.
    pub fn contains(&self, session: SessionId) -> bool {
        let inner = self.inner.lock().expect("session index mutex poisoned");
        inner.sorted.binary_search(&session).is_ok()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("session index mutex poisoned").sorted.len()
    }

    /// Whether the index is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the sorted-ascending backing array. The allocation is
    /// fresh per call (the "pooled backing array" in the data model is
    /// realized by the caller reusing this `Vec`'s capacity across
    /// calls rather than the index itself owning a pool).
    pub fn snapshot(&self) -> Vec<SessionId> {
        self.inner.lock().expect("session index mutex poisoned").sorted.clone()
    }

    /// Empty the index.
    pub fn clear(&self) {
        self.inner.lock().expect("session index mutex poisoned").sorted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let idx = ActiveSessionIndex::new();
        for s in [5, 1, 3] {
            assert!(idx.insert(SessionId(s)));
        }
        assert_eq!(
            idx.snapshot(),
            vec![1, 3, 5].into_iter().map(SessionId).collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let idx = ActiveSessionIndex::new();
        assert!(idx.insert(SessionId(1)));
        assert!(!idx.insert(SessionId(1)));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn invalid_session_is_rejected() {
        let idx = ActiveSessionIndex::new();
        assert!(!idx.insert(SessionId(0)));
    }

    #[test]
    fn remove_missing_returns_false() {
        let idx = ActiveSessionIndex::new();
        idx.insert(SessionId(1));
        assert!(!idx.remove(SessionId(2)));
        assert!(idx.remove(SessionId(1)));
        assert!(idx.is_empty());
    }

    #[test]
    fn contains_reflects_current_state() {
        let idx = ActiveSessionIndex::new();
        idx.insert(SessionId(1));
        assert!(idx.contains(SessionId(1)));
        idx.remove(SessionId(1));
        assert!(!idx.contains(SessionId(1)));
    }
}
