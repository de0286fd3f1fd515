//! Lifecycle mailbox payloads: session/zone teardown operations
//! marshaled onto the tick thread.

use crate::id::{SessionId, ZoneId};

/// A single tagged lifecycle operation. Size accounting for the
/// lifecycle mailbox uses [`LifecycleOp::estimated_bytes`], a fixed
/// per-variant estimate rather than an actual serialized size (these
/// operations never leave process memory).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleOp {
    /// A session's transport connection dropped.
    DisconnectSession(SessionId),
    /// A session should be fully unregistered from server-side state.
    UnregisterSession(SessionId),
    /// A zone's visibility caches should be cleared.
    ClearVisibility(ZoneId),
    /// A zone's replication bookkeeping should be cleaned up.
    CleanupReplication(ZoneId),
}

impl LifecycleOp {
    /// Fixed per-operation byte estimate used for mailbox capacity
    /// accounting; lifecycle operations carry no variable-length
    /// payload so a constant is accurate and avoids a serialization
    /// pass purely to size the mailbox.
    pub fn estimated_bytes(&self) -> usize {
        24
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_bytes_is_constant_across_variants() {
        let ops = [
            LifecycleOp::DisconnectSession(SessionId(1)),
            LifecycleOp::UnregisterSession(SessionId(1)),
            LifecycleOp::ClearVisibility(ZoneId(1)),
            LifecycleOp::CleanupReplication(ZoneId(1)),
        ];
        for op in ops {
            assert_eq!(op.estimated_bytes(), 24);
        }
    }
}
