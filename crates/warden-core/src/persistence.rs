//! Persistence write requests and the completions they produce.

use crate::error::PersistenceFault;
use crate::id::{PlayerId, SaveId};
use crate::pool::PooledLease;

/// A request to persist one save record, enqueued from any thread and
/// drained by an off-tick persistence worker.
pub struct PersistenceWriteRequest {
    /// Save record this write applies to.
    pub save_id: SaveId,
    /// Owning player, for per-player backpressure accounting.
    pub player_id: PlayerId,
    /// Caller-estimated payload size in bytes, used for mailbox
    /// capacity accounting before the payload is touched.
    pub estimated_bytes: usize,
    /// Human-readable label for diagnostics.
    pub label: &'static str,
    /// Serialized payload to persist.
    pub payload: PooledLease,
}

/// Outcome of a single [`PersistenceWriteRequest`], produced by the
/// persistence worker and applied deterministically on the tick
/// thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceStatus {
    /// The backend accepted and durably stored the write.
    Succeeded,
    /// The backend failed the write; see the accompanying reason.
    Failed,
}

/// A completed persistence write, still owning its payload lease
/// until the applier releases it.
pub struct PersistenceCompletion {
    /// Save id the original request was for.
    pub save_id: SaveId,
    /// Owning player.
    pub player_id: PlayerId,
    /// Outcome of the write.
    pub status: PersistenceStatus,
    /// Failure detail, present iff `status == Failed`.
    pub failure: Option<PersistenceFault>,
    /// The request's original payload lease, released once the
    /// applier has recorded this completion.
    pub payload: PooledLease,
}

impl PersistenceCompletion {
    /// Build a succeeded completion.
    pub fn succeeded(save_id: SaveId, player_id: PlayerId, payload: PooledLease) -> Self {
        Self {
            save_id,
            player_id,
            status: PersistenceStatus::Succeeded,
            failure: None,
            payload,
        }
    }

    /// Build a failed completion with a specific fault.
    pub fn failed(
        save_id: SaveId,
        player_id: PlayerId,
        failure: PersistenceFault,
        payload: PooledLease,
    ) -> Self {
        Self {
            save_id,
            player_id,
            status: PersistenceStatus::Failed,
            failure: Some(failure),
            payload,
        }
    }
}
