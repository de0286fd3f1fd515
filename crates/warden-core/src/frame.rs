//! Inbound transport frames and the per-session frozen command batch
//! they are assembled into once per tick.

use crate::id::{SessionId, TickId};
use crate::pool::PooledLease;

/// A single inbound command frame as received from the transport
/// layer, still addressed to a session and not yet validated or
/// interpreted by gameplay code.
pub struct InboundFrame {
    /// Session the frame was submitted by.
    pub session_id: SessionId,
    /// Opaque payload bytes, leased from the transport's byte pool.
    pub payload: PooledLease,
    /// Transport-level command type tag; gameplay-specific meaning is
    /// opaque to this crate.
    pub command_type: u32,
    /// Tick the frame was submitted during, as observed by the
    /// transport thread. Used only for diagnostics; the authoritative
    /// tick a frame is processed in is whichever tick's pre-tick pump
    /// actually drains it.
    pub submit_tick: TickId,
}

impl InboundFrame {
    /// Estimated mailbox footprint: payload bytes plus a fixed
    /// per-frame overhead for the envelope fields.
    pub fn estimated_bytes(&self) -> usize {
        self.payload.len() + 32
    }
}

/// A single decoded command bound to the session that submitted it,
/// as stored in a [`FrozenCommandBatch`].
pub struct SessionCommand {
    /// Opaque payload bytes for this command.
    pub payload: PooledLease,
    /// Transport-level command type tag.
    pub command_type: u32,
}

/// An immutable view over one session's commands, captured at the
/// start of a tick and tagged with that tick's index.
///
/// Querying a batch during any tick other than the one it was frozen
/// for is a programmer error (`InvariantViolation::FrozenBatchTickMismatch`);
/// see [`FrozenCommandBatch::commands_for`].
pub struct FrozenCommandBatch {
    tick: TickId,
    session_id: SessionId,
    commands: Vec<SessionCommand>,
}

impl FrozenCommandBatch {
    /// Freeze a batch of commands for `session_id` at `tick`.
    pub fn new(tick: TickId, session_id: SessionId, commands: Vec<SessionCommand>) -> Self {
        Self {
            tick,
            session_id,
            commands,
        }
    }

    /// The tick this batch was frozen for.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// The session this batch belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Access the frozen commands, provided `current_tick` matches the
    /// tick this batch was frozen for. Returns `Err` (an invariant
    /// violation in all but test contexts) if the caller is reusing a
    /// stale batch across a tick boundary.
    pub fn commands_for(&self, current_tick: TickId) -> Result<&[SessionCommand], (TickId, TickId)> {
        if current_tick == self.tick {
            Ok(&self.commands)
        } else {
            Err((self.tick, current_tick))
        }
    }
}
