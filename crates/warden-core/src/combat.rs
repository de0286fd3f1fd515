//! Combat event payloads: the fixed-capacity per-tick emission record
//! that the tick thread's combat replication guard consumes.

use crate::id::{AuthoritativeTick, EntityHandle, EventId};

/// A single combat event emitted during a tick. Events carry an
/// optional outcome payload whose interpretation belongs entirely to
/// the gameplay layer above this crate.
#[derive(Clone)]
pub struct CombatEvent {
    /// Unique id for this event, assigned by the emitting subsystem.
    pub event_id: EventId,
    /// Tick this event was emitted during. All events sharing a
    /// buffer must carry the same tick; see
    /// [`crate::error::InvariantViolation`] for how mismatches are
    /// rejected upstream (they are a counted rejection, not fatal).
    pub authoritative_tick: AuthoritativeTick,
    /// Context the event occurred in (e.g. an encounter or zone id),
    /// opaque to this crate.
    pub context_id: i64,
    /// Event type tag, opaque to this crate.
    pub event_type: u32,
    /// Entity the event concerns.
    pub subject: EntityHandle,
    /// Optional serialized outcome payload.
    pub outcome: Option<Vec<u8>>,
}

/// An immutable, tick-tagged batch of combat events produced by
/// draining a combat event buffer.
pub struct CombatEventBatch {
    /// Tick these events were emitted during.
    pub tick: AuthoritativeTick,
    /// Events in emission order.
    pub events: Vec<CombatEvent>,
}
