//! Opaque identifier types shared across the tick runtime.
//!
//! Every id here is a thin newtype over an integer with an explicit
//! validity predicate. None of them implement arithmetic; they exist to
//! stop a raw `i64`/`u128` from being passed where a specific kind of
//! identifier is expected.

use std::fmt;

use crate::error::InvariantViolation;

/// Opaque entity identifier. Valid iff strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(pub i64);

impl EntityHandle {
    /// Whether this handle may be registered or iterated. Zero and
    /// negative values are reserved as sentinels by callers above this
    /// crate and are never valid entities.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Opaque zone identifier. Valid iff strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(pub i64);

impl ZoneId {
    /// Whether this id may be used to address a zone bucket.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone:{}", self.0)
    }
}

/// Opaque 128-bit session identifier. Server-issued only; valid iff
/// non-zero. A session id with all bits zero is the canonical "not a
/// session" sentinel and must never be accepted from a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u128);

impl SessionId {
    /// `valid ⇔ non-zero bits`, per the data model contract.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{:#034x}", self.0)
    }
}

/// Opaque 128-bit player identifier, distinct from [`SessionId`]: a
/// player persists across sessions, a session does not survive
/// reconnect. Same validity rule as `SessionId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u128);

impl PlayerId {
    /// `valid ⇔ non-zero bits`.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player:{:#034x}", self.0)
    }
}

/// Opaque 128-bit save identifier keying persistence requests and the
/// applier's last-known-state map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SaveId(pub u128);

impl SaveId {
    /// `valid ⇔ non-zero bits`.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "save:{:#034x}", self.0)
    }
}

/// Monotone logical tick index. `i64` so it can run for centuries at
/// 10 Hz without wrapping; never decreases across a single runtime
/// instance's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickId(pub i64);

impl TickId {
    /// The tick immediately following this one.
    pub fn next(self) -> TickId {
        TickId(self.0 + 1)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

impl From<i64> for TickId {
    fn from(value: i64) -> Self {
        TickId(value)
    }
}

/// Narrower tick index carried on combat events. Always derived from a
/// [`TickId`] via a checked conversion, never constructed directly from
/// untrusted input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuthoritativeTick(pub i32);

impl AuthoritativeTick {
    /// Checked narrowing conversion from the engine's monotone
    /// [`TickId`]. Fails fatally rather than wrapping: a wrapped tick
    /// index would let a combat event silently claim the wrong tick.
    pub fn try_from_tick(tick: TickId) -> Result<Self, InvariantViolation> {
        i32::try_from(tick.0)
            .map(AuthoritativeTick)
            .map_err(|_| InvariantViolation::TickIndexOverflow { tick })
    }
}

impl fmt::Display for AuthoritativeTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atick:{}", self.0)
    }
}

/// Opaque identifier for a single combat event, unique within the
/// authoritative tick that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_handle_validity() {
        assert!(EntityHandle(1).is_valid());
        assert!(!EntityHandle(0).is_valid());
        assert!(!EntityHandle(-1).is_valid());
    }

    #[test]
    fn zone_id_validity() {
        assert!(ZoneId(1).is_valid());
        assert!(!ZoneId(0).is_valid());
        assert!(!ZoneId(-5).is_valid());
    }

    #[test]
    fn session_id_validity() {
        assert!(SessionId(1).is_valid());
        assert!(!SessionId(0).is_valid());
    }

    #[test]
    fn player_and_save_id_validity() {
        assert!(PlayerId(42).is_valid());
        assert!(!PlayerId(0).is_valid());
        assert!(SaveId(42).is_valid());
        assert!(!SaveId(0).is_valid());
    }

    #[test]
    fn tick_id_ordering_and_next() {
        assert!(TickId(1) < TickId(2));
        assert_eq!(TickId(5).next(), TickId(6));
    }

    #[test]
    fn authoritative_tick_checked_conversion() {
        assert_eq!(
            AuthoritativeTick::try_from_tick(TickId(10)).unwrap(),
            AuthoritativeTick(10)
        );
        assert_eq!(
            AuthoritativeTick::try_from_tick(TickId(i64::MAX)).unwrap_err(),
            InvariantViolation::TickIndexOverflow {
                tick: TickId(i64::MAX)
            }
        );
    }
}
