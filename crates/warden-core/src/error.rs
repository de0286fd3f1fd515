//! Error types for the tick runtime, grouped by the three kinds of
//! condition the runtime recognizes: expected runtime failures,
//! invariant violations, and external backend faults. See the crate
//! documentation for which kind applies where.

use std::fmt;

use crate::id::TickId;

/// A programmer-error condition that aborts the current tick. These
/// should never occur in a correctly written participant, hook, or
/// gate; when one does occur the tick's effect buffer is discarded and
/// no partial recovery is attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An entity's eligibility differed between the pre-execution
    /// gating pass and the post-execution stability check.
    MidTickEligibilityChange {
        /// Entity whose eligibility moved.
        entity: i64,
    },
    /// A frozen command batch was queried during a tick other than
    /// the one it was captured for.
    FrozenBatchTickMismatch {
        /// Tick the batch was frozen for.
        expected: TickId,
        /// Tick the batch was queried during.
        actual: TickId,
    },
    /// An individual buffered effect failed during commit. The effect
    /// contract requires commits to be infallible at the boundary
    /// they touch; a failure here means that contract was broken.
    EffectCommitFailed {
        /// The effect's label, for diagnosis.
        label: &'static str,
    },
    /// A participant attempted to buffer more effects than the
    /// configured effect buffer capacity in a single tick.
    EffectBufferOverflow {
        /// Configured capacity that was exceeded.
        capacity: usize,
    },
    /// A tick-only operation was invoked from a thread other than the
    /// tick thread.
    OffTickThreadAccess,
    /// The monotone tick index could not be narrowed to an
    /// [`crate::id::AuthoritativeTick`] without truncation.
    TickIndexOverflow {
        /// The tick index that overflowed `i32`.
        tick: TickId,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MidTickEligibilityChange { entity } => {
                write!(f, "entity {entity} changed eligibility mid-tick")
            }
            Self::FrozenBatchTickMismatch { expected, actual } => {
                write!(
                    f,
                    "frozen command batch for {expected} queried during {actual}"
                )
            }
            Self::EffectCommitFailed { label } => {
                write!(f, "effect commit failed: {label}")
            }
            Self::EffectBufferOverflow { capacity } => {
                write!(f, "effect buffer exceeded capacity {capacity}")
            }
            Self::OffTickThreadAccess => {
                write!(f, "tick-only operation invoked off the tick thread")
            }
            Self::TickIndexOverflow { tick } => {
                write!(f, "tick index {tick} does not fit in an authoritative tick")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// An expected, recoverable failure at a mailbox boundary. Always
/// accompanied by an incremented drop counter so the failure is
/// observable even though it is not fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxError {
    /// A single item exceeded the mailbox's maximum item size and was
    /// rejected without being enqueued.
    Oversized {
        /// Size of the rejected item, in bytes.
        item_bytes: usize,
        /// Configured maximum item size, in bytes.
        max_bytes: usize,
    },
    /// The mailbox has been closed (orchestrator teardown) and no
    /// longer accepts new items.
    Closed,
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized {
                item_bytes,
                max_bytes,
            } => write!(
                f,
                "item of {item_bytes} bytes exceeds mailbox max of {max_bytes} bytes"
            ),
            Self::Closed => write!(f, "mailbox is closed"),
        }
    }
}

impl std::error::Error for MailboxError {}

/// A fault surfaced by an external backend (persistence writer,
/// transport sender) at the boundary of an off-tick worker. Never
/// propagates to the tick thread; always translated into a completion
/// or a drop counter instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceFault {
    /// The writer reported a specific failure reason.
    WriterFailed {
        /// Backend-reported reason string.
        reason: String,
    },
    /// The writer failed without a specific reason (panic caught at
    /// the worker boundary, or an opaque backend error).
    Unknown,
}

impl fmt::Display for PersistenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriterFailed { reason } => write!(f, "persistence writer failed: {reason}"),
            Self::Unknown => write!(f, "persistence writer failed for an unknown reason"),
        }
    }
}

impl std::error::Error for PersistenceFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violation_display_is_stable() {
        let v = InvariantViolation::MidTickEligibilityChange { entity: 7 };
        assert_eq!(v.to_string(), "entity 7 changed eligibility mid-tick");
    }

    #[test]
    fn mailbox_error_display() {
        let e = MailboxError::Oversized {
            item_bytes: 10,
            max_bytes: 4,
        };
        assert_eq!(
            e.to_string(),
            "item of 10 bytes exceeds mailbox max of 4 bytes"
        );
        assert_eq!(MailboxError::Closed.to_string(), "mailbox is closed");
    }

    #[test]
    fn persistence_fault_display() {
        let f = PersistenceFault::WriterFailed {
            reason: "disk full".into(),
        };
        assert_eq!(f.to_string(), "persistence writer failed: disk full");
        assert_eq!(
            PersistenceFault::Unknown.to_string(),
            "persistence writer failed for an unknown reason"
        );
    }
}
