//! Core types and traits for the deterministic tick runtime.
//!
//! This is the leaf crate with zero internal workspace dependencies.
//! It defines the fundamental abstractions shared between the engine
//! crate and any gameplay collaborator wired into it: opaque id
//! types, mailbox payload types, the tick-scoped effect buffer, the
//! three error kinds, and the narrow capability traits participants,
//! hooks, gates, and command handlers implement.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod combat;
pub mod effect;
pub mod error;
pub mod frame;
pub mod id;
pub mod lifecycle;
pub mod persistence;
pub mod pool;
pub mod traits;

pub use combat::{CombatEvent, CombatEventBatch};
pub use effect::{EffectBuffer, EffectCommand};
pub use error::{InvariantViolation, MailboxError, PersistenceFault};
pub use frame::{FrozenCommandBatch, InboundFrame, SessionCommand};
pub use id::{AuthoritativeTick, EntityHandle, EventId, PlayerId, SaveId, SessionId, TickId, ZoneId};
pub use lifecycle::LifecycleOp;
pub use persistence::{PersistenceCompletion, PersistenceStatus, PersistenceWriteRequest};
pub use pool::{BytePool, PooledLease};
pub use traits::{CommandHandler, EligibilityGate, Participant, PhaseHook, RegistrationOrder, TickContext};
