//! Warden: a server-authoritative deterministic tick runtime for
//! multiplayer game servers.
//!
//! This is the top-level facade crate that re-exports the public API
//! from `warden-core` and `warden-engine`. For most users, adding
//! `warden` as a single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use warden::prelude::*;
//! use warden::types::combat::CombatEvent;
//!
//! struct NoSender;
//! impl CombatSender for NoSender {
//!     fn send(&self, _client: SessionId, _event: &CombatEvent) -> bool { true }
//! }
//! struct NoSink;
//! impl ValidationSink for NoSink {
//!     fn record(&self, _client: SessionId, _event_id: EventId) {}
//! }
//! struct NoSubscribers;
//! impl CombatSubscribers for NoSubscribers {
//!     fn subscribers_for(&self, _event: &CombatEvent) -> Vec<SessionId> { Vec::new() }
//! }
//!
//! let orchestrator = Orchestrator::new(
//!     EngineConfig::default(),
//!     BackpressureConfig::default(),
//! )?;
//! orchestrator.register_core_hooks(Arc::new(NoSender), Arc::new(NoSink), Arc::new(NoSubscribers));
//! assert_eq!(orchestrator.diagnostics().active_sessions, 0);
//! # Ok::<(), ConfigError>(())
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `warden-core` | IDs, errors, effects, traits, frame and combat payloads |
//! | [`engine`] | `warden-engine` | Orchestrator, tick clock, mailboxes, pumps |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`warden-core`).
///
/// Contains opaque identifiers, the error taxonomy, the effect buffer,
/// and the narrow capability traits ([`types::traits::Participant`],
/// [`types::traits::PhaseHook`], [`types::traits::EligibilityGate`]).
pub use warden_core as types;

/// The tick runtime itself (`warden-engine`).
///
/// [`engine::Orchestrator`] is the main entry point: it wires the tick
/// clock, simulation core, mailboxes, and background pumps together.
pub use warden_engine as engine;

/// Common imports for typical Warden usage.
///
/// ```rust
/// use warden::prelude::*;
/// ```
///
/// This imports the most frequently used types: the orchestrator,
/// configuration, core IDs, and the capability traits a gameplay layer
/// implements.
pub mod prelude {
    // Orchestrator and configuration
    pub use warden_engine::{BackpressureConfig, ConfigError, EngineConfig, Orchestrator, OrchestratorDiagnostics};

    // Core IDs
    pub use warden_core::id::{
        AuthoritativeTick, EntityHandle, EventId, PlayerId, SaveId, SessionId, TickId, ZoneId,
    };

    // Errors
    pub use warden_core::error::{InvariantViolation, MailboxError, PersistenceFault};

    // Capability traits
    pub use warden_core::traits::{
        CommandHandler, EligibilityGate, Participant, PhaseHook, RegistrationOrder, TickContext,
    };

    // Off-tick boundary traits
    pub use warden_engine::{CombatSender, CombatSubscribers, PersistenceWriter, TransportSender, ValidationSink};
}
