//! Server-authoritative tick runtime for Warden game servers.
//!
//! Provides [`Orchestrator`] as the primary entry point wiring a fixed-cadence
//! [`TickClock`] to a [`SimulationCore`], the inbound command pump, the
//! outbound send pump, the persistence worker, and the combat replication
//! guard into a single running server loop.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod combat;
pub mod config;
pub mod inbound;
pub mod lifecycle;
pub mod mailbox;
pub mod orchestrator;
pub mod outbound;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod session_index;
pub mod thread_guard;
pub mod tick;

pub use combat::{
    CombatEventBuffer, CombatReplicationHook, CombatSender, CombatSubscribers, DeliveryGuard,
    EmitOutcome, GuardDecision, ValidationSink,
};
pub use config::{BackpressureConfig, ConfigError, EngineConfig};
pub use inbound::{CommandIngestor, InboundMailbox, InboundPump};
pub use lifecycle::{LifecycleApplier, LifecycleMailbox};
pub use mailbox::{BoundedMailbox, MailboxItem, MailboxMetrics};
pub use orchestrator::{Orchestrator, OrchestratorDiagnostics};
pub use outbound::{OutboundMetrics, OutboundPump, OutboundQueues, OutboundSnapshot, TransportSender};
pub use persistence::{
    PersistenceApplier, PersistenceCompletionMailbox, PersistenceWorker, PersistenceWriteMailbox,
    PersistenceWriter, SaveOutcome,
};
pub use registry::EntityRegistry;
pub use scheduler::{TickClock, TickDiagnostics};
pub use session_index::ActiveSessionIndex;
pub use tick::{SimulationCore, TickReceipt};
