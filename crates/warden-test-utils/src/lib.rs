//! Test fixtures for warden-engine development.
//!
//! Provides recording implementations of the core capability traits
//! ([`fixtures::RecordingParticipant`], [`fixtures::RecordingHook`],
//! [`fixtures::AlwaysGate`]) and in-memory backends for the off-tick
//! boundaries ([`fixtures::InMemoryTransportSender`],
//! [`fixtures::InMemoryPersistenceWriter`]).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    AlwaysGate, InMemoryPersistenceWriter, InMemoryTransportSender, InMemoryValidationSink,
    NeverGate, NullCommandHandler, RecordingCombatSender, RecordingHook, RecordingParticipant,
    ToggleGate,
};
