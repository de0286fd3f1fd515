//! Reusable fixtures for exercising the tick runtime's capability
//! traits and off-tick boundaries.
//!
//! - [`RecordingParticipant`] — records the entities it was invoked for.
//! - [`RecordingHook`] — records pre/post-tick invocation counts.
//! - [`AlwaysGate`] / [`NeverGate`] / [`ToggleGate`] — fixed or flippable
//!   eligibility gates.
//! - [`NullCommandHandler`] — accepts and discards every command.
//! - [`InMemoryTransportSender`] / [`InMemoryPersistenceWriter`] /
//!   [`InMemoryValidationSink`] / [`RecordingCombatSender`] — in-memory
//!   stand-ins for the off-tick boundaries, for assembling an
//!   end-to-end orchestrator in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use warden_core::error::{InvariantViolation, PersistenceFault};
use warden_core::id::{EntityHandle, EventId, SaveId, SessionId};
use warden_core::pool::PooledLease;
use warden_core::traits::{CommandHandler, EligibilityGate, Participant, PhaseHook, TickContext};
use warden_engine::combat::{CombatSender, ValidationSink};
use warden_engine::outbound::TransportSender;
use warden_engine::persistence::PersistenceWriter;

/// Participant that records every entity it was invoked for, in
/// invocation order, and counts its executions.
pub struct RecordingParticipant {
    name: &'static str,
    seen: Mutex<Vec<EntityHandle>>,
    calls: AtomicUsize,
}

impl RecordingParticipant {
    /// Build a participant with a diagnostic name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Entities this participant has been invoked for, in order.
    pub fn seen(&self) -> Vec<EntityHandle> {
        self.seen.lock().expect("recording participant mutex poisoned").clone()
    }

    /// Number of times `execute` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Participant for RecordingParticipant {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&mut self, entity: EntityHandle, _ctx: &mut dyn TickContext) -> Result<(), InvariantViolation> {
        self.seen.lock().expect("recording participant mutex poisoned").push(entity);
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Phase hook that counts its pre-tick and post-tick invocations and
/// records the eligible set each was called with.
pub struct RecordingHook {
    name: &'static str,
    pre_calls: AtomicUsize,
    post_calls: AtomicUsize,
    last_pre_eligible: Mutex<Vec<EntityHandle>>,
    last_post_eligible: Mutex<Vec<EntityHandle>>,
}

impl RecordingHook {
    /// Build a hook with a diagnostic name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pre_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
            last_pre_eligible: Mutex::new(Vec::new()),
            last_post_eligible: Mutex::new(Vec::new()),
        }
    }

    /// Number of `on_pre_tick` invocations so far.
    pub fn pre_calls(&self) -> usize {
        self.pre_calls.load(Ordering::Relaxed)
    }

    /// Number of `on_post_tick` invocations so far.
    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::Relaxed)
    }

    /// The eligible set passed to the most recent `on_post_tick` call.
    pub fn last_post_eligible(&self) -> Vec<EntityHandle> {
        self.last_post_eligible
            .lock()
            .expect("recording hook mutex poisoned")
            .clone()
    }
}

impl PhaseHook for RecordingHook {
    fn name(&self) -> &str {
        self.name
    }

    fn on_pre_tick(&mut self, _ctx: &mut dyn TickContext, eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        self.pre_calls.fetch_add(1, Ordering::Relaxed);
        *self.last_pre_eligible.lock().expect("recording hook mutex poisoned") = eligible.to_vec();
        Ok(())
    }

    fn on_post_tick(&mut self, _ctx: &mut dyn TickContext, eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        self.post_calls.fetch_add(1, Ordering::Relaxed);
        *self.last_post_eligible.lock().expect("recording hook mutex poisoned") = eligible.to_vec();
        Ok(())
    }
}

/// Gate under which every entity is eligible.
pub struct AlwaysGate;

impl EligibilityGate for AlwaysGate {
    fn name(&self) -> &str {
        "always-gate"
    }

    fn is_eligible(&self, _entity: EntityHandle) -> bool {
        true
    }
}

/// Gate under which no entity is eligible.
pub struct NeverGate;

impl EligibilityGate for NeverGate {
    fn name(&self) -> &str {
        "never-gate"
    }

    fn is_eligible(&self, _entity: EntityHandle) -> bool {
        false
    }
}

/// Gate whose verdict can be flipped between ticks, for exercising the
/// mid-tick eligibility stability check.
pub struct ToggleGate {
    eligible: AtomicBool,
}

impl ToggleGate {
    /// Build a gate starting in the given state.
    pub fn new(initially_eligible: bool) -> Self {
        Self {
            eligible: AtomicBool::new(initially_eligible),
        }
    }

    /// Flip the gate's verdict for every entity.
    pub fn flip(&self) {
        let current = self.eligible.load(Ordering::Relaxed);
        self.eligible.store(!current, Ordering::Relaxed);
    }

    /// Force the gate to a specific verdict.
    pub fn set(&self, eligible: bool) {
        self.eligible.store(eligible, Ordering::Relaxed);
    }
}

impl EligibilityGate for ToggleGate {
    fn name(&self) -> &str {
        "toggle-gate"
    }

    fn is_eligible(&self, _entity: EntityHandle) -> bool {
        self.eligible.load(Ordering::Relaxed)
    }
}

/// Command handler that accepts and discards every command, counting
/// how many it has seen.
pub struct NullCommandHandler {
    calls: AtomicUsize,
}

impl NullCommandHandler {
    /// Build an empty handler.
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of commands handled so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for NullCommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for NullCommandHandler {
    fn name(&self) -> &str {
        "null-command-handler"
    }

    fn handle(
        &mut self,
        _command_type: u32,
        _payload: &[u8],
        _session_id: SessionId,
        _ctx: &mut dyn TickContext,
    ) -> Result<(), InvariantViolation> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// In-memory [`TransportSender`] recording every payload it was asked
/// to deliver. `fail_next` forces the next `send` call to return the
/// payload back to the caller, for exercising drop-counter paths.
pub struct InMemoryTransportSender {
    delivered: Mutex<Vec<(SessionId, Vec<u8>)>>,
    fail_next: AtomicBool,
}

impl InMemoryTransportSender {
    /// Build an empty sender.
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Force the next `send` call to fail.
    pub fn fail_next_send(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }

    /// Snapshots of every payload delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<(SessionId, Vec<u8>)> {
        self.delivered.lock().expect("transport sender mutex poisoned").clone()
    }
}

impl Default for InMemoryTransportSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSender for InMemoryTransportSender {
    fn send(&self, session_id: SessionId, payload: PooledLease) -> Result<(), PooledLease> {
        if self.fail_next.swap(false, Ordering::Relaxed) {
            return Err(payload);
        }
        self.delivered
            .lock()
            .expect("transport sender mutex poisoned")
            .push((session_id, payload.bytes().to_vec()));
        Ok(())
    }
}

/// In-memory [`PersistenceWriter`] recording every write and able to
/// be configured to fail for a specific save id.
pub struct InMemoryPersistenceWriter {
    writes: Mutex<Vec<(SaveId, Vec<u8>)>>,
    fail_save: Mutex<Option<SaveId>>,
}

impl InMemoryPersistenceWriter {
    /// Build a writer that always succeeds until configured otherwise.
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail_save: Mutex::new(None),
        }
    }

    /// Make the next write for `save_id` fail.
    pub fn fail_next_write_for(&self, save_id: SaveId) {
        *self.fail_save.lock().expect("persistence writer mutex poisoned") = Some(save_id);
    }

    /// Writes accepted so far, in order.
    pub fn writes(&self) -> Vec<(SaveId, Vec<u8>)> {
        self.writes.lock().expect("persistence writer mutex poisoned").clone()
    }
}

impl Default for InMemoryPersistenceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceWriter for InMemoryPersistenceWriter {
    fn write(&self, save_id: SaveId, payload: &[u8]) -> Result<(), PersistenceFault> {
        let mut fail_save = self.fail_save.lock().expect("persistence writer mutex poisoned");
        if *fail_save == Some(save_id) {
            *fail_save = None;
            return Err(PersistenceFault::WriterFailed {
                reason: "configured test failure".into(),
            });
        }
        self.writes
            .lock()
            .expect("persistence writer mutex poisoned")
            .push((save_id, payload.to_vec()));
        Ok(())
    }
}

/// In-memory [`CombatSender`] recording every event it was asked to
/// deliver.
pub struct RecordingCombatSender {
    sent: Mutex<Vec<(SessionId, EventId)>>,
}

impl RecordingCombatSender {
    /// Build an empty sender.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Events sent so far, in order.
    pub fn sent(&self) -> Vec<(SessionId, EventId)> {
        self.sent.lock().expect("combat sender mutex poisoned").clone()
    }
}

impl Default for RecordingCombatSender {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatSender for RecordingCombatSender {
    fn send(&self, client: SessionId, event: &warden_core::combat::CombatEvent) -> bool {
        self.sent.lock().expect("combat sender mutex poisoned").push((client, event.event_id));
        true
    }
}

/// In-memory [`ValidationSink`] recording every delivery it was told
/// about.
pub struct InMemoryValidationSink {
    recorded: Mutex<Vec<(SessionId, EventId)>>,
}

impl InMemoryValidationSink {
    /// Build an empty sink.
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Deliveries recorded so far, in order.
    pub fn recorded(&self) -> Vec<(SessionId, EventId)> {
        self.recorded.lock().expect("validation sink mutex poisoned").clone()
    }
}

impl Default for InMemoryValidationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationSink for InMemoryValidationSink {
    fn record(&self, client: SessionId, event_id: EventId) {
        self.recorded.lock().expect("validation sink mutex poisoned").push((client, event_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_gate_flips() {
        let gate = ToggleGate::new(true);
        assert!(gate.is_eligible(EntityHandle(1)));
        gate.flip();
        assert!(!gate.is_eligible(EntityHandle(1)));
    }

    #[test]
    fn transport_sender_records_and_can_fail() {
        let pool = warden_core::pool::BytePool::new();
        let sender = InMemoryTransportSender::new();
        sender.send(SessionId(1), pool.rent(b"hi")).unwrap();
        assert_eq!(sender.delivered().len(), 1);
        sender.fail_next_send();
        assert!(sender.send(SessionId(1), pool.rent(b"bye")).is_err());
    }

    #[test]
    fn persistence_writer_can_fail_once() {
        let writer = InMemoryPersistenceWriter::new();
        writer.fail_next_write_for(SaveId(7));
        assert!(writer.write(SaveId(7), b"x").is_err());
        assert!(writer.write(SaveId(7), b"x").is_ok());
        assert_eq!(writer.writes().len(), 1);
    }
}
