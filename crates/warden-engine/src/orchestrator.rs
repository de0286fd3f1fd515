//! Server loop orchestrator (C9): wires the tick clock, simulation
//! core, mailboxes, registries, and the inbound/outbound/persistence
//! pumps together, and owns their teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use warden_core::id::{SessionId, TickId, ZoneId};
use warden_core::lifecycle::LifecycleOp;

use crate::combat::{CombatEventBuffer, CombatReplicationHook, CombatSender, CombatSubscribers, DeliveryGuard, ValidationSink};
use crate::config::{BackpressureConfig, EngineConfig};
use crate::inbound::{CommandIngestor, InboundMailbox, InboundPump};
use crate::lifecycle::{LifecycleApplier, LifecycleMailbox};
use crate::outbound::{OutboundPump, OutboundQueues, TransportSender};
use crate::persistence::{
    PersistenceApplier, PersistenceCompletionMailbox, PersistenceWorker, PersistenceWriteMailbox,
    PersistenceWriter,
};
use crate::registry::EntityRegistry;
use crate::scheduler::{TickClock, TickDiagnostics};
use crate::session_index::ActiveSessionIndex;
use crate::thread_guard::capture_tick_thread;
use crate::tick::SimulationCore;

/// Order keys the orchestrator assigns to the hooks it owns, per the
/// component design's "inbound pump earliest, persistence-completion
/// applier early negative" guidance. Application-registered hooks
/// should use keys strictly between `PERSISTENCE_APPLIER` and
/// `INBOUND_PUMP` if they need to run after persistence but before
/// ingestion, or above `INBOUND_PUMP` to run after it.
pub mod order_keys {
    /// Persistence-completion applier: runs before anything else.
    pub const PERSISTENCE_APPLIER: i32 = -1000;
    /// Lifecycle teardown: runs after persistence completions apply,
    /// before ingestion.
    pub const LIFECYCLE_APPLIER: i32 = -500;
    /// Inbound command ingestion: runs after teardown so a
    /// disconnected session's stray frames are dropped, not frozen.
    pub const INBOUND_PUMP: i32 = 0;
    /// Combat replication: drains this tick's combat buffer and
    /// replicates it to subscribers after every other core hook has
    /// had a chance to run.
    pub const COMBAT_REPLICATION: i32 = 500;
}

/// Aggregated diagnostics across every owned subsystem, snapshotted
/// without blocking the tick thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorDiagnostics {
    /// Scheduler-level tick diagnostics.
    pub tick: TickDiagnostics,
    /// Active session count.
    pub active_sessions: usize,
    /// Registered entity count.
    pub registered_entities: usize,
}

/// Owns every long-lived subsystem this runtime needs and their
/// teardown order. Nothing here is process-global; everything is
/// destroyed with the orchestrator.
pub struct Orchestrator {
    config: EngineConfig,
    backpressure: BackpressureConfig,
    clock: Arc<TickClock>,
    core: Arc<SimulationCore>,
    registry: Arc<EntityRegistry>,
    sessions: Arc<ActiveSessionIndex>,
    inbound_mailbox: Arc<InboundMailbox>,
    ingestor: Arc<CommandIngestor>,
    lifecycle_mailbox: Arc<LifecycleMailbox>,
    outbound_queues: Arc<OutboundQueues>,
    persistence_writes: Arc<PersistenceWriteMailbox>,
    persistence_completions: Arc<PersistenceCompletionMailbox>,
    persistence_applier: Arc<PersistenceApplier>,
    combat_buffer: Arc<CombatEventBuffer>,
    delivery_guard: Arc<DeliveryGuard>,
    stop: Arc<AtomicBool>,
    tick_thread: std::sync::Mutex<Option<JoinHandle<()>>>,
    outbound_thread: std::sync::Mutex<Option<JoinHandle<()>>>,
    persistence_thread: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build every subsystem from validated configuration. Does not
    /// spawn any thread; call [`Orchestrator::start`] to begin
    /// ticking.
    pub fn new(
        config: EngineConfig,
        backpressure: BackpressureConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        backpressure.validate()?;
        let interval = config.tick_interval()?;
        let registry = Arc::new(EntityRegistry::new());
        let sessions = Arc::new(ActiveSessionIndex::new());
        let core = Arc::new(SimulationCore::new(
            registry.clone(),
            config.effect_buffer_capacity,
        ));
        let clock = Arc::new(TickClock::new(interval, config.catch_up_cap, config.stall_threshold));
        // Per-session admission is bounded here, not at a transport
        // layer this codebase does not have: each session's own
        // sub-queue is capped independently so one noisy session
        // cannot starve another's frames.
        let inbound_mailbox = Arc::new(InboundMailbox::new(
            backpressure.max_inbound_commands_per_session,
            backpressure.max_queued_bytes_per_session,
        ));
        let ingestor = Arc::new(CommandIngestor::new());
        let lifecycle_mailbox = Arc::new(LifecycleMailbox::new(1024, usize::MAX));
        let outbound_queues = Arc::new(OutboundQueues::new());
        let persistence_writes = Arc::new(PersistenceWriteMailbox::new(
            backpressure.max_persistence_writes_per_player,
            backpressure.max_persistence_write_bytes_per_player,
            backpressure.max_persistence_writes_global,
            backpressure.max_persistence_write_bytes_global,
        ));
        let persistence_completions = Arc::new(PersistenceCompletionMailbox::new(
            backpressure.max_persistence_completions,
            backpressure.max_persistence_completion_bytes,
        ));
        let persistence_applier = Arc::new(PersistenceApplier::new(persistence_completions.clone()));
        let combat_buffer = Arc::new(CombatEventBuffer::new(config.max_combat_events_per_tick));
        let delivery_guard = Arc::new(DeliveryGuard::new(config.max_delivery_guard_entries));

        Ok(Self {
            config,
            backpressure,
            clock,
            core,
            registry,
            sessions,
            inbound_mailbox,
            ingestor,
            lifecycle_mailbox,
            outbound_queues,
            persistence_writes,
            persistence_completions,
            persistence_applier,
            combat_buffer,
            delivery_guard,
            stop: Arc::new(AtomicBool::new(false)),
            tick_thread: std::sync::Mutex::new(None),
            outbound_thread: std::sync::Mutex::new(None),
            persistence_thread: std::sync::Mutex::new(None),
        })
    }

    /// The shared entity registry, for application wiring before
    /// `start`.
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// The shared active-session index.
    pub fn sessions(&self) -> &Arc<ActiveSessionIndex> {
        &self.sessions
    }

    /// The shared simulation core, for participant/hook/gate
    /// registration before `start`.
    pub fn core(&self) -> &Arc<SimulationCore> {
        &self.core
    }

    /// The inbound transport mailbox, for transport threads to enqueue
    /// frames into.
    pub fn inbound_mailbox(&self) -> &Arc<InboundMailbox> {
        &self.inbound_mailbox
    }

    /// The outbound per-session snapshot queues.
    pub fn outbound_queues(&self) -> &Arc<OutboundQueues> {
        &self.outbound_queues
    }

    /// The persistence write mailbox, for enqueueing save requests.
    pub fn persistence_writes(&self) -> &Arc<PersistenceWriteMailbox> {
        &self.persistence_writes
    }

    /// The persistence applier's last-known-state view.
    pub fn persistence_applier(&self) -> &Arc<PersistenceApplier> {
        &self.persistence_applier
    }

    /// The combat event buffer, for gameplay participants to emit
    /// into.
    pub fn combat_buffer(&self) -> &Arc<CombatEventBuffer> {
        &self.combat_buffer
    }

    /// The per-client delivery guard.
    pub fn delivery_guard(&self) -> &Arc<DeliveryGuard> {
        &self.delivery_guard
    }

    /// Register the orchestrator-owned pre-tick hooks (persistence
    /// applier, lifecycle applier, inbound pump, combat replication)
    /// at their well-known order keys. Call once, before `start`.
    /// `combat_sender`/`combat_sink`/`combat_subscribers` are the
    /// application's replication backend and subscriber resolver.
    pub fn register_core_hooks(
        &self,
        combat_sender: Arc<dyn CombatSender>,
        combat_sink: Arc<dyn ValidationSink>,
        combat_subscribers: Arc<dyn CombatSubscribers>,
    ) {
        self.core.register_hook(
            order_keys::PERSISTENCE_APPLIER,
            Box::new(ClonedPersistenceApplier(self.persistence_applier.clone())),
        );
        self.core.register_hook(
            order_keys::LIFECYCLE_APPLIER,
            Box::new(LifecycleApplier::new(
                self.lifecycle_mailbox.clone(),
                self.sessions.clone(),
                self.registry.clone(),
                self.delivery_guard.clone(),
            )),
        );
        self.core.register_hook(
            order_keys::INBOUND_PUMP,
            Box::new(InboundPump::new(
                self.inbound_mailbox.clone(),
                self.ingestor.clone(),
                self.config.max_frames_per_tick,
            )),
        );
        self.core.register_hook(
            order_keys::COMBAT_REPLICATION,
            Box::new(CombatReplicationHook::new(
                self.combat_buffer.clone(),
                self.delivery_guard.clone(),
                combat_sender,
                combat_sink,
                combat_subscribers,
            )),
        );
    }

    /// Start the tick thread, the outbound send pump thread, and one
    /// persistence worker thread. `sender` and `writer` are the
    /// application's transport and persistence backends.
    pub fn start(
        &self,
        sender: Arc<dyn TransportSender>,
        writer: Arc<dyn PersistenceWriter>,
    ) {
        let core = self.core.clone();
        let clock = self.clock.clone();
        let stop_tick = self.stop.clone();
        let tick_handle = std::thread::spawn(move || {
            capture_tick_thread();
            clock.run(
                |n| {
                    let _ = core.execute_tick(TickId(n));
                },
                &stop_tick,
                std::thread::sleep,
                Instant::now,
            );
        });
        *self.tick_thread.lock().expect("tick thread handle mutex poisoned") = Some(tick_handle);

        let outbound_pump = OutboundPump::new(
            self.outbound_queues.clone(),
            self.sessions.clone(),
            sender,
            self.backpressure.max_outbound_snapshots_per_session,
            self.config.max_outbound_per_iteration,
            self.config.worker_idle_delay,
        );
        let stop_outbound = self.stop.clone();
        let outbound_handle = std::thread::spawn(move || {
            outbound_pump.run(&stop_outbound, std::thread::sleep);
        });
        *self
            .outbound_thread
            .lock()
            .expect("outbound thread handle mutex poisoned") = Some(outbound_handle);

        let persistence_worker = PersistenceWorker::new(
            self.persistence_writes.clone(),
            self.persistence_completions.clone(),
            writer,
            self.config.max_persistence_writes_per_iteration,
            self.config.worker_idle_delay,
        );
        let stop_persistence = self.stop.clone();
        let persistence_handle = std::thread::spawn(move || {
            persistence_worker.run(&stop_persistence, std::thread::sleep);
        });
        *self
            .persistence_thread
            .lock()
            .expect("persistence thread handle mutex poisoned") = Some(persistence_handle);
    }

    /// Signal every owned thread to stop at its next boundary and join
    /// them.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in [&self.tick_thread, &self.outbound_thread, &self.persistence_thread] {
            if let Some(h) = handle.lock().expect("thread handle mutex poisoned").take() {
                let _ = h.join();
            }
        }
    }

    /// Queue a session disconnect for the next tick's lifecycle
    /// applier pass.
    pub fn on_session_disconnected(&self, session: SessionId) {
        let _ = self
            .lifecycle_mailbox
            .try_enqueue(LifecycleOp::DisconnectSession(session));
    }

    /// Queue a full session unregistration, as triggered by a player
    /// unload. The persistence last-known-state map is keyed by save
    /// id, not player id, and is left untouched here.
    pub fn on_player_unloaded(&self, session: SessionId) {
        let _ = self
            .lifecycle_mailbox
            .try_enqueue(LifecycleOp::UnregisterSession(session));
    }

    /// Queue a zone unload's visibility and replication teardown.
    pub fn on_zone_unloaded(&self, zone: ZoneId) {
        let _ = self
            .lifecycle_mailbox
            .try_enqueue(LifecycleOp::ClearVisibility(zone));
        let _ = self
            .lifecycle_mailbox
            .try_enqueue(LifecycleOp::CleanupReplication(zone));
    }

    /// Stop every thread and clear all transient state — transport
    /// queues, the command ingestor, the entity registry, the session
    /// index, and persistence completions — in one deterministic
    /// order. No lingering references survive this call.
    pub fn shutdown(&self) {
        self.stop();
        self.inbound_mailbox.clear();
        self.ingestor.clear();
        self.lifecycle_mailbox.clear();
        self.persistence_writes.clear();
        self.persistence_completions.clear();
        self.persistence_applier.clear();
        self.sessions.clear();
        self.registry.clear_all();
    }

    /// Aggregated diagnostics across the owned subsystems.
    pub fn diagnostics(&self) -> OrchestratorDiagnostics {
        OrchestratorDiagnostics {
            tick: self.clock.diagnostics(),
            active_sessions: self.sessions.len(),
            registered_entities: self.registry.len(),
        }
    }
}

/// `PersistenceApplier` is shared (behind an `Arc`) with application
/// code that reads `last_known`, so the hook registered with the
/// simulation core wraps a clone of the `Arc` rather than moving
/// ownership in.
struct ClonedPersistenceApplier(Arc<PersistenceApplier>);

impl warden_core::traits::PhaseHook for ClonedPersistenceApplier {
    fn name(&self) -> &str {
        "persistence-applier"
    }

    fn on_pre_tick(
        &mut self,
        ctx: &mut dyn warden_core::traits::TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        self.0.apply(ctx.tick_index());
        Ok(())
    }

    fn on_post_tick(
        &mut self,
        _ctx: &mut dyn warden_core::traits::TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        Ok(())
    }
}
