//! The simulation core (C4): the strictly ordered per-tick phase
//! pipeline, participant/hook/gate registration, and the invariants
//! that forbid mid-tick mutation of eligibility.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use warden_core::effect::{EffectBuffer, EffectCommand};
use warden_core::error::InvariantViolation;
use warden_core::id::{EntityHandle, TickId};
use warden_core::traits::{EligibilityGate, Participant, PhaseHook, RegistrationOrder, TickContext};

use crate::registry::EntityRegistry;
use crate::thread_guard::assert_tick_thread;

/// Fixed per-tick step, per the external interface contract.
pub const FIXED_DELTA: Duration = Duration::from_millis(100);

struct TickCtx<'a> {
    tick: TickId,
    effects: &'a mut EffectBuffer,
}

impl TickContext for TickCtx<'_> {
    fn tick_index(&self) -> TickId {
        self.tick
    }

    fn fixed_delta(&self) -> Duration {
        FIXED_DELTA
    }

    fn buffer_effect(&mut self, effect: EffectCommand) -> Result<(), InvariantViolation> {
        self.effects.buffer(effect)
    }
}

/// Outcome of one successfully executed tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReceipt {
    /// The tick that ran.
    pub tick: TickId,
    /// Number of entities eligible this tick.
    pub eligible_count: usize,
    /// Number of effects committed this tick.
    pub effects_committed: usize,
}

struct Registered<T: ?Sized> {
    order: RegistrationOrder,
    value: Box<T>,
}

/// Owns participant/hook/gate registrations and drives the six-phase
/// tick pipeline. Registration is accepted from any thread;
/// `execute_tick` is tick-thread-exclusive.
pub struct SimulationCore {
    registry: std::sync::Arc<EntityRegistry>,
    participants: Mutex<Vec<Registered<dyn Participant>>>,
    hooks: Mutex<Vec<Registered<dyn PhaseHook>>>,
    gates: Mutex<Vec<Box<dyn EligibilityGate>>>,
    registration_seq: AtomicU64,
    effects: Mutex<EffectBuffer>,
}

impl SimulationCore {
    /// Create a simulation core over a shared entity registry, with an
    /// effect buffer sized to `effect_buffer_capacity`.
    pub fn new(registry: std::sync::Arc<EntityRegistry>, effect_buffer_capacity: usize) -> Self {
        Self {
            registry,
            participants: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            gates: Mutex::new(Vec::new()),
            registration_seq: AtomicU64::new(0),
            effects: Mutex::new(EffectBuffer::with_capacity(effect_buffer_capacity)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.registration_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a participant at `order_key`. Ties broken by
    /// registration order.
    pub fn register_participant(&self, order_key: i32, participant: Box<dyn Participant>) {
        let order = RegistrationOrder {
            order_key,
            registration_seq: self.next_seq(),
        };
        let mut guard = self.participants.lock().expect("participants mutex poisoned");
        guard.push(Registered {
            order,
            value: participant,
        });
        guard.sort_by_key(|r| r.order);
    }

    /// Register a phase hook at `order_key`.
    pub fn register_hook(&self, order_key: i32, hook: Box<dyn PhaseHook>) {
        let order = RegistrationOrder {
            order_key,
            registration_seq: self.next_seq(),
        };
        let mut guard = self.hooks.lock().expect("hooks mutex poisoned");
        guard.push(Registered { order, value: hook });
        guard.sort_by_key(|r| r.order);
    }

    /// Register an eligibility gate. Gate evaluation order does not
    /// affect the result (eligibility is the AND of all gates) but
    /// gates run in registration order for deterministic diagnostics.
    pub fn register_gate(&self, gate: Box<dyn EligibilityGate>) {
        self.gates.lock().expect("gates mutex poisoned").push(gate);
    }

    fn eligible_set(&self, entities: &[EntityHandle]) -> Vec<EntityHandle> {
        let gates = self.gates.lock().expect("gates mutex poisoned");
        entities
            .iter()
            .copied()
            .filter(|&e| gates.iter().all(|g| g.is_eligible(e)))
            .collect()
    }

    /// Run one full tick: pre-tick hooks, gating, ordered participant
    /// execution, stability re-check, effect commit, post-tick hooks.
    /// Tick-thread-exclusive.
    pub fn execute_tick(&self, tick: TickId) -> Result<TickReceipt, InvariantViolation> {
        assert_tick_thread()?;

        let mut effects = self.effects.lock().expect("effects mutex poisoned");

        {
            let mut ctx = TickCtx {
                tick,
                effects: &mut effects,
            };
            for hook in self.hooks.lock().expect("hooks mutex poisoned").iter_mut() {
                if let Err(err) = hook.value.on_pre_tick(&mut ctx, &[]) {
                    effects.discard();
                    return Err(err);
                }
            }
        }

        let entities = self.registry.sorted_snapshot();
        let eligible_pre = self.eligible_set(&entities);

        {
            let mut participants = self.participants.lock().expect("participants mutex poisoned");
            let mut ctx = TickCtx {
                tick,
                effects: &mut effects,
            };
            for participant in participants.iter_mut() {
                for &entity in &eligible_pre {
                    if let Err(err) = participant.value.execute(entity, &mut ctx) {
                        effects.discard();
                        return Err(err);
                    }
                }
            }
        }

        let eligible_post = self.eligible_set(&entities);
        if eligible_pre != eligible_post {
            let entity = eligible_pre
                .iter()
                .copied()
                .chain(eligible_post.iter().copied())
                .find(|e| eligible_pre.contains(e) != eligible_post.contains(e))
                .unwrap_or(EntityHandle(0));
            effects.discard();
            return Err(InvariantViolation::MidTickEligibilityChange {
                entity: entity.0,
            });
        }

        let effects_committed = effects.len();
        effects.commit_all()?;

        {
            let mut ctx = TickCtx {
                tick,
                effects: &mut effects,
            };
            for hook in self.hooks.lock().expect("hooks mutex poisoned").iter_mut() {
                hook.value.on_post_tick(&mut ctx, &eligible_post)?;
            }
        }

        Ok(TickReceipt {
            tick,
            eligible_count: eligible_post.len(),
            effects_committed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use warden_core::id::ZoneId;

    struct TraceParticipant {
        tag: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }
    impl Participant for TraceParticipant {
        fn name(&self) -> &str {
            self.tag
        }
        fn execute(&mut self, entity: EntityHandle, _ctx: &mut dyn TickContext) -> Result<(), InvariantViolation> {
            self.trace
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, entity.0));
            Ok(())
        }
    }

    struct TraceHook {
        trace: Arc<Mutex<Vec<String>>>,
        label: &'static str,
    }
    impl PhaseHook for TraceHook {
        fn name(&self) -> &str {
            "trace-hook"
        }
        fn on_pre_tick(&mut self, _ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
            self.trace.lock().unwrap().push(format!("{}:pre", self.label));
            Ok(())
        }
        fn on_post_tick(&mut self, _ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
            self.trace.lock().unwrap().push(format!("{}:post", self.label));
            Ok(())
        }
    }

    struct AlwaysGate;
    impl EligibilityGate for AlwaysGate {
        fn name(&self) -> &str {
            "always"
        }
        fn is_eligible(&self, _entity: EntityHandle) -> bool {
            true
        }
    }

    struct OnlyGate(i64);
    impl EligibilityGate for OnlyGate {
        fn name(&self) -> &str {
            "only"
        }
        fn is_eligible(&self, entity: EntityHandle) -> bool {
            entity.0 == self.0
        }
    }

    fn core_with_entities(entities: &[i64]) -> SimulationCore {
        let registry = Arc::new(EntityRegistry::new());
        for &e in entities {
            registry.register(EntityHandle(e), ZoneId(1));
        }
        SimulationCore::new(registry, 64)
    }

    #[test]
    fn phases_execute_in_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let core = core_with_entities(&[1]);
        core.register_gate(Box::new(AlwaysGate));
        core.register_hook(
            0,
            Box::new(TraceHook {
                trace: trace.clone(),
                label: "h",
            }),
        );
        core.register_participant(
            0,
            Box::new(TraceParticipant {
                tag: "p",
                trace: trace.clone(),
            }),
        );
        core.execute_tick(TickId(1)).unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["h:pre", "p:1", "h:post"]);
    }

    #[test]
    fn deterministic_execution_order_across_runs() {
        for _ in 0..2 {
            let trace = Arc::new(Mutex::new(Vec::new()));
            let core = core_with_entities(&[20, 10]);
            core.register_gate(Box::new(AlwaysGate));
            core.register_participant(
                1,
                Box::new(TraceParticipant {
                    tag: "p1",
                    trace: trace.clone(),
                }),
            );
            core.register_participant(
                2,
                Box::new(TraceParticipant {
                    tag: "p2",
                    trace: trace.clone(),
                }),
            );
            core.execute_tick(TickId(1)).unwrap();
            assert_eq!(
                *trace.lock().unwrap(),
                vec!["p1:10", "p1:20", "p2:10", "p2:20"]
            );
        }
    }

    #[test]
    fn non_eligible_entities_are_excluded() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let core = core_with_entities(&[100, 200]);
        core.register_gate(Box::new(OnlyGate(100)));
        core.register_participant(
            0,
            Box::new(TraceParticipant {
                tag: "p",
                trace: trace.clone(),
            }),
        );
        core.execute_tick(TickId(1)).unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["p:100"]);
    }

    struct FlippingGate {
        flipped: Arc<AtomicBool>,
    }
    impl EligibilityGate for FlippingGate {
        fn name(&self) -> &str {
            "flip"
        }
        fn is_eligible(&self, _entity: EntityHandle) -> bool {
            !self.flipped.load(Ordering::SeqCst)
        }
    }

    struct FlipParticipant {
        flipped: Arc<AtomicBool>,
        committed: Arc<AtomicBool>,
    }
    impl Participant for FlipParticipant {
        fn name(&self) -> &str {
            "flip-participant"
        }
        fn execute(&mut self, _entity: EntityHandle, ctx: &mut dyn TickContext) -> Result<(), InvariantViolation> {
            self.flipped.store(true, Ordering::SeqCst);
            let committed = self.committed.clone();
            ctx.buffer_effect(EffectCommand::new("sentinel", move || {
                committed.store(true, Ordering::SeqCst);
                Ok(())
            }))
        }
    }

    #[test]
    fn mid_tick_eligibility_change_is_rejected_and_effect_not_committed() {
        let flipped = Arc::new(AtomicBool::new(false));
        let committed = Arc::new(AtomicBool::new(false));
        let core = core_with_entities(&[3]);
        core.register_gate(Box::new(FlippingGate {
            flipped: flipped.clone(),
        }));
        core.register_participant(
            0,
            Box::new(FlipParticipant {
                flipped: flipped.clone(),
                committed: committed.clone(),
            }),
        );
        let err = core.execute_tick(TickId(1)).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::MidTickEligibilityChange { entity: 3 }
        );
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[test]
    fn effect_buffer_overflow_aborts_tick() {
        struct Spammer;
        impl Participant for Spammer {
            fn name(&self) -> &str {
                "spammer"
            }
            fn execute(&mut self, _entity: EntityHandle, ctx: &mut dyn TickContext) -> Result<(), InvariantViolation> {
                ctx.buffer_effect(EffectCommand::new("e", || Ok(())))?;
                ctx.buffer_effect(EffectCommand::new("e", || Ok(())))
            }
        }
        let registry = Arc::new(EntityRegistry::new());
        registry.register(EntityHandle(1), ZoneId(1));
        let core = SimulationCore::new(registry, 1);
        core.register_gate(Box::new(AlwaysGate));
        core.register_participant(0, Box::new(Spammer));
        let err = core.execute_tick(TickId(1)).unwrap_err();
        assert_eq!(err, InvariantViolation::EffectBufferOverflow { capacity: 1 });
    }
}
