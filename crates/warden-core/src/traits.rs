//! Narrow capability contracts exposed to and by external gameplay
//! collaborators. Each is a single-purpose trait rather than a class
//! hierarchy, per the interfaces-over-inheritance design note: a
//! participant only needs `Execute`, a gate only needs `is_eligible`.

use crate::effect::EffectCommand;
use crate::error::InvariantViolation;
use crate::id::{EntityHandle, SessionId, TickId};

/// Per-tick context handed to participants, hooks, and command
/// handlers. `tick_index` and `fixed_delta` are read-only facts about
/// the current tick; `buffer_effect` is the only way to record a side
/// effect — direct mutation of external state from within `Execute`
/// is a contract violation the type system does not prevent, but the
/// commit-phase discipline is what makes it observable.
pub trait TickContext {
    /// The monotone index of the tick currently executing.
    fn tick_index(&self) -> TickId;

    /// The fixed simulation step, always 100 ms for this runtime.
    fn fixed_delta(&self) -> std::time::Duration;

    /// Enqueue an effect to run at this tick's commit phase. Returns
    /// an invariant violation if the effect buffer is at capacity.
    fn buffer_effect(&mut self, effect: EffectCommand) -> Result<(), InvariantViolation>;
}

/// A gameplay system invoked once per eligible entity, in registration
/// order relative to other participants, every tick.
pub trait Participant: Send {
    /// Stable name for diagnostics and ordering ties.
    fn name(&self) -> &str;

    /// Execute this participant's logic for one entity. May buffer
    /// effects via `ctx`; must not otherwise mutate state that
    /// eligibility gates read, and must not read effects buffered by
    /// other participants this tick. An `Err` aborts the current tick:
    /// the effect buffer is discarded and no effect from any
    /// participant this tick is committed.
    fn execute(&mut self, entity: EntityHandle, ctx: &mut dyn TickContext) -> Result<(), InvariantViolation>;
}

/// A hook invoked once per tick, before gating (pre-tick) or after
/// commit (post-tick), over the full eligible set for that phase.
pub trait PhaseHook: Send {
    /// Stable name for diagnostics and ordering ties.
    fn name(&self) -> &str;

    /// Invoked once, at the start of the tick, before eligibility is
    /// evaluated. `eligible` is empty at this point (gating has not
    /// run yet) and is accepted only to keep the hook signature
    /// uniform with `on_post_tick`. An `Err` aborts the tick before
    /// gating or participant execution runs.
    fn on_pre_tick(&mut self, ctx: &mut dyn TickContext, eligible: &[EntityHandle]) -> Result<(), InvariantViolation>;

    /// Invoked once, after this tick's effects have committed. An
    /// `Err` here is reported as the tick's outcome but cannot unwind
    /// the commit that already happened.
    fn on_post_tick(&mut self, ctx: &mut dyn TickContext, eligible: &[EntityHandle]) -> Result<(), InvariantViolation>;
}

/// A single eligibility predicate. An entity is eligible for
/// participant execution iff every registered gate returns `true`.
pub trait EligibilityGate: Send {
    /// Stable name for diagnostics.
    fn name(&self) -> &str;

    /// Whether `entity` is eligible under this gate, evaluated against
    /// state as of the start of the tick.
    fn is_eligible(&self, entity: EntityHandle) -> bool;
}

/// Handles one decoded gameplay command for a session, invoked by the
/// inbound pump while draining a frozen command batch.
pub trait CommandHandler: Send {
    /// Stable name for diagnostics.
    fn name(&self) -> &str;

    /// Handle a single command payload for `session_id`. May buffer
    /// effects via `ctx`. An `Err` aborts the tick in progress.
    fn handle(
        &mut self,
        command_type: u32,
        payload: &[u8],
        session_id: SessionId,
        ctx: &mut dyn TickContext,
    ) -> Result<(), InvariantViolation>;
}

/// Ordering key shared by participants, hooks, and gates: sorted by
/// `(order_key asc, registration_seq asc)`, with registration sequence
/// breaking ties in favor of whichever was registered first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistrationOrder {
    /// Caller-chosen ordering key.
    pub order_key: i32,
    /// Monotonically increasing registration sequence, assigned by
    /// the registrar.
    pub registration_seq: u64,
}
