//! The tick-scoped effect buffer: deferred side-effect commands
//! enqueued by participants during simulation and executed in FIFO
//! order at the commit phase.

use crate::error::InvariantViolation;

/// A single deferred side effect. `commit` is invoked at most once,
/// during the tick's commit phase, in the order the effect was
/// buffered relative to other effects from the same tick.
pub struct EffectCommand {
    /// Human-readable label used in diagnostics and in
    /// `InvariantViolation::EffectCommitFailed`.
    pub label: &'static str,
    commit: Box<dyn FnOnce() -> Result<(), &'static str> + Send>,
}

impl EffectCommand {
    /// Build an effect from a label and its commit closure. The
    /// closure must be idempotent at whatever boundary it commits to,
    /// since a commit failure is fatal for the owning tick.
    pub fn new(
        label: &'static str,
        commit: impl FnOnce() -> Result<(), &'static str> + Send + 'static,
    ) -> Self {
        Self {
            label,
            commit: Box::new(commit),
        }
    }

    fn run(self) -> Result<(), InvariantViolation> {
        let label = self.label;
        (self.commit)().map_err(|_| InvariantViolation::EffectCommitFailed { label })
    }
}

/// Ordered, tick-scoped buffer of effects. Cleared between ticks; a
/// command enqueued here must never survive past the commit phase of
/// the tick it was enqueued in.
pub struct EffectBuffer {
    capacity: usize,
    pending: Vec<EffectCommand>,
}

impl EffectBuffer {
    /// Create a buffer with a fixed capacity. Buffering past capacity
    /// in a single tick is an invariant violation, not a silent drop —
    /// size this generously above the expected per-tick effect count.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Enqueue an effect. Fails with an overflow violation if this
    /// would exceed the configured capacity.
    pub fn buffer(&mut self, effect: EffectCommand) -> Result<(), InvariantViolation> {
        if self.pending.len() >= self.capacity {
            return Err(InvariantViolation::EffectBufferOverflow {
                capacity: self.capacity,
            });
        }
        self.pending.push(effect);
        Ok(())
    }

    /// Number of effects currently buffered.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the buffer is currently empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain and run every buffered effect in FIFO (enqueue) order.
    /// Stops at the first failure, discarding any effects after it —
    /// the caller (the simulation core) treats any `Err` as fatal for
    /// the tick and never resumes a partially committed buffer.
    pub fn commit_all(&mut self) -> Result<(), InvariantViolation> {
        for effect in self.pending.drain(..) {
            effect.run()?;
        }
        Ok(())
    }

    /// Discard all buffered effects without running them. Used when a
    /// tick aborts before the commit phase (e.g. a mid-tick
    /// eligibility change).
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}
