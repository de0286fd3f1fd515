//! Validated configuration for the tick runtime: backpressure limits
//! and the handful of timing knobs the scheduler needs. Constructed
//! once at orchestrator startup and never mutated afterward.

use std::fmt;
use std::time::Duration;

/// Construction-time validation failure for [`EngineConfig`] or
/// [`BackpressureConfig`]. Every field requires a strictly positive
/// value (or a finite tick rate); a zero, negative, or non-finite
/// value is rejected before any thread is spawned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A capacity or limit field was zero or negative where a
    /// strictly positive value is required.
    NonPositive {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The configured tick rate does not produce a finite tick
    /// interval (e.g. a subnormal or zero hertz value that would
    /// panic `Duration::from_secs_f64`).
    InvalidTickRateHz {
        /// The rejected value.
        value: f64,
    },
    /// The catch-up clamp was configured below one tick.
    CatchUpCapTooSmall {
        /// The rejected value.
        value: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositive { field } => write!(f, "{field} must be strictly positive"),
            Self::InvalidTickRateHz { value } => {
                write!(f, "tick rate {value} Hz does not yield a finite tick interval")
            }
            Self::CatchUpCapTooSmall { value } => {
                write!(f, "catch-up cap {value} must be at least 1 tick")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-mailbox and per-session backpressure limits. All defaults
/// match the external interface defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackpressureConfig {
    /// Maximum inbound commands queued per session.
    pub max_inbound_commands_per_session: usize,
    /// Maximum queued inbound bytes per session.
    pub max_queued_bytes_per_session: usize,
    /// Maximum outbound snapshots queued per session.
    pub max_outbound_snapshots_per_session: usize,
    /// Maximum persistence writes queued for a single player.
    pub max_persistence_writes_per_player: usize,
    /// Maximum persistence writes queued globally.
    pub max_persistence_writes_global: usize,
    /// Maximum persistence write bytes queued for a single player.
    pub max_persistence_write_bytes_per_player: usize,
    /// Maximum persistence write bytes queued globally.
    pub max_persistence_write_bytes_global: usize,
    /// Maximum persistence completions queued for the applier.
    pub max_persistence_completions: usize,
    /// Maximum persistence completion bytes queued for the applier.
    pub max_persistence_completion_bytes: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_inbound_commands_per_session: 64,
            max_queued_bytes_per_session: 256 * 1024,
            max_outbound_snapshots_per_session: 8,
            max_persistence_writes_per_player: 16,
            max_persistence_writes_global: 128,
            max_persistence_write_bytes_per_player: 1024 * 1024,
            max_persistence_write_bytes_global: 8 * 1024 * 1024,
            max_persistence_completions: 128,
            max_persistence_completion_bytes: 512 * 1024,
        }
    }
}

impl BackpressureConfig {
    /// Validate that every field is strictly positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        macro_rules! check {
            ($field:ident) => {
                if self.$field == 0 {
                    return Err(ConfigError::NonPositive {
                        field: stringify!($field),
                    });
                }
            };
        }
        check!(max_inbound_commands_per_session);
        check!(max_queued_bytes_per_session);
        check!(max_outbound_snapshots_per_session);
        check!(max_persistence_writes_per_player);
        check!(max_persistence_writes_global);
        check!(max_persistence_write_bytes_per_player);
        check!(max_persistence_write_bytes_global);
        check!(max_persistence_completions);
        check!(max_persistence_completion_bytes);
        Ok(())
    }
}

/// Top-level engine configuration: tick cadence, catch-up/stall
/// thresholds, and the buffer sizes that bound per-tick allocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Fixed tick rate in Hz. The external interface default is 10.
    pub tick_rate_hz: f64,
    /// Maximum number of consecutive ticks the scheduler will execute
    /// in a single catch-up iteration.
    pub catch_up_cap: u32,
    /// Wall-clock duration since the last completed tick after which
    /// the stall watchdog signals.
    pub stall_threshold: Duration,
    /// Capacity of the tick-scoped effect buffer. Sized well above the
    /// expected per-tick effect count; exceeding it aborts the tick
    /// (see the effect-buffer-overflow resolution in the design
    /// notes).
    pub effect_buffer_capacity: usize,
    /// Maximum inbound frames drained from the transport mailbox per
    /// tick by the inbound pump.
    pub max_frames_per_tick: usize,
    /// Maximum combat events buffered in a single tick.
    pub max_combat_events_per_tick: usize,
    /// Maximum delivered-event ids tracked per client delivery guard
    /// before it is cleared (bounded memory over perfect dedup).
    pub max_delivery_guard_entries: usize,
    /// Maximum outbound snapshots the send pump drains per iteration,
    /// across all sessions.
    pub max_outbound_per_iteration: usize,
    /// Maximum persistence writes the worker drains per iteration.
    pub max_persistence_writes_per_iteration: usize,
    /// Idle delay between outbound/persistence worker iterations when
    /// there was nothing to do.
    pub worker_idle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 10.0,
            catch_up_cap: 10,
            stall_threshold: Duration::from_millis(500),
            effect_buffer_capacity: 4096,
            max_frames_per_tick: 1024,
            max_combat_events_per_tick: 256,
            max_delivery_guard_entries: 256,
            max_outbound_per_iteration: 512,
            max_persistence_writes_per_iteration: 64,
            worker_idle_delay: Duration::from_millis(1),
        }
    }
}

impl EngineConfig {
    /// Fixed tick interval derived from `tick_rate_hz`.
    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        let secs = 1.0 / self.tick_rate_hz;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidTickRateHz {
                value: self.tick_rate_hz,
            });
        }
        Ok(Duration::from_secs_f64(secs))
    }

    /// Validate every field, including the tick rate and the handful
    /// of structural invariants that are not simply "must be
    /// positive".
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tick_interval()?;
        if self.catch_up_cap == 0 {
            return Err(ConfigError::CatchUpCapTooSmall {
                value: self.catch_up_cap,
            });
        }
        macro_rules! check {
            ($field:ident) => {
                if self.$field == 0 {
                    return Err(ConfigError::NonPositive {
                        field: stringify!($field),
                    });
                }
            };
        }
        check!(effect_buffer_capacity);
        check!(max_frames_per_tick);
        check!(max_combat_events_per_tick);
        check!(max_delivery_guard_entries);
        check!(max_outbound_per_iteration);
        check!(max_persistence_writes_per_iteration);
        Ok(())
    }
}
