//! Process-wide capture of the tick thread's identity, used to assert
//! that tick-only operations are never invoked off that thread.
//!
//! This is the one piece of process-wide state the runtime keeps (see
//! the design notes on avoiding global state): it is write-once,
//! initialized by the scheduler when the tick thread starts, and reads
//! are debug-only so release builds pay nothing for the check.

use std::sync::OnceLock;
use std::thread::ThreadId;

use warden_core::error::InvariantViolation;

static TICK_THREAD: OnceLock<ThreadId> = OnceLock::new();

/// Record the calling thread as the tick thread. Called exactly once,
/// at the start of the tick thread's run loop. Calling it a second
/// time from a different thread is a logic error in the orchestrator
/// itself (one tick thread per runtime instance) and is ignored after
/// the first call, consistent with `OnceLock`'s semantics.
pub fn capture_tick_thread() {
    let _ = TICK_THREAD.set(std::thread::current().id());
}

/// In debug builds, assert the calling thread is the captured tick
/// thread. In release builds this is a no-op — the contract is
/// documented, not enforced, in release.
pub fn assert_tick_thread() -> Result<(), InvariantViolation> {
    if cfg!(debug_assertions) {
        if let Some(expected) = TICK_THREAD.get() {
            if *expected != std::thread::current().id() {
                return Err(InvariantViolation::OffTickThreadAccess);
            }
        }
    }
    Ok(())
}
