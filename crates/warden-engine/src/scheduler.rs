//! The tick clock & scheduler (C3): fixed-cadence absolute scheduling,
//! catch-up clamp, and the stall watchdog.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time diagnostics for the scheduler, safe to read from any
/// thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickDiagnostics {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Shortest observed tick duration, in nanoseconds.
    pub min_ns: u64,
    /// Longest observed tick duration, in nanoseconds.
    pub max_ns: u64,
    /// Running average tick duration, in nanoseconds.
    pub avg_ns: u64,
    /// Ticks whose execution exceeded the tick interval.
    pub overruns: u64,
    /// Iterations in which the catch-up clamp engaged.
    pub catch_up_clamped: u64,
    /// Stall episodes signaled.
    pub stall_detections: u64,
    /// Duration of the most recent stall, in nanoseconds.
    pub last_stall_ns: u64,
}

struct Counters {
    tick_count: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    total_ns: AtomicU64,
    overruns: AtomicU64,
    catch_up_clamped: AtomicU64,
    stall_detections: AtomicU64,
    last_stall_ns: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            total_ns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            catch_up_clamped: AtomicU64::new(0),
            stall_detections: AtomicU64::new(0),
            last_stall_ns: AtomicU64::new(0),
        }
    }
}

/// Drives the fixed 10 Hz tick cadence. Owns the absolute schedule
/// (tick N fires at `start + N * interval`, never relative to the
/// previous tick), the catch-up clamp, and the stall watchdog. Does
/// not itself know how to execute a tick; callers pass a closure.
pub struct TickClock {
    interval: Duration,
    catch_up_cap: u32,
    stall_threshold: Duration,
    start: Instant,
    next_tick_index: AtomicI64,
    last_completed_tick_at_ns: AtomicU64,
    stall_signaled: AtomicBool,
    counters: Counters,
}

impl TickClock {
    /// Create a clock starting "now". `interval` is normally 100 ms.
    pub fn new(interval: Duration, catch_up_cap: u32, stall_threshold: Duration) -> Self {
        let start = Instant::now();
        Self {
            interval,
            catch_up_cap,
            stall_threshold,
            start,
            next_tick_index: AtomicI64::new(0),
            last_completed_tick_at_ns: AtomicU64::new(0),
            stall_signaled: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Absolute deadline for tick `n`, measured from this clock's
    /// start instant — never relative to the previous tick, so jitter
    /// cannot accumulate drift.
    fn deadline_for(&self, n: i64) -> Duration {
        self.interval * n as u32
    }

    /// Run the scheduler loop until `stop` is set. `execute_one_tick(n)`
    /// is invoked once per tick, in strictly increasing order, and its
    /// wall-clock duration is recorded; it may itself set `stop` to
    /// request a graceful exit, which always takes effect at the next
    /// tick boundary, never mid-tick. `sleep` and `now` are injected so
    /// tests can drive the loop with a virtual clock; production
    /// callers pass `std::thread::sleep` and `Instant::now`.
    pub fn run(
        &self,
        mut execute_one_tick: impl FnMut(i64),
        stop: &AtomicBool,
        mut sleep: impl FnMut(Duration),
        mut now: impl FnMut() -> Instant,
    ) {
        while !stop.load(Ordering::Relaxed) {
            let elapsed = now().saturating_duration_since(self.start);
            let next_index = self.next_tick_index.load(Ordering::Relaxed);
            let deadline = self.deadline_for(next_index);

            if elapsed < deadline {
                let remaining = deadline - elapsed;
                if remaining > Duration::from_millis(2) {
                    sleep(remaining - Duration::from_millis(1));
                }
                self.check_stall(now());
                continue;
            }

            let mut executed_this_iteration = 0u32;
            loop {
                let index = self.next_tick_index.load(Ordering::Relaxed);
                let deadline = self.deadline_for(index);
                if now().saturating_duration_since(self.start) < deadline {
                    break;
                }
                if executed_this_iteration >= self.catch_up_cap {
                    self.counters.catch_up_clamped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                // A stop request still only takes effect at a tick
                // boundary: checked here, after the cap accounting
                // above, but always before the next tick executes.
                if stop.load(Ordering::Relaxed) {
                    break;
                }

                let tick_start = now();
                execute_one_tick(index);
                let tick_duration = now().saturating_duration_since(tick_start);
                self.record_tick(tick_duration);

                self.next_tick_index.store(index + 1, Ordering::Relaxed);
                self.last_completed_tick_at_ns.store(
                    now().saturating_duration_since(self.start).as_nanos() as u64,
                    Ordering::Relaxed,
                );
                self.stall_signaled.store(false, Ordering::Relaxed);
                executed_this_iteration += 1;
            }
        }
    }

    fn record_tick(&self, duration: Duration) {
        let ns = duration.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.counters.tick_count.fetch_add(1, Ordering::Relaxed);
        self.counters.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.counters.min_ns.fetch_min(ns, Ordering::Relaxed);
        self.counters.max_ns.fetch_max(ns, Ordering::Relaxed);
        if duration > self.interval {
            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn check_stall(&self, now: Instant) {
        let elapsed_ns = now.saturating_duration_since(self.start).as_nanos() as u64;
        let last = self.last_completed_tick_at_ns.load(Ordering::Relaxed);
        let since_last = Duration::from_nanos(elapsed_ns.saturating_sub(last));
        if since_last > self.stall_threshold
            && !self.stall_signaled.swap(true, Ordering::Relaxed)
        {
            self.counters.stall_detections.fetch_add(1, Ordering::Relaxed);
            self.counters
                .last_stall_ns
                .store(since_last.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// The next tick index the scheduler will execute.
    pub fn next_tick_index(&self) -> i64 {
        self.next_tick_index.load(Ordering::Relaxed)
    }

    /// A snapshot of the scheduler's diagnostics.
    pub fn diagnostics(&self) -> TickDiagnostics {
        let count = self.counters.tick_count.load(Ordering::Relaxed);
        let total = self.counters.total_ns.load(Ordering::Relaxed);
        let min = self.counters.min_ns.load(Ordering::Relaxed);
        TickDiagnostics {
            tick_count: count,
            min_ns: if count == 0 { 0 } else { min },
            max_ns: self.counters.max_ns.load(Ordering::Relaxed),
            avg_ns: if count == 0 { 0 } else { total / count },
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            catch_up_clamped: self.counters.catch_up_clamped.load(Ordering::Relaxed),
            stall_detections: self.counters.stall_detections.load(Ordering::Relaxed),
            last_stall_ns: self.counters.last_stall_ns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn catch_up_clamp_caps_ticks_per_iteration() {
        let clock = TickClock::new(Duration::from_millis(100), 10, Duration::from_secs(5));
        let executed = AtomicUsize::new(0);
        // Jump the virtual clock 2 seconds (20 ticks worth) ahead before
        // the loop ever checks elapsed time.
        let virtual_now = Cell::new(clock.start + Duration::from_secs(2));
        let stop = AtomicBool::new(false);
        clock.run(
            |_n| {
                executed.fetch_add(1, Ordering::Relaxed);
                // Stop as soon as the first catch-up iteration clamps,
                // i.e. once 10 ticks have run.
                if executed.load(Ordering::Relaxed) >= 10 {
                    stop.store(true, Ordering::Relaxed);
                }
            },
            &stop,
            |_d| {},
            || virtual_now.get(),
        );
        assert_eq!(executed.load(Ordering::Relaxed), 10);
        assert_eq!(clock.diagnostics().catch_up_clamped, 1);
        assert_eq!(clock.next_tick_index(), 10);
    }

    #[test]
    fn ticks_execute_in_strictly_increasing_order() {
        let clock = TickClock::new(Duration::from_millis(100), 100, Duration::from_secs(5));
        let virtual_now = Cell::new(clock.start + Duration::from_millis(350));
        let seen = std::sync::Mutex::new(Vec::new());
        let stop = AtomicBool::new(false);
        clock.run(
            |n| {
                seen.lock().unwrap().push(n);
                if seen.lock().unwrap().len() >= 3 {
                    stop.store(true, Ordering::Relaxed);
                }
            },
            &stop,
            |_d| {},
            || virtual_now.get(),
        );
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn diagnostics_track_min_max_avg() {
        let clock = TickClock::new(Duration::from_millis(100), 100, Duration::from_secs(5));
        clock.record_tick(Duration::from_millis(10));
        clock.record_tick(Duration::from_millis(30));
        let d = clock.diagnostics();
        assert_eq!(d.tick_count, 2);
        assert_eq!(d.min_ns, Duration::from_millis(10).as_nanos() as u64);
        assert_eq!(d.max_ns, Duration::from_millis(30).as_nanos() as u64);
        assert_eq!(d.avg_ns, Duration::from_millis(20).as_nanos() as u64);
    }

    #[test]
    fn overrun_is_counted_without_re_executing() {
        let clock = TickClock::new(Duration::from_millis(100), 100, Duration::from_secs(5));
        clock.record_tick(Duration::from_millis(150));
        assert_eq!(clock.diagnostics().overruns, 1);
        assert_eq!(clock.diagnostics().tick_count, 1);
    }

    #[test]
    fn stall_signals_once_per_episode() {
        let clock = TickClock::new(Duration::from_millis(100), 100, Duration::from_millis(50));
        clock.check_stall(clock.start + Duration::from_millis(200));
        clock.check_stall(clock.start + Duration::from_millis(210));
        assert_eq!(clock.diagnostics().stall_detections, 1);
    }
}
