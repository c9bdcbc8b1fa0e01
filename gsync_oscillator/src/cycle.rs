//! The oscillator control loop.
//!
//! One cycle: raise the line, capture the true wakeup time, read the
//! peer's stamp, pick the next wakeup (coupled or free-running), lower
//! the line, sleep until the chosen absolute instant. The shutdown flag
//! is checked once per cycle at the loop top; an interrupted sleep simply
//! re-enters the loop so the flag is seen promptly.

use crate::kuramoto::KuramotoSync;
use gsync_common::time::Stamp;
use gsync_gpio::{GpioError, GpioLine, Level};
use gsync_shm::{SharedSlot, SlotError};
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors that abort the oscillator loop.
#[derive(Debug, Error)]
pub enum OscillatorError {
    /// Driving the pulse line failed.
    #[error("GPIO failure: {0}")]
    Gpio(#[from] GpioError),

    /// Reading the peer slot failed.
    #[error("shared slot failure: {0}")]
    Slot(#[from] SlotError),

    /// The monotonic clock misbehaved.
    #[error("clock failure: {0}")]
    Clock(#[from] Errno),
}

/// Which wakeup formula a cycle used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupPlan {
    /// Peer silent or stale; base-frequency arithmetic.
    FreeRunning,
    /// Fresh peer stamp; Kuramoto update.
    Coupled,
}

/// Decide the next wakeup for one cycle.
///
/// The engine is bypassed when the peer has never reported or has not
/// updated since the previous cycle (offline or stalled); forward progress
/// then comes from the base frequency alone.
pub fn plan_next_wakeup(
    sync: &KuramotoSync,
    expected_wakeup: Stamp,
    actual_wakeup: Stamp,
    peer_wakeup: Stamp,
    prev_peer_wakeup: Stamp,
) -> (Stamp, WakeupPlan) {
    if peer_wakeup.is_never() || peer_wakeup == prev_peer_wakeup {
        (
            sync.free_running_wakeup(actual_wakeup),
            WakeupPlan::FreeRunning,
        )
    } else {
        (
            sync.compute_new_wakeup(expected_wakeup, actual_wakeup, peer_wakeup),
            WakeupPlan::Coupled,
        )
    }
}

/// O(1) per-cycle counters, reported once at shutdown.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total cycles executed.
    pub cycles: u64,
    /// Cycles that fell back to the base frequency.
    pub free_running: u64,
    /// Cycles that ran the Kuramoto update.
    pub coupled: u64,
    /// Worst observed wakeup latency (actual − expected) [ns].
    pub max_wake_latency_ns: i64,
}

impl SyncStats {
    /// Record one cycle. No allocation.
    #[inline]
    pub fn record(&mut self, plan: WakeupPlan, wake_latency_ns: i64) {
        self.cycles += 1;
        match plan {
            WakeupPlan::FreeRunning => self.free_running += 1,
            WakeupPlan::Coupled => self.coupled += 1,
        }
        if wake_latency_ns > self.max_wake_latency_ns {
            self.max_wake_latency_ns = wake_latency_ns;
        }
    }
}

/// The oscillator runner. Owns the output line, the peer slot, and the
/// phase engine.
pub struct OscillatorLoop {
    line: Box<dyn GpioLine>,
    slot: SharedSlot,
    sync: KuramotoSync,
    shutdown: &'static AtomicBool,
    stats: SyncStats,
    expected_wakeup: Stamp,
    prev_peer_wakeup: Stamp,
}

impl OscillatorLoop {
    /// Build a runner. `line` must already be configured as a low output;
    /// `shutdown` is polled once per cycle at the loop top.
    pub fn new(
        line: Box<dyn GpioLine>,
        slot: SharedSlot,
        sync: KuramotoSync,
        shutdown: &'static AtomicBool,
    ) -> Self {
        OscillatorLoop {
            line,
            slot,
            sync,
            shutdown,
            stats: SyncStats::default(),
            expected_wakeup: Stamp::NEVER,
            prev_peer_wakeup: Stamp::NEVER,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Run until the shutdown flag is raised.
    pub fn run(&mut self) -> Result<(), OscillatorError> {
        // The very first cycle has no history; expect "now".
        self.expected_wakeup = Stamp::now()?;

        while !self.shutdown.load(Ordering::Relaxed) {
            let new_wakeup = self.run_cycle()?;

            // Absolute-time sleep: compute latency inside the cycle does
            // not accumulate as drift.
            let target: TimeSpec = new_wakeup.into();
            match clock_nanosleep(
                ClockId::CLOCK_MONOTONIC,
                ClockNanosleepFlags::TIMER_ABSTIME,
                &target,
            ) {
                Ok(_) => {}
                // Signal delivery; the loop top re-checks the flag.
                Err(Errno::EINTR) => {}
                Err(e) => return Err(OscillatorError::Clock(e)),
            }
        }

        Ok(())
    }

    /// Execute one cycle body and return the chosen next wakeup.
    pub fn run_cycle(&mut self) -> Result<Stamp, OscillatorError> {
        // Pulse start: tell the peer we are awake.
        self.line.set_value(Level::High)?;

        let actual_wakeup = Stamp::now()?;
        let peer_wakeup = self.slot.read()?;

        let (new_wakeup, plan) = plan_next_wakeup(
            &self.sync,
            self.expected_wakeup,
            actual_wakeup,
            peer_wakeup,
            self.prev_peer_wakeup,
        );
        self.prev_peer_wakeup = peer_wakeup;

        // Pulse end.
        self.line.set_value(Level::Low)?;

        let wake_latency_ns = actual_wakeup.diff_ns(&self.expected_wakeup).max(0);
        self.stats.record(plan, wake_latency_ns);

        self.expected_wakeup = new_wakeup;
        Ok(new_wakeup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsync_gpio::{Direction, Edge, EdgeWait, GpioResult};

    fn test_key(offset: i32) -> i32 {
        ((std::process::id() as i32) & 0x000F_FFFF) << 4 | offset | 0x0400_0000
    }

    /// Never raised; cycle-level tests drive the runner directly.
    static NO_SHUTDOWN: AtomicBool = AtomicBool::new(false);

    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every level written; reads back the last written level.
    struct MockLine {
        direction: Direction,
        writes: Rc<RefCell<Vec<Level>>>,
    }

    impl MockLine {
        fn new() -> (Self, Rc<RefCell<Vec<Level>>>) {
            let writes = Rc::new(RefCell::new(Vec::new()));
            (
                MockLine {
                    direction: Direction::Output,
                    writes: writes.clone(),
                },
                writes,
            )
        }
    }

    impl GpioLine for MockLine {
        fn set_direction(&mut self, direction: Direction) -> GpioResult<()> {
            self.direction = direction;
            Ok(())
        }
        fn direction(&self) -> Direction {
            self.direction
        }
        fn set_value(&mut self, level: Level) -> GpioResult<()> {
            self.writes.borrow_mut().push(level);
            Ok(())
        }
        fn value(&mut self) -> GpioResult<Level> {
            Ok(*self.writes.borrow().last().unwrap_or(&Level::Low))
        }
        fn set_active_low(&mut self, _active_low: bool) -> GpioResult<()> {
            Ok(())
        }
        fn set_edge_mode(&mut self, _edge: Edge) -> GpioResult<()> {
            Ok(())
        }
        fn edge_mode(&self) -> Edge {
            Edge::None
        }
        fn wait_for_edge(&mut self) -> GpioResult<EdgeWait> {
            Ok(EdgeWait::Edge)
        }
    }

    fn sync_100hz() -> KuramotoSync {
        KuramotoSync::new(100, 0.5).unwrap()
    }

    #[test]
    fn silent_peer_selects_free_running() {
        let sync = sync_100hz();
        let t0 = Stamp::new(10, 0);

        let (wakeup, plan) = plan_next_wakeup(&sync, t0, t0, Stamp::NEVER, Stamp::NEVER);
        assert_eq!(plan, WakeupPlan::FreeRunning);
        assert_eq!(wakeup, t0.add_ns(10_000_000));
    }

    #[test]
    fn stale_peer_selects_free_running() {
        let sync = sync_100hz();
        let t0 = Stamp::new(10, 0);
        let peer = Stamp::new(9, 995_000_000);

        // Same peer stamp seen twice in a row: the engine must not run.
        let (wakeup, plan) = plan_next_wakeup(&sync, t0, t0, peer, peer);
        assert_eq!(plan, WakeupPlan::FreeRunning);
        assert_eq!(wakeup.diff_ns(&t0), 10_000_000);
    }

    #[test]
    fn fresh_peer_selects_coupled() {
        let sync = sync_100hz();
        let t0 = Stamp::new(10, 0);
        let peer = Stamp::new(9, 995_000_000);
        let prev_peer = Stamp::new(9, 985_000_000);

        let (_, plan) = plan_next_wakeup(&sync, t0, t0, peer, prev_peer);
        assert_eq!(plan, WakeupPlan::Coupled);
    }

    #[test]
    fn cycle_pulses_high_then_low() {
        let slot = SharedSlot::open(test_key(1)).expect("open slot");
        let (line, writes) = MockLine::new();
        let mut runner = OscillatorLoop::new(Box::new(line), slot, sync_100hz(), &NO_SHUTDOWN);
        runner.expected_wakeup = Stamp::now().unwrap();

        runner.run_cycle().expect("cycle");

        assert_eq!(*writes.borrow(), vec![Level::High, Level::Low]);
        let stats = runner.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.free_running, 1);
        assert_eq!(stats.coupled, 0);
    }

    #[test]
    fn cycle_uses_engine_once_peer_reports_fresh_stamps() {
        let slot = SharedSlot::open(test_key(2)).expect("open slot");
        let (line, _writes) = MockLine::new();
        let mut runner = OscillatorLoop::new(Box::new(line), slot, sync_100hz(), &NO_SHUTDOWN);
        runner.expected_wakeup = Stamp::now().unwrap();

        // Never-reported peer: free-running.
        runner.run_cycle().expect("cycle");
        assert_eq!(runner.stats().free_running, 1);

        // First report: fresh, coupled.
        runner.slot.write(Stamp::new(1, 0)).expect("write");
        runner.run_cycle().expect("cycle");
        assert_eq!(runner.stats().coupled, 1);

        // Unchanged report: stale, free-running again.
        runner.run_cycle().expect("cycle");
        assert_eq!(runner.stats().free_running, 2);

        // Updated report: coupled again.
        runner.slot.write(Stamp::new(1, 10_000_000)).expect("write");
        runner.run_cycle().expect("cycle");
        assert_eq!(runner.stats().coupled, 2);
    }

    #[test]
    fn cycle_schedules_one_period_out_when_peer_silent() {
        let slot = SharedSlot::open(test_key(3)).expect("open slot");
        let (line, _writes) = MockLine::new();
        let mut runner = OscillatorLoop::new(Box::new(line), slot, sync_100hz(), &NO_SHUTDOWN);
        let seed = Stamp::now().unwrap();
        runner.expected_wakeup = seed;

        let wakeup = runner.run_cycle().expect("cycle");
        // The wakeup is one period from the *actual* wakeup captured
        // inside the cycle, which is at or after the seed.
        assert!(wakeup.diff_ns(&seed) >= 10_000_000);
        assert_eq!(runner.expected_wakeup, wakeup);
    }

    #[test]
    fn run_exits_before_first_cycle_when_flag_is_set() {
        static ALREADY_DOWN: AtomicBool = AtomicBool::new(true);

        let slot = SharedSlot::open(test_key(4)).expect("open slot");
        let (line, writes) = MockLine::new();
        let mut runner = OscillatorLoop::new(Box::new(line), slot, sync_100hz(), &ALREADY_DOWN);

        runner.run().expect("run");
        assert_eq!(runner.stats().cycles, 0);
        assert!(writes.borrow().is_empty());
    }
}
