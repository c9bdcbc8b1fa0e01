//! The recorder control loop.
//!
//! Strictly peer-driven: the loop blocks indefinitely inside
//! `wait_for_edge()` and only makes progress when the peer pulses. Signal
//! delivery surfaces as an interrupted wait, which sends the loop back to
//! the shutdown check rather than into an error path.

use gsync_common::time::Stamp;
use gsync_gpio::{EdgeWait, GpioError, GpioLine};
use gsync_shm::{SharedSlot, SlotError};
use nix::errno::Errno;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors that abort the recorder loop.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The edge wait failed for a reason other than signal delivery.
    #[error("GPIO failure: {0}")]
    Gpio(#[from] GpioError),

    /// Writing the timestamp slot failed. Aborting is deliberate: a
    /// recorder that silently stops reporting would desynchronize the
    /// pair without anyone noticing.
    #[error("shared slot failure: {0}")]
    Slot(#[from] SlotError),

    /// The monotonic clock misbehaved.
    #[error("clock failure: {0}")]
    Clock(#[from] Errno),
}

/// Counters accumulated across the loop, reported once at shutdown.
#[derive(Debug, Clone, Default)]
pub struct RecorderStats {
    /// Edges observed and recorded.
    pub edges: u64,
    /// Waits cut short by signal delivery.
    pub interruptions: u64,
}

/// The recorder runner. Owns the input line and the timestamp slot.
pub struct RecorderLoop {
    line: Box<dyn GpioLine>,
    slot: SharedSlot,
    shutdown: &'static AtomicBool,
    stats: RecorderStats,
}

impl RecorderLoop {
    /// Build a runner. `line` must already be configured for edge events;
    /// `shutdown` is polled before every wait.
    pub fn new(
        line: Box<dyn GpioLine>,
        slot: SharedSlot,
        shutdown: &'static AtomicBool,
    ) -> Self {
        RecorderLoop {
            line,
            slot,
            shutdown,
            stats: RecorderStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    /// Run until the shutdown flag is raised.
    pub fn run(&mut self) -> Result<(), RecorderError> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.line.wait_for_edge()? {
                EdgeWait::Interrupted => {
                    // Re-check the flag; if the signal was not a shutdown
                    // request, wait again.
                    self.stats.interruptions += 1;
                }
                EdgeWait::Edge => {
                    self.slot.write(Stamp::now()?)?;
                    self.stats.edges += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsync_gpio::{Direction, Edge, GpioResult, Level};
    use std::collections::VecDeque;

    fn test_key(offset: i32) -> i32 {
        ((std::process::id() as i32) & 0x000F_FFFF) << 4 | offset | 0x0800_0000
    }

    /// Replays a scripted sequence of wait outcomes, then raises the
    /// given shutdown flag when the script runs out.
    struct ScriptedLine {
        waits: VecDeque<EdgeWait>,
        shutdown: &'static AtomicBool,
    }

    impl ScriptedLine {
        fn new(waits: Vec<EdgeWait>, shutdown: &'static AtomicBool) -> Self {
            ScriptedLine {
                waits: waits.into(),
                shutdown,
            }
        }
    }

    impl GpioLine for ScriptedLine {
        fn set_direction(&mut self, _direction: Direction) -> GpioResult<()> {
            Ok(())
        }
        fn direction(&self) -> Direction {
            Direction::Input
        }
        fn set_value(&mut self, _level: Level) -> GpioResult<()> {
            Ok(())
        }
        fn value(&mut self) -> GpioResult<Level> {
            Ok(Level::Low)
        }
        fn set_active_low(&mut self, _active_low: bool) -> GpioResult<()> {
            Ok(())
        }
        fn set_edge_mode(&mut self, _edge: Edge) -> GpioResult<()> {
            Ok(())
        }
        fn edge_mode(&self) -> Edge {
            Edge::Rising
        }
        fn wait_for_edge(&mut self) -> GpioResult<EdgeWait> {
            match self.waits.pop_front() {
                Some(outcome) => Ok(outcome),
                None => {
                    self.shutdown.store(true, Ordering::Relaxed);
                    Ok(EdgeWait::Interrupted)
                }
            }
        }
    }

    #[test]
    fn edges_are_stamped_and_interruptions_tolerated() {
        static SHUTDOWN: AtomicBool = AtomicBool::new(false);

        let slot = SharedSlot::open(test_key(1)).expect("open slot");
        assert!(slot.read().expect("read").is_never());

        let line = ScriptedLine::new(
            vec![EdgeWait::Edge, EdgeWait::Interrupted, EdgeWait::Edge],
            &SHUTDOWN,
        );
        let mut runner = RecorderLoop::new(Box::new(line), slot, &SHUTDOWN);
        runner.run().expect("run");

        assert_eq!(runner.stats().edges, 2);
        // Two interruptions total: one mid-script, one when the script
        // ran out and raised the flag.
        assert_eq!(runner.stats().interruptions, 2);

        // The slot now carries a real stamp from the last edge.
        assert!(!runner.slot.read().expect("read").is_never());
    }

    #[test]
    fn shutdown_flag_stops_the_loop_before_waiting() {
        static SHUTDOWN: AtomicBool = AtomicBool::new(true);

        let slot = SharedSlot::open(test_key(2)).expect("open slot");
        let line = ScriptedLine::new(vec![], &SHUTDOWN);
        let mut runner = RecorderLoop::new(Box::new(line), slot, &SHUTDOWN);

        runner.run().expect("run");
        assert_eq!(runner.stats().edges, 0);
        assert_eq!(runner.stats().interruptions, 0);
    }
}
