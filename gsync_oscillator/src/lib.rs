//! # gsync Oscillator Library
//!
//! The oscillator half of the GPIO-based synchronizer. Runs a
//! fixed-frequency loop that raises its output line once per cycle as an
//! "I woke up" pulse visible to the peer device, then recomputes its own
//! next absolute wakeup from a two-participant Kuramoto model so that its
//! phase drifts toward the peer's reported wakeups.
//!
//! ## Cycle Shape
//!
//! pulse high → capture wakeup time → read peer stamp from the shared
//! slot → pick coupled or free-running wakeup → pulse low → absolute
//! sleep on `CLOCK_MONOTONIC`. Absolute sleep keeps per-cycle compute
//! latency from accumulating as drift.

pub mod cycle;
pub mod kuramoto;
