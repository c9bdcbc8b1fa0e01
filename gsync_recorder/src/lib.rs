//! # gsync Recorder Library
//!
//! The recorder half of the GPIO-based synchronizer. Blocks on edge
//! events from the peer device's pulse line and writes the local
//! monotonic time of each edge into the shared slot, where the local
//! oscillator process picks it up as "the peer's last reported wakeup".

pub mod cycle;
