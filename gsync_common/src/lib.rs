//! gsync Common Library
//!
//! Shared building blocks for the gsync workspace crates.
//!
//! # Module Structure
//!
//! - [`time`] - Monotonic timestamp type shared across process boundaries
//! - [`config`] - Optional TOML configuration loading for both binaries
//! - [`rt`] - One-shot real-time memory and scheduler conditioning
//! - [`shutdown`] - Process-wide shutdown flag set from the SIGINT handler

pub mod config;
pub mod rt;
pub mod shutdown;
pub mod time;
