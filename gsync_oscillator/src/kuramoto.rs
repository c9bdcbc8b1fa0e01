//! Discretized Kuramoto phase-update engine for exactly two participants.
//!
//! Pure timestamp arithmetic: no I/O, no shared state, deterministic for
//! identical inputs, safe to call with stale inputs. The control loop owns
//! the decision of *whether* to call it (see the staleness fallback in
//! [`crate::cycle`]).

use gsync_common::config::{ConfigError, validate_coupling, validate_frequency};
use gsync_common::time::{NSEC_PER_SEC, Stamp};
use std::f64::consts::PI;

/// Machines in the sync loop. The coupling term is normalized by this.
pub const NUM_PARTICIPANTS: f64 = 2.0;

/// Phase advance of one full cycle, in radians.
const CYCLE_RAD: f64 = 2.0 * PI;

/// The Kuramoto wakeup calculator.
///
/// Immutable after construction; both parameters are validated once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KuramotoSync {
    frequency_hz: i32,
    coupling_constant: f64,
}

impl KuramotoSync {
    /// Construct a calculator for the given base frequency and coupling
    /// constant `K`.
    ///
    /// # Errors
    /// Rejects `frequency_hz <= 0` and `coupling_constant <= 0.0`.
    pub fn new(frequency_hz: i32, coupling_constant: f64) -> Result<Self, ConfigError> {
        Ok(KuramotoSync {
            frequency_hz: validate_frequency(frequency_hz)?,
            coupling_constant: validate_coupling(coupling_constant)?,
        })
    }

    /// The base frequency in Hertz.
    pub fn frequency_hz(&self) -> i32 {
        self.frequency_hz
    }

    /// The coupling constant `K`.
    pub fn coupling_constant(&self) -> f64 {
        self.coupling_constant
    }

    /// One base-frequency period in integer nanoseconds.
    pub fn period_ns(&self) -> i64 {
        (NSEC_PER_SEC as f64 / self.frequency_hz as f64) as i64
    }

    /// Convert a nanosecond interval into phase radians at the base
    /// frequency.
    fn nano_to_rad(&self, ns: f64) -> f64 {
        (CYCLE_RAD * self.frequency_hz as f64 / NSEC_PER_SEC as f64) * ns
    }

    /// Run the Kuramoto update to compute this participant's next wakeup.
    ///
    /// - `expected_wakeup`: what the previous cycle scheduled for now.
    /// - `actual_wakeup`: when this participant truly woke, jitter included.
    /// - `peer_wakeup`: the peer's last reported wakeup.
    ///
    /// The result is `actual_wakeup` plus one phase-velocity-scaled period,
    /// normalized; with matching on-time inputs the coupling term vanishes
    /// and the result is exactly one period out.
    pub fn compute_new_wakeup(
        &self,
        expected_wakeup: Stamp,
        actual_wakeup: Stamp,
        peer_wakeup: Stamp,
    ) -> Stamp {
        let expected_ns = expected_wakeup.as_nanos_f64();
        let actual_ns = actual_wakeup.as_nanos_f64();
        let peer_ns = peer_wakeup.as_nanos_f64();

        // Phase error of self (positive when we woke early) and relative
        // to the peer, both in radians.
        let dtheta_i = self.nano_to_rad(expected_ns - actual_ns);
        let dtheta_j = self.nano_to_rad(expected_ns - peer_ns);

        // Common form of the Kuramoto model, N = 2:
        // dθ/dt = ω + (K / N) Σ sin(θ_j − θ_i)
        let dtheta_dt = CYCLE_RAD
            + (self.coupling_constant / NUM_PARTICIPANTS) * (dtheta_j - dtheta_i).sin();

        // Scale the phase velocity back to nanoseconds: a velocity of one
        // cycle per cycle is exactly one period.
        let offset_ns = (dtheta_dt / CYCLE_RAD) * (self.period_ns() as f64);

        Stamp {
            tv_sec: actual_wakeup.tv_sec,
            tv_nsec: actual_wakeup.tv_nsec + offset_ns as i64,
        }
        .normalized()
    }

    /// Next wakeup when the peer is silent: one base period from the
    /// actual wakeup, coupling ignored.
    pub fn free_running_wakeup(&self, actual_wakeup: Stamp) -> Stamp {
        actual_wakeup.add_ns(self.period_ns())
    }
}
