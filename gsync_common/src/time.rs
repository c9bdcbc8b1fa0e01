//! Monotonic timestamp type shared across process boundaries.
//!
//! A [`Stamp`] is a `CLOCK_MONOTONIC` instant with the nanosecond field
//! normalized to `[0, 1e9)`. The all-zero value is reserved as the "never
//! reported" sentinel. The layout is `repr(C)` because stamps are stored
//! verbatim inside the shared-memory slot and must look identical to every
//! attached process.

use nix::sys::time::TimeSpec;
use nix::time::{ClockId, clock_gettime};
use static_assertions::const_assert_eq;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// A monotonic-clock instant (seconds + nanoseconds).
///
/// Field order and layout are part of the shared-memory ABI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Stamp {
    /// Whole seconds.
    pub tv_sec: i64,
    /// Nanoseconds, in `[0, NSEC_PER_SEC)` once normalized.
    pub tv_nsec: i64,
}

// Two i64 fields, no padding. The slot layout depends on this.
const_assert_eq!(core::mem::size_of::<Stamp>(), 16);
const_assert_eq!(core::mem::align_of::<Stamp>(), 8);

impl Stamp {
    /// The "never reported" sentinel. Fresh shared segments read as this
    /// value because the kernel zero-fills them.
    pub const NEVER: Stamp = Stamp {
        tv_sec: 0,
        tv_nsec: 0,
    };

    /// Construct a stamp and normalize the nanosecond field.
    pub fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Stamp { tv_sec, tv_nsec }.normalized()
    }

    /// Read the current `CLOCK_MONOTONIC` time.
    pub fn now() -> nix::Result<Self> {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)?;
        Ok(Self::from(ts))
    }

    /// True for the reserved "never reported" value.
    pub fn is_never(&self) -> bool {
        *self == Self::NEVER
    }

    /// Carry excess nanoseconds into the seconds field until the
    /// nanosecond field lands in `[0, NSEC_PER_SEC)`.
    pub fn normalized(mut self) -> Self {
        while self.tv_nsec >= NSEC_PER_SEC {
            self.tv_sec += 1;
            self.tv_nsec -= NSEC_PER_SEC;
        }
        while self.tv_nsec < 0 {
            self.tv_sec -= 1;
            self.tv_nsec += NSEC_PER_SEC;
        }
        self
    }

    /// Return this stamp advanced by `ns` nanoseconds, normalized.
    pub fn add_ns(self, ns: i64) -> Self {
        Stamp {
            tv_sec: self.tv_sec,
            tv_nsec: self.tv_nsec + ns,
        }
        .normalized()
    }

    /// Difference `self - other` in nanoseconds.
    pub fn diff_ns(&self, other: &Stamp) -> i64 {
        (self.tv_sec - other.tv_sec) * NSEC_PER_SEC + (self.tv_nsec - other.tv_nsec)
    }

    /// Total nanoseconds as a float, for phase arithmetic.
    pub fn as_nanos_f64(&self) -> f64 {
        (self.tv_sec as f64) * (NSEC_PER_SEC as f64) + (self.tv_nsec as f64)
    }
}

impl From<TimeSpec> for Stamp {
    fn from(ts: TimeSpec) -> Self {
        Stamp {
            tv_sec: ts.tv_sec(),
            tv_nsec: ts.tv_nsec(),
        }
    }
}

impl From<Stamp> for TimeSpec {
    fn from(s: Stamp) -> Self {
        TimeSpec::new(s.tv_sec, s.tv_nsec)
    }
}
