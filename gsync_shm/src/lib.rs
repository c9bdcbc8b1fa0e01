//! # gsync Shared Timestamp Slot
//!
//! One fixed-size record — a monotonic timestamp plus a cross-process
//! mutex — hosted in a System V shared-memory segment identified by an
//! integer key. The recorder process writes the peer's last observed wakeup
//! into the slot; the oscillator process reads it each cycle.
//!
//! ## Guarantees
//!
//! - **Create-or-attach**: the first process with a given key creates and
//!   initializes the segment; later processes attach to the existing one.
//!   Launch order between the two roles does not matter.
//! - **Tear-free**: reads observe either the previous or the most recent
//!   completed write, enforced by the embedded mutex rather than by
//!   per-field atomics.
//! - **Priority inheritance**: the mutex is `PTHREAD_PRIO_INHERIT` so a
//!   preempted low-priority holder cannot stall a SCHED_FIFO waiter.
//! - **Error checking**: the mutex is `PTHREAD_MUTEX_ERRORCHECK`; a
//!   relock by the holder is a reported error, never undefined behavior.
//! - **Deferred teardown**: the creator marks the segment for removal on
//!   drop; the kernel destroys it only after the last process detaches.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gsync_common::time::Stamp;
//! use gsync_shm::SharedSlot;
//!
//! # fn main() -> Result<(), gsync_shm::SlotError> {
//! let slot = SharedSlot::open(42)?;
//! slot.write(Stamp::now().unwrap())?;
//! let last = slot.read()?;
//! # let _ = last;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod slot;

pub use error::{SlotError, SlotResult};
pub use slot::SharedSlot;
