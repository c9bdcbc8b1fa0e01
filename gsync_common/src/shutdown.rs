//! Process-wide shutdown flag driven by SIGINT.
//!
//! The handler stores one atomic bool and nothing else: no allocation, no
//! locking, nothing that is unsafe in signal context. Loops poll the flag
//! once per iteration; the handler is installed without `SA_RESTART` so an
//! in-flight blocking wait returns `EINTR` and the loop re-checks the flag
//! instead of hanging.

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Install the SIGINT handler. Call once at startup.
///
/// `SaFlags::empty()` deliberately omits `SA_RESTART`: the edge wait and
/// the absolute sleep must come back with `EINTR` on delivery.
pub fn install_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

/// The flag the handler writes. Loop runners hold this and poll it at
/// iteration boundaries.
pub fn flag() -> &'static AtomicBool {
    &SHUTDOWN
}

/// True once SIGINT has been delivered.
pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
