//! One-shot real-time conditioning for the sync processes.
//!
//! Both binaries call [`configure_mem_for_rt`] once at startup, before any
//! hardware is touched:
//!
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. `mallopt(M_TRIM_THRESHOLD, -1)` — disable heap trimming.
//! 3. `mallopt(M_MMAP_MAX, 0)` — keep allocations on the brk heap.
//! 4. Prefault a fixed stack and heap extent page by page.
//!
//! Memory conditioning failures are logged and tolerated so the tools stay
//! usable without `CAP_IPC_LOCK`. Scheduler placement ([`rt_schedule`]) is
//! only attempted when explicitly requested and is fatal on failure.

use thiserror::Error;
use tracing::warn;

/// Stack extent prefaulted at startup (512 KiB).
const MAX_STACK_SIZE: usize = 512 * 1024;

/// Heap extent prefaulted at startup (8 MiB).
const MAX_HEAP_SIZE: usize = 8 * 1024 * 1024;

/// Errors from explicit scheduler placement.
#[derive(Debug, Error)]
pub enum RtError {
    /// CPU affinity could not be applied.
    #[error("failed to pin to cpu {cpu}: {source}")]
    Affinity {
        /// Requested CPU core.
        cpu: usize,
        /// Underlying error.
        source: nix::Error,
    },

    /// SCHED_FIFO could not be applied.
    #[error("sched_setscheduler(SCHED_FIFO, {priority}) failed: {source}")]
    Scheduler {
        /// Requested priority.
        priority: i32,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Lock all current and future pages into RAM.
fn lock_pages() {
    use nix::sys::mman::{MlockAllFlags, mlockall};

    if let Err(e) = mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        warn!("mlockall failed ({e}); pages may fault during the sync loop");
    }
}

/// Disable heap trimming and mmap-backed allocation.
fn tune_malloc() {
    // mallopt returns 0 on failure.
    if unsafe { libc::mallopt(libc::M_TRIM_THRESHOLD, -1) } == 0 {
        warn!("mallopt(M_TRIM_THRESHOLD) failed; heap may be trimmed under load");
    }
    if unsafe { libc::mallopt(libc::M_MMAP_MAX, 0) } == 0 {
        warn!("mallopt(M_MMAP_MAX) failed; large allocations may use mmap");
    }
}

/// Touch one byte per page of a fixed stack extent so the pages are resident
/// before the loop starts.
fn prefault_stack() {
    let page = page_size();
    let mut buf = [0u8; MAX_STACK_SIZE];
    let mut i = 0;
    while i < buf.len() {
        // Volatile write so the touch survives optimization.
        unsafe { core::ptr::write_volatile(&mut buf[i], 1) };
        i += page;
    }
    core::hint::black_box(&buf);
}

/// Touch one byte per page of a fixed heap extent.
fn prefault_heap() {
    let page = page_size();
    let mut buf = vec![0u8; MAX_HEAP_SIZE];
    let mut i = 0;
    while i < buf.len() {
        unsafe { core::ptr::write_volatile(&mut buf[i], 1) };
        i += page;
    }
    core::hint::black_box(&buf);
}

fn page_size() -> usize {
    use nix::unistd::{SysconfVar, sysconf};
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(sz)) if sz > 0 => sz as usize,
        _ => 4096,
    }
}

/// Make the process memory layout real-time friendly. Call once, early.
pub fn configure_mem_for_rt() {
    lock_pages();
    tune_malloc();
    prefault_stack();
    prefault_heap();
}

/// Pin the process to `cpu` (if given) and apply SCHED_FIFO `priority`
/// (if given). Only called when the user asked for it on the command line.
pub fn rt_schedule(cpu: Option<usize>, priority: Option<i32>) -> Result<(), RtError> {
    if let Some(cpu) = cpu {
        use nix::sched::{CpuSet, sched_setaffinity};
        use nix::unistd::Pid;

        let mut cpuset = CpuSet::new();
        cpuset
            .set(cpu)
            .map_err(|source| RtError::Affinity { cpu, source })?;
        sched_setaffinity(Pid::from_raw(0), &cpuset)
            .map_err(|source| RtError::Affinity { cpu, source })?;
    }

    if let Some(priority) = priority {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if ret != 0 {
            return Err(RtError::Scheduler {
                priority,
                source: std::io::Error::last_os_error(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let sz = page_size();
        assert!(sz >= 1024);
        assert!(sz.is_power_of_two());
    }

    #[test]
    fn configure_mem_never_panics() {
        // Unprivileged environments fail mlockall; that must stay non-fatal.
        configure_mem_for_rt();
    }

    #[test]
    fn rt_schedule_noop_when_unset() {
        assert!(rt_schedule(None, None).is_ok());
    }
}
