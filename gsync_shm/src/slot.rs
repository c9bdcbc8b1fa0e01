//! The shared timestamp slot handle.

use crate::error::{SlotError, SlotResult};
use gsync_common::time::Stamp;
use nix::errno::Errno;
use static_assertions::const_assert_eq;
use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use tracing::warn;

/// Slot layout as every attached process sees it: the timestamp first,
/// the mutex immediately after. Part of the cross-process ABI.
#[repr(C)]
struct SlotData {
    value: Stamp,
    guard: libc::pthread_mutex_t,
}

// The timestamp must sit at the start of the segment.
const_assert_eq!(core::mem::offset_of!(SlotData, value), 0);
const_assert_eq!(core::mem::offset_of!(SlotData, guard), 16);

/// Owned handle to the cross-process timestamp slot.
///
/// The first process to open a key creates the segment and initializes the
/// embedded mutex; later opens attach without re-initializing (a second
/// `pthread_mutex_init` on a live mutex is destructive). Dropping the
/// creator marks the segment for removal once the last attached process
/// detaches; dropping a non-creator only releases its own mapping.
pub struct SharedSlot {
    key: i32,
    id: i32,
    data: NonNull<SlotData>,
    is_creator: bool,
}

// The handle is used from a single thread per process; the embedded mutex
// is what synchronizes the actual slot value across processes.
unsafe impl Send for SharedSlot {}

impl SharedSlot {
    /// Create or attach the slot segment for `key`.
    ///
    /// Creation is attempted with `IPC_EXCL` so exactly one opener becomes
    /// the creator regardless of launch order; on `EEXIST` the call falls
    /// back to attaching the existing segment.
    ///
    /// # Errors
    /// `InvalidKey` for non-positive keys; `Segment`/`Attach`/`MutexInit`
    /// with the underlying errno when the kernel refuses.
    pub fn open(key: i32) -> SlotResult<Self> {
        if key <= 0 {
            return Err(SlotError::InvalidKey { key });
        }

        let size = core::mem::size_of::<SlotData>();
        let perms = 0o666;

        let mut is_creator = true;
        let mut id = unsafe { libc::shmget(key, size, libc::IPC_CREAT | libc::IPC_EXCL | perms) };
        if id < 0 && Errno::last() == Errno::EEXIST {
            is_creator = false;
            id = unsafe { libc::shmget(key, size, libc::IPC_CREAT | perms) };
        }
        if id < 0 {
            return Err(SlotError::Segment {
                key,
                source: Errno::last(),
            });
        }

        let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
        if addr == usize::MAX as *mut c_void {
            let source = Errno::last();
            if is_creator {
                unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
            }
            return Err(SlotError::Attach { id, source });
        }

        // Fresh System V segments are zero-filled, so `value` already reads
        // as the NEVER sentinel on the create path.
        let Some(data) = NonNull::new(addr as *mut SlotData) else {
            if is_creator {
                unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
            }
            return Err(SlotError::Attach {
                id,
                source: Errno::EFAULT,
            });
        };

        let slot = SharedSlot {
            key,
            id,
            data,
            is_creator,
        };

        if is_creator {
            slot.init_guard()?;
        }

        Ok(slot)
    }

    /// Initialize the embedded mutex. Creator only.
    ///
    /// PTHREAD_PROCESS_SHARED lets unrelated processes take the lock,
    /// PTHREAD_PRIO_INHERIT lets the kernel boost a holder blocking a
    /// higher-priority waiter, and PTHREAD_MUTEX_ERRORCHECK turns relock
    /// and foreign-unlock into reported errors.
    fn init_guard(&self) -> SlotResult<()> {
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            libc::pthread_mutexattr_init(attr.as_mut_ptr());
            libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_ERRORCHECK);
            libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_mutexattr_setprotocol(attr.as_mut_ptr(), libc::PTHREAD_PRIO_INHERIT);

            let rc = libc::pthread_mutex_init(&mut (*self.data.as_ptr()).guard, attr.as_ptr());
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());

            if rc != 0 {
                return Err(SlotError::MutexInit {
                    source: Errno::from_raw(rc),
                });
            }
        }
        Ok(())
    }

    /// The key this slot was opened with.
    pub fn key(&self) -> i32 {
        self.key
    }

    /// True if this handle created (and will eventually remove) the segment.
    pub fn is_creator(&self) -> bool {
        self.is_creator
    }

    /// Read the last written timestamp under the lock.
    pub fn read(&self) -> SlotResult<Stamp> {
        self.lock()?;
        let value = unsafe { (*self.data.as_ptr()).value };
        self.unlock()?;
        Ok(value)
    }

    /// Replace the slot timestamp under the lock.
    pub fn write(&self, value: Stamp) -> SlotResult<()> {
        self.lock()?;
        unsafe { (*self.data.as_ptr()).value = value };
        self.unlock()?;
        Ok(())
    }

    fn lock(&self) -> SlotResult<()> {
        let rc = unsafe { libc::pthread_mutex_lock(&mut (*self.data.as_ptr()).guard) };
        if rc != 0 {
            return Err(SlotError::Lock {
                source: Errno::from_raw(rc),
            });
        }
        Ok(())
    }

    fn unlock(&self) -> SlotResult<()> {
        let rc = unsafe { libc::pthread_mutex_unlock(&mut (*self.data.as_ptr()).guard) };
        if rc != 0 {
            return Err(SlotError::Unlock {
                source: Errno::from_raw(rc),
            });
        }
        Ok(())
    }
}

impl Drop for SharedSlot {
    fn drop(&mut self) {
        if unsafe { libc::shmdt(self.data.as_ptr() as *const c_void) } != 0 {
            warn!(
                "failed to detach shm segment {} (key {}): {}",
                self.id,
                self.key,
                Errno::last()
            );
        }

        if self.is_creator {
            // Removal is deferred by the kernel until the last detach, so a
            // still-attached peer keeps a usable mapping.
            if unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) } != 0 {
                warn!(
                    "failed to mark shm segment {} (key {}) for removal: {}",
                    self.id,
                    self.key,
                    Errno::last()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_data_starts_with_stamp() {
        // ABI expectation shared with the C-era layout: {timespec, mutex}.
        assert_eq!(core::mem::offset_of!(SlotData, value), 0);
        assert!(core::mem::size_of::<SlotData>() >= 16);
    }
}
