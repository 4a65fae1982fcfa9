//! Named counting semaphores shared across processes.
//!
//! Thin wrapper over POSIX `sem_open`-family calls (which `nix` does not
//! wrap). Waits interrupted by a signal are retried; any other wait failure
//! surfaces to the caller.

use std::ffi::CString;
use std::ptr::NonNull;

use nix::errno::Errno;

use crate::error::{Result, ShroudError};

/// A named, cross-process counting semaphore.
///
/// Created with a defensive unlink of any stale prior instance. The handle
/// is closed on drop; the name persists until [`NamedSemaphore::unlink`] so
/// forked children can keep using their inherited handle.
#[derive(Debug)]
pub(crate) struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: CString,
}

impl NamedSemaphore {
    /// Create the semaphore `name` with the given initial value, removing
    /// any leftover with the same name first.
    pub(crate) fn create(name: &str, initial: u32) -> Result<Self> {
        let cname = CString::new(name)
            .map_err(|_| ShroudError::InvalidNamespace(name.to_string()))?;
        unsafe {
            // Stale instance from a crashed prior run; absence is fine.
            libc::sem_unlink(cname.as_ptr());
        }
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT,
                libc::S_IRUSR | libc::S_IWUSR,
                initial as libc::c_uint,
            )
        };
        if std::ptr::eq(sem, libc::SEM_FAILED) {
            return Err(Errno::last().into());
        }
        let sem = NonNull::new(sem).ok_or_else(Errno::last)?;
        Ok(Self { sem, name: cname })
    }

    /// Block until the count is positive, then decrement it.
    pub(crate) fn wait(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(errno.into()),
            }
        }
    }

    /// Increment the count, waking one blocked waiter if any.
    pub(crate) fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(Errno::last().into())
        }
    }

    /// Remove the name from the system namespace. The semaphore itself lives
    /// on until every process holding a handle has closed it.
    pub(crate) fn unlink(&self) {
        unsafe {
            libc::sem_unlink(self.name.as_ptr());
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem.as_ptr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(suffix: &str) -> String {
        format!("/shroud_test_{}_{suffix}", std::process::id())
    }

    #[test]
    fn test_post_then_wait_counts() {
        let name = unique_name("count");
        let sem = NamedSemaphore::create(&name, 0).unwrap();
        sem.post().unwrap();
        sem.post().unwrap();
        sem.wait().unwrap();
        sem.wait().unwrap();
        sem.unlink();
    }

    #[test]
    fn test_initial_value_consumable() {
        let name = unique_name("initial");
        let sem = NamedSemaphore::create(&name, 3).unwrap();
        for _ in 0..3 {
            sem.wait().unwrap();
        }
        sem.unlink();
    }

    #[test]
    fn test_create_replaces_stale_instance() {
        let name = unique_name("stale");
        {
            let sem = NamedSemaphore::create(&name, 5).unwrap();
            // Simulate a crashed run: name left behind, handle closed.
            drop(sem);
        }
        // Re-creation starts fresh at the new initial value.
        let sem = NamedSemaphore::create(&name, 1).unwrap();
        sem.wait().unwrap();
        sem.unlink();
    }

    #[test]
    fn test_interior_nul_rejected() {
        let err = NamedSemaphore::create("/bad\0name", 0).unwrap_err();
        assert!(matches!(err, ShroudError::InvalidNamespace(_)));
    }
}
