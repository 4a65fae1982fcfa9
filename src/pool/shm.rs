//! The shared queue segment.
//!
//! One fixed-size `#[repr(C)]` struct lives in a POSIX shared memory object:
//! a circular buffer of NUL-terminated task strings, the front/rear indices,
//! and a process-shared pthread mutex guarding all of them. Forked workers
//! inherit the mapping; only the creating process tears it down.

use std::mem::MaybeUninit;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use super::{MAX_TASKS, TASK_STR_LEN};
use crate::error::Result;

/// Memory layout of the shared segment. Mutated only under `mutex`.
#[repr(C)]
struct QueueSegment {
    mutex: libc::pthread_mutex_t,
    /// Read index, next slot a consumer takes.
    front: u32,
    /// Write index, next slot a producer fills.
    rear: u32,
    /// Circular buffer of NUL-terminated task strings.
    slots: [[u8; TASK_STR_LEN]; MAX_TASKS],
}

const SEGMENT_SIZE: usize = size_of::<QueueSegment>();

/// Owning handle to the mapped queue segment.
///
/// The slot read/write primitives each take the mutex for a single access
/// plus index advance; the mutex is never held across a semaphore wait.
pub(crate) struct SharedQueue {
    seg: NonNull<QueueSegment>,
    fd: OwnedFd,
    name: String,
}

impl SharedQueue {
    /// Create and map the segment `name`, removing any stale object with the
    /// same name first, and initialize indices and the process-shared mutex.
    pub(crate) fn create(name: &str) -> Result<Self> {
        // Stale segment from a crashed prior run; absence is fine.
        let _ = shm_unlink(name);

        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;
        ftruncate(&fd, SEGMENT_SIZE as libc::off_t)?;

        let len = NonZeroUsize::new(SEGMENT_SIZE).expect("segment size is nonzero");
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )?
        };

        let queue = Self {
            seg: ptr.cast::<QueueSegment>(),
            fd,
            name: name.to_string(),
        };
        queue.init_segment()?;
        Ok(queue)
    }

    fn init_segment(&self) -> Result<()> {
        let seg = self.seg.as_ptr();
        unsafe {
            (*seg).front = 0;
            (*seg).rear = 0;

            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
            let rc = check(libc::pthread_mutexattr_setpshared(
                attr.as_mut_ptr(),
                libc::PTHREAD_PROCESS_SHARED,
            ))
            .and_then(|()| check(libc::pthread_mutex_init(&raw mut (*seg).mutex, attr.as_ptr())));
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            rc
        }
    }

    fn lock(&self) -> Result<SegmentGuard<'_>> {
        check(unsafe { libc::pthread_mutex_lock(&raw mut (*self.seg.as_ptr()).mutex) })?;
        Ok(SegmentGuard { queue: self })
    }

    /// Write one task string at `rear` and advance it.
    ///
    /// The caller must have reserved a free slot via the empty-slots
    /// semaphore; the queue itself never checks for overflow. Strings longer
    /// than a slot are truncated with a guaranteed NUL terminator.
    pub(crate) fn write_slot(&self, task: &str) -> Result<()> {
        let _guard = self.lock()?;
        let seg = self.seg.as_ptr();
        unsafe {
            let rear = (*seg).rear as usize;
            let slot = &mut (*seg).slots[rear];
            let bytes = task.as_bytes();
            let n = bytes.len().min(TASK_STR_LEN - 1);
            slot[..n].copy_from_slice(&bytes[..n]);
            slot[n] = 0;
            (*seg).rear = ((rear + 1) % MAX_TASKS) as u32;
        }
        Ok(())
    }

    /// Read the task string at `front` and advance it.
    ///
    /// The caller must have claimed an occupied slot via the items semaphore.
    pub(crate) fn read_slot(&self) -> Result<String> {
        let _guard = self.lock()?;
        let seg = self.seg.as_ptr();
        let task = unsafe {
            let front = (*seg).front as usize;
            let slot = &(*seg).slots[front];
            let len = slot
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(TASK_STR_LEN - 1);
            let task = String::from_utf8_lossy(&slot[..len]).into_owned();
            (*seg).front = ((front + 1) % MAX_TASKS) as u32;
            task
        };
        Ok(task)
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        // Each teardown step runs once even if an earlier one fails; the fd
        // closes when the field drops after this body.
        unsafe {
            libc::pthread_mutex_destroy(&raw mut (*self.seg.as_ptr()).mutex);
            let _ = munmap(self.seg.cast(), SEGMENT_SIZE);
        }
        let _ = shm_unlink(self.name.as_str());
    }
}

/// Holds the segment mutex; unlocks on drop.
struct SegmentGuard<'a> {
    queue: &'a SharedQueue,
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_unlock(&raw mut (*self.queue.seg.as_ptr()).mutex);
        }
    }
}

fn check(rc: libc::c_int) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::from_raw(rc).into())
    }
}
