//! Worker process pool fed by a bounded queue in shared memory.
//!
//! The controller forks a fixed number of worker processes at pool
//! construction. Tasks travel through a fixed-capacity circular buffer placed
//! in POSIX shared memory, guarded by a process-shared mutex and paced by two
//! named counting semaphores (occupied slots / free slots), so producer and
//! consumers block instead of spinning.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │    Controller    │
//!                  │  (submit tasks)  │
//!                  └────────┬─────────┘
//!                           │ shm queue + semaphores
//!            ┌──────────────┼──────────────┐
//!            │              │              │
//!      ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!      │ Worker 1  │  │ Worker 2  │  │ Worker N  │
//!      │ (process) │  │ (process) │  │ (process) │
//!      └───────────┘  └───────────┘  └───────────┘
//! ```
//!
//! Shutdown is cooperative: the controller enqueues one stop task per worker,
//! each worker exits after dequeuing one, and `join` reaps every child.
//! Workers are processes rather than threads so a crashing transform cannot
//! corrupt the controller's address space; the queue state they share is
//! limited to the mapped segment.

mod manager;
mod sem;
mod shm;
mod task;
mod worker;

pub use manager::{DEFAULT_WORKERS, Pool, PoolConfig};
pub use task::{Action, Task};

/// Queue capacity in slots.
pub const MAX_TASKS: usize = 1000;

/// Maximum bytes per serialized task, including the NUL terminator.
///
/// Longer task strings are silently truncated to fit a slot; callers must
/// keep encoded tasks under this limit.
pub const TASK_STR_LEN: usize = 256;
