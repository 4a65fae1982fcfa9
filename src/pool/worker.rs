//! The consume loop each forked worker runs.
//!
//! One iteration is one dequeue: claim an occupied slot, read it under the
//! mutex, free the slot, then either stop or hand the raw task string to the
//! executor. Executor failures are observed and logged; they never stop the
//! loop or touch queue state.

use tracing::{debug, error, warn};

use super::sem::NamedSemaphore;
use super::shm::SharedQueue;
use super::task::Task;
use crate::cipher;
use crate::error::Result;

/// Worker process entry point. Never returns; the process exits when a stop
/// task is dequeued or the queue becomes unusable.
pub(crate) fn run(
    id: usize,
    queue: &SharedQueue,
    items: &NamedSemaphore,
    empty_slots: &NamedSemaphore,
) -> ! {
    let code = match consume_loop(id, queue, items, empty_slots) {
        Ok(()) => 0,
        Err(e) => {
            error!(worker = id, error = %e, "worker loop failed");
            1
        }
    };
    std::process::exit(code);
}

fn consume_loop(
    id: usize,
    queue: &SharedQueue,
    items: &NamedSemaphore,
    empty_slots: &NamedSemaphore,
) -> Result<()> {
    loop {
        items.wait()?;
        let raw = queue.read_slot()?;
        empty_slots.post()?;

        if let Ok(Task::Stop) = Task::decode(&raw) {
            debug!(worker = id, "stop task dequeued");
            return Ok(());
        }
        if let Err(e) = cipher::process_task(&raw) {
            warn!(worker = id, task = %raw, error = %e, "task failed");
        }
    }
}
