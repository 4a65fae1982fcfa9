//! Pool lifecycle: resource creation, worker forking, submit and teardown.

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{debug, info, warn};

use super::sem::NamedSemaphore;
use super::shm::SharedQueue;
use super::task::Task;
use super::{MAX_TASKS, worker};
use crate::error::{Result, ShroudError};

/// Default number of worker processes.
pub const DEFAULT_WORKERS: usize = 4;

/// Default namespace tag for the shared queue resources.
const DEFAULT_NAMESPACE: &str = "shroud";

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker processes to fork.
    pub worker_count: usize,
    /// Tag the shared memory object and semaphore names derive from.
    /// Pools with different tags coexist on the same host.
    pub namespace: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Derived system object names for one namespace tag.
struct ResourceNames {
    queue: String,
    items: String,
    empty_slots: String,
}

impl ResourceNames {
    fn from_tag(tag: &str) -> Result<Self> {
        if tag.is_empty() || tag.contains(['/', '\0']) {
            return Err(ShroudError::InvalidNamespace(tag.to_string()));
        }
        Ok(Self {
            queue: format!("/{tag}_queue"),
            items: format!("/{tag}_items"),
            empty_slots: format!("/{tag}_empty_slots"),
        })
    }
}

/// A pool of forked worker processes consuming from the shared queue.
///
/// Construction creates the queue segment and both semaphores (stale
/// same-named leftovers are removed first) and forks the workers; any
/// resource-creation failure aborts construction, there is no degraded mode.
/// The controller owns the pool; workers never submit.
pub struct Pool {
    queue: SharedQueue,
    items: NamedSemaphore,
    empty_slots: NamedSemaphore,
    workers: Vec<Pid>,
}

impl Pool {
    /// Create the shared resources and fork `config.worker_count` workers,
    /// each entering the consume loop immediately.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let names = ResourceNames::from_tag(&config.namespace)?;

        let items = NamedSemaphore::create(&names.items, 0)?;
        let empty_slots = NamedSemaphore::create(&names.empty_slots, MAX_TASKS as u32)?;
        let queue = SharedQueue::create(&names.queue)?;

        let mut workers = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            // Safety: the controller is single-threaded with respect to the
            // queue; the child only touches the inherited mapping and
            // semaphore handles before exiting.
            match unsafe { fork() }? {
                ForkResult::Child => worker::run(id, &queue, &items, &empty_slots),
                ForkResult::Parent { child } => {
                    debug!(worker = id, pid = child.as_raw(), "forked worker");
                    workers.push(child);
                }
            }
        }

        info!(workers = workers.len(), namespace = %config.namespace, "worker pool ready");
        Ok(Self {
            queue,
            items,
            empty_slots,
            workers,
        })
    }

    /// Number of workers forked at construction.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue one task, blocking while the queue is full.
    ///
    /// Classic bounded-buffer submit: reserve a free slot, write under the
    /// mutex, then publish the item. If publishing fails the reserved slot is
    /// returned so queue capacity is not lost.
    pub fn submit(&self, task: Task) -> Result<()> {
        self.empty_slots.wait()?;

        let encoded = task.encode();
        if let Err(e) = self.queue.write_slot(&encoded) {
            let _ = self.empty_slots.post();
            return Err(e);
        }
        if let Err(e) = self.items.post() {
            let _ = self.empty_slots.post();
            return Err(e);
        }
        Ok(())
    }

    /// Enqueue one stop task per worker. Does not wait for the workers to
    /// drain them; call [`Pool::join`] for that.
    pub fn terminate(&self) -> Result<()> {
        debug!(workers = self.workers.len(), "enqueueing stop tasks");
        for _ in 0..self.workers.len() {
            self.submit(Task::Stop)?;
        }
        Ok(())
    }

    /// Reap every forked worker, in fork order. Each PID is waited on
    /// exactly once; a second call is a no-op.
    pub fn join(&mut self) -> Result<()> {
        for pid in self.workers.drain(..) {
            loop {
                match waitpid(pid, None) {
                    Ok(_) => break,
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!("all workers joined");
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Orderly-shutdown fallback for a pool dropped with live workers.
        if !self.workers.is_empty() {
            warn!("pool dropped with live workers, stopping them");
            let _ = self.terminate();
            let _ = self.join();
        }
        // Remove the semaphore names; the queue segment unlinks itself when
        // its field drops, and both semaphore handles close the same way.
        self.items.unlink();
        self.empty_slots.unlink();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::task::Action;
    use serial_test::serial;
    use std::time::{Duration, Instant};

    fn test_config(suffix: &str, workers: usize) -> PoolConfig {
        PoolConfig {
            worker_count: workers,
            namespace: format!("shroud_test_{}_{suffix}", std::process::id()),
        }
    }

    #[test]
    fn test_resource_names_from_tag() {
        let names = ResourceNames::from_tag("shroud").unwrap();
        assert_eq!(names.queue, "/shroud_queue");
        assert_eq!(names.items, "/shroud_items");
        assert_eq!(names.empty_slots, "/shroud_empty_slots");
    }

    #[test]
    fn test_resource_names_reject_bad_tags() {
        assert!(ResourceNames::from_tag("").is_err());
        assert!(ResourceNames::from_tag("a/b").is_err());
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_count, DEFAULT_WORKERS);
        assert_eq!(config.namespace, "shroud");
    }

    #[test]
    fn test_submit_consume_fifo() {
        // A pool with no workers leaves the consumer side to the test.
        let pool = Pool::new(test_config("fifo", 0)).unwrap();
        for i in 0..5 {
            pool.submit(Task::work(Action::Encrypt, format!("/tmp/f{i}"), ""))
                .unwrap();
        }
        for i in 0..5 {
            pool.items.wait().unwrap();
            let raw = pool.queue.read_slot().unwrap();
            pool.empty_slots.post().unwrap();
            assert_eq!(raw, format!("encrypt,/tmp/f{i},"));
        }
    }

    #[test]
    #[serial]
    fn test_submit_blocks_when_full() {
        let pool = Pool::new(test_config("full", 0)).unwrap();
        for i in 0..MAX_TASKS {
            pool.submit(Task::work(Action::Encrypt, format!("/tmp/f{i}"), ""))
                .unwrap();
        }

        // A helper process frees one slot after a delay; the blocked submit
        // must complete only after that.
        let delay = Duration::from_millis(200);
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                std::thread::sleep(delay);
                pool.items.wait().unwrap();
                pool.queue.read_slot().unwrap();
                pool.empty_slots.post().unwrap();
                std::process::exit(0);
            }
            ForkResult::Parent { child } => {
                let start = Instant::now();
                pool.submit(Task::work(Action::Encrypt, "/tmp/late", ""))
                    .unwrap();
                assert!(start.elapsed() >= delay / 2, "submit did not block");
                waitpid(child, None).unwrap();
            }
        }
    }

    #[test]
    #[serial]
    fn test_terminate_join_no_work() {
        let mut pool = Pool::new(test_config("idle", 3)).unwrap();
        assert_eq!(pool.worker_count(), 3);
        pool.terminate().unwrap();
        pool.join().unwrap();
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    #[serial]
    fn test_reconstruct_after_teardown() {
        let config = test_config("reuse", 2);
        {
            let mut pool = Pool::new(config.clone()).unwrap();
            pool.terminate().unwrap();
            pool.join().unwrap();
        }
        // No leaked named resources block a second pool with the same tag.
        let mut pool = Pool::new(config).unwrap();
        pool.terminate().unwrap();
        pool.join().unwrap();
    }

    #[test]
    #[serial]
    fn test_end_to_end_two_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"alpha").unwrap();
        std::fs::write(&b, b"bravo").unwrap();

        let mut pool = Pool::new(test_config("e2e", 2)).unwrap();
        pool.submit(Task::work(Action::Encrypt, &a, "pw1")).unwrap();
        pool.submit(Task::work(Action::Encrypt, &b, "pw2")).unwrap();
        pool.terminate().unwrap();
        pool.join().unwrap();

        // Each task ran exactly once in some worker: the originals were
        // renamed and locked.
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(dir.path().join("a.txt.encrypted").exists());
        assert!(dir.path().join("b.txt.encrypted").exists());
        assert!(dir.path().join("a.txt.encrypted.lock").exists());
        assert!(dir.path().join("b.txt.encrypted.lock").exists());
    }

    #[test]
    #[serial]
    fn test_drop_stops_live_workers() {
        let pool = Pool::new(test_config("drop", 2)).unwrap();
        // Dropping without terminate/join must still stop and reap workers.
        drop(pool);
        let _ = Pool::new(test_config("drop", 1))
            .map(|mut p| {
                p.terminate().unwrap();
                p.join().unwrap();
            })
            .unwrap();
    }
}
