//! Fixed-size worker pool
//!
//! Workers sleep on a condition variable until a task is queued, take it off
//! the FIFO queue and run it with the queue unlocked. Dropping the [`Pool`]
//! stops accepting tasks, lets the workers drain what is already queued and
//! joins them. A panicking task is logged and does not take its worker
//! down.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: VecDeque<Task>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    cv: Condvar,
}

pub struct Pool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Start `workers` worker threads
    ///
    /// # Errors
    ///
    /// Returns the OS error if a thread cannot be spawned. Threads already
    /// started are shut down.
    pub fn new(workers: NonZeroUsize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(workers.get()),
        };
        for id in 0..workers.get() {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("graphsync-worker-{id}"))
                .spawn(move || run_worker(id, &shared))?;
            pool.workers.push(handle);
        }
        debug!(workers = workers.get(), "pool started");
        Ok(pool)
    }

    /// One worker per available CPU
    ///
    /// # Errors
    ///
    /// Returns the OS error if a thread cannot be spawned.
    pub fn with_default_size() -> std::io::Result<Self> {
        let workers = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(workers)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `task` and wake one worker
    pub fn launch<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.lock().tasks.push_back(Box::new(task));
        self.shared.cv.notify_one();
    }

    /// Tasks queued but not yet picked up by a worker
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }
}

fn run_worker(id: usize, shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if queue.closed {
                    trace!(worker = id, "worker exiting");
                    return;
                }
                shared.cv.wait(&mut queue);
            }
        };
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            warn!(worker = id, "task panicked");
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shared.queue.lock().closed = true;
        self.shared.cv.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("pool worker panicked");
            }
        }
        debug!("pool stopped");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending())
            .finish()
    }
}
