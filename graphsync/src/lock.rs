//! Exclusive task lock
//!
//! [`TaskLock`] guards a value with one mutual exclusion and distinguishes
//! two kinds of holders:
//!
//! - **short sections** ([`TaskLock::read`], [`TaskLock::write`]): acquire,
//!   do a bit of work, release;
//! - **one long task** ([`TaskLock::lock_long`]): a named, cancellable
//!   computation (e.g. a layout pass) that keeps exclusive ownership across
//!   many cooperative [`yield_now`](LongGuard::yield_now) points.
//!
//! # States
//!
//! ```text
//!            read/write              lock_long
//!   Idle  <------------>  Held  ----------------> LongTaskRunning{name}
//!    ^                                                 |       ^
//!    |              drop(LongGuard)                    |       | yield_now:
//!    +-------------------------------------------------+       | release, wait for
//!                                                              | waiters == 0,
//!                                                              | reacquire
//! ```
//!
//! While a long task runs, short writes fail fast with
//! [`GraphError::Busy`]; short reads are let through at the task's yield
//! points.
//!
//! # Lock ordering
//!
//! `data` before `state`. The `state` mutex is only ever held for a few
//! field updates and is never held while waiting on `data`.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

use crate::emitter::Emitter;
use crate::error::GraphError;

#[derive(Debug, Default)]
struct State {
    long_task: Option<String>,
    cancelled: bool,
    /// Threads blocked on acquiring `data`
    waiters: usize,
}

/// Observable state of a [`TaskLock`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Idle,
    Held,
    LongTaskRunning { name: String, cancel_requested: bool },
}

pub struct TaskLock<T> {
    name: String,
    data: Mutex<T>,
    state: Mutex<State>,
    no_waiters: Condvar,
    status_change: Emitter<Option<String>>,
}

impl<T> TaskLock<T> {
    /// `name` is the resource name reported in `Busy` errors
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(value),
            state: Mutex::new(State::default()),
            no_waiters: Condvar::new(),
            status_change: Emitter::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emits `Some(task)` when a long task starts and `None` when it ends
    #[must_use]
    pub fn status_change(&self) -> &Emitter<Option<String>> {
        &self.status_change
    }

    #[must_use]
    pub fn status(&self) -> LockStatus {
        let state = self.state.lock();
        match &state.long_task {
            Some(name) => LockStatus::LongTaskRunning {
                name: name.clone(),
                cancel_requested: state.cancelled,
            },
            None if self.data.is_locked() => LockStatus::Held,
            None => LockStatus::Idle,
        }
    }

    /// Name of the running long task, if any
    #[must_use]
    pub fn running_task(&self) -> Option<String> {
        self.state.lock().long_task.clone()
    }

    /// Short read section
    ///
    /// Never fails. Blocks until the mutual exclusion is free, which, while a
    /// long task runs, happens at the task's next yield point.
    pub fn read(&self) -> ReadGuard<'_, T> {
        ReadGuard {
            guard: self.acquire(),
        }
    }

    /// Short write section
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] naming the task if a long task is running,
    /// either when called or by the time the mutual exclusion is acquired.
    pub fn write(&self) -> Result<WriteGuard<'_, T>, GraphError> {
        self.check_writable()?;
        let guard = self.acquire();
        self.check_writable()?;
        Ok(WriteGuard { guard })
    }

    /// Start the long task `task_name`, waiting for an in-flight short
    /// section to finish first
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] if another long task is running.
    pub fn lock_long(&self, task_name: &str) -> Result<LongGuard<'_, T>, GraphError> {
        self.check_no_long_task(task_name)?;
        let guard = self.acquire();
        self.begin_long(task_name, guard)
    }

    /// Like [`lock_long`](Self::lock_long), but fails instead of waiting for
    /// an in-flight short section
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] if the lock is held by anyone.
    pub fn try_lock_long(&self, task_name: &str) -> Result<LongGuard<'_, T>, GraphError> {
        self.check_no_long_task(task_name)?;
        let Some(guard) = self.data.try_lock() else {
            warn!(lock = %self.name, task = task_name, "long task rejected: short section in flight");
            return Err(self.busy(None));
        };
        self.begin_long(task_name, guard)
    }

    /// Ask the running long task to stop at its next yield point
    ///
    /// Returns whether a long task was running. The request is forgotten when
    /// the next long task starts.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        state.cancelled = true;
        match &state.long_task {
            Some(task) => {
                info!(lock = %self.name, task = %task, "cancellation requested");
                true
            }
            None => {
                debug!(lock = %self.name, "cancel: no long task running");
                false
            }
        }
    }

    /// Run `f` in a short write section
    ///
    /// # Errors
    ///
    /// Returns `Busy` if the section cannot be entered, or the error of `f`.
    pub fn with_write<R, F>(&self, f: F) -> Result<R, GraphError>
    where
        F: FnOnce(&mut T) -> Result<R, GraphError>,
    {
        let mut guard = self.write()?;
        f(&mut guard)
    }

    /// Run `f` in a short read section
    pub fn with_read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.read();
        f(&guard)
    }

    fn acquire(&self) -> MutexGuard<'_, T> {
        if let Some(guard) = self.data.try_lock() {
            return guard;
        }

        self.state.lock().waiters += 1;
        let guard = self.data.lock();

        let mut state = self.state.lock();
        state.waiters -= 1;
        if state.waiters == 0 {
            self.no_waiters.notify_all();
        }
        guard
    }

    fn busy(&self, task: Option<String>) -> GraphError {
        GraphError::Busy {
            resource: self.name.clone(),
            task,
        }
    }

    fn check_writable(&self) -> Result<(), GraphError> {
        match &self.state.lock().long_task {
            Some(task) => {
                warn!(lock = %self.name, task = %task, "write rejected: long task running");
                Err(self.busy(Some(task.clone())))
            }
            None => Ok(()),
        }
    }

    fn check_no_long_task(&self, task_name: &str) -> Result<(), GraphError> {
        match &self.state.lock().long_task {
            Some(running) => Err(self.reject_long(task_name, running)),
            None => Ok(()),
        }
    }

    fn reject_long(&self, task_name: &str, running: &str) -> GraphError {
        warn!(lock = %self.name, task = task_name, running = %running, "long task rejected");
        self.busy(Some(running.to_string()))
    }

    fn begin_long<'a>(
        &'a self,
        task_name: &str,
        guard: MutexGuard<'a, T>,
    ) -> Result<LongGuard<'a, T>, GraphError> {
        {
            let mut state = self.state.lock();
            if let Some(running) = &state.long_task {
                return Err(self.reject_long(task_name, running));
            }
            state.long_task = Some(task_name.to_string());
            state.cancelled = false;
        }

        info!(lock = %self.name, task = task_name, "long task started");
        self.status_change.emit(Some(task_name.to_string()));

        Ok(LongGuard {
            lock: self,
            guard,
            task: task_name.to_string(),
        })
    }
}

impl<T> fmt::Debug for TaskLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLock")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Short read section, see [`TaskLock::read`]
pub struct ReadGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

/// Short write section, see [`TaskLock::write`]
pub struct WriteGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Exclusive ownership held by a running long task
///
/// Dropping the guard ends the task and publishes `None` on the lock's
/// status channel. The guard is not `Send`: the task ends on the thread that
/// started it.
#[derive(Debug)]
pub struct LongGuard<'a, T> {
    lock: &'a TaskLock<T>,
    guard: MutexGuard<'a, T>,
    task: String,
}

impl<T> LongGuard<'_, T> {
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Let queued short sections run, then take the lock back
    ///
    /// Releases the mutual exclusion, waits until no thread is waiting to
    /// acquire it, reacquires it. Returns `false` if cancellation was
    /// requested and the task should abort.
    pub fn yield_now(&mut self) -> bool {
        let lock = self.lock;
        MutexGuard::unlocked(&mut self.guard, || {
            let mut state = lock.state.lock();
            while state.waiters > 0 {
                lock.no_waiters.wait(&mut state);
            }
        });
        !self.lock.state.lock().cancelled
    }

    /// [`yield_now`](Self::yield_now) as a `Result`, for use with `?`
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&mut self) -> Result<(), GraphError> {
        if self.yield_now() {
            Ok(())
        } else {
            info!(lock = %self.lock.name, task = %self.task, "long task cancelled");
            Err(GraphError::Cancelled {
                task: self.task.clone(),
            })
        }
    }
}

impl<T> Deref for LongGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LongGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LongGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut state = self.lock.state.lock();
            state.long_task = None;
            state.cancelled = false;
        }
        info!(lock = %self.lock.name, task = %self.task, "long task ended");
        // Still holding the mutual exclusion: `guard` is released after this
        self.lock.status_change.emit(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{mpsc, Arc};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn test_short_sections() {
        let lock = TaskLock::new("State", 0u32);
        assert_eq!(lock.status(), LockStatus::Idle);
        {
            let mut guard = lock.write().unwrap();
            *guard += 1;
            assert_eq!(lock.status(), LockStatus::Held);
        }
        assert_eq!(*lock.read(), 1);
        assert_eq!(lock.status(), LockStatus::Idle);
    }

    #[test]
    fn test_write_fails_while_long_task_runs() {
        let lock = TaskLock::new("State", ());
        let (tx, rx) = mpsc::channel();
        lock.status_change().observe(move |s: &Option<String>| tx.send(s.clone()).unwrap());

        let task = lock.lock_long("layout").unwrap();
        assert_eq!(task.task(), "layout");

        let err = lock.write().err().unwrap();
        assert_eq!(
            err,
            GraphError::Busy {
                resource: "State".to_string(),
                task: Some("layout".to_string()),
            }
        );
        assert!(lock.lock_long("other").is_err());

        drop(task);
        assert!(lock.write().is_ok());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Some("layout".to_string()), None]);
    }

    #[test]
    fn test_second_long_task_logged_as_long_task_rejection() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let lock = TaskLock::new("Graph", ());
        let _layout = lock.lock_long("layout").unwrap();
        tracing::subscriber::with_default(subscriber, || {
            let err = lock.lock_long("import").unwrap_err();
            assert_eq!(err.task_name(), Some("layout"));
            let err = lock.try_lock_long("import").unwrap_err();
            assert_eq!(err.task_name(), Some("layout"));
        });

        let out = logs.contents();
        assert_eq!(out.matches("long task rejected").count(), 2, "{out}");
        assert!(!out.contains("write rejected"), "{out}");
        assert_eq!(lock.running_task().as_deref(), Some("layout"));
    }

    #[test]
    fn test_try_lock_long_fails_during_short_section() {
        let lock = TaskLock::new("State", ());
        let guard = lock.read();
        let err = lock.try_lock_long("layout").err().unwrap();
        assert_eq!(err.task_name(), None);
        drop(guard);
        assert!(lock.try_lock_long("layout").is_ok());
    }

    #[test]
    fn test_cancel_observed_at_yield() {
        let lock = TaskLock::new("State", ());
        assert!(!lock.cancel());

        // a request made before the task starts is cleared
        let mut task = lock.lock_long("layout").unwrap();
        assert!(task.yield_now());

        assert!(lock.cancel());
        assert_eq!(
            lock.status(),
            LockStatus::LongTaskRunning {
                name: "layout".to_string(),
                cancel_requested: true,
            }
        );
        assert!(!task.yield_now());
        assert!(matches!(task.checkpoint(), Err(GraphError::Cancelled { .. })));
    }

    #[test]
    fn test_with_write_propagates_errors() {
        let lock = TaskLock::new("State", 5);
        let result: Result<(), GraphError> = lock.with_write(|v| {
            *v = 6;
            Err(GraphError::other("abandoned"))
        });
        assert_eq!(result, Err(GraphError::other("abandoned")));
        assert_eq!(lock.with_read(|v| *v), 6);
        assert_eq!(lock.status(), LockStatus::Idle);
    }
}
