//! Fixed-size thread pool with result handles.
//!
//! N workers share one FIFO task queue. `submit` returns a [`TaskHandle`]
//! immediately; the task's return value, or its panic, is delivered through
//! that handle and nowhere else. A panicking task never takes down its
//! worker.
//!
//! `shutdown` stops intake, lets the workers drain everything already queued
//! and joins them. It runs implicitly on drop.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{PoolError, TaskError};

/// A unit of work; the argument is the index of the worker running it.
type Job = Box<dyn FnOnce(usize) + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pool construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads. Must be non-zero.
    pub workers: usize,
    /// Worker threads are named `{thread_name}-{index}`.
    pub thread_name: String,
    /// Stack size for each worker, or the platform default.
    pub stack_size: Option<usize>,
}

impl PoolConfig {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            thread_name: "ck-worker".to_string(),
            stack_size: None,
        }
    }

    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for PoolConfig {
    /// One worker per available core, or 4 if that cannot be determined.
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(4, NonZeroUsize::get);
        Self::new(workers)
    }
}

struct PoolState {
    tasks: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Shared {
    /// Next job, or `None` once the pool is stopping and the queue is drained.
    fn next_job(&self) -> Option<Job> {
        let guard = lock(&self.state);
        let mut state = self
            .available
            .wait_while(guard, |s| s.tasks.is_empty() && !s.stopping)
            .unwrap_or_else(PoisonError::into_inner);
        state.tasks.pop_front()
    }

    fn stop(&self) -> usize {
        let mut state = lock(&self.state);
        state.stopping = true;
        let pending = state.tasks.len();
        drop(state);
        self.available.notify_all();
        pending
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    while let Some(job) = shared.next_job() {
        job(index);
    }
    trace!(worker = index, "worker exiting");
}

/// A fixed set of worker threads consuming a shared task queue.
pub struct FixedThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl FixedThreadPool {
    /// Pool with `workers` threads and default naming.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new(workers))
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                tasks: VecDeque::new(),
                stopping: false,
            }),
            available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            match spawn_worker(&config, Arc::clone(&shared), index) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.stop();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(
            workers = config.workers,
            thread_name = %config.thread_name,
            "thread pool started"
        );
        Ok(Self {
            shared,
            workers: Mutex::new(handles),
            worker_count: config.workers,
        })
    }

    /// Queue `task` and return a handle to its result.
    ///
    /// Fails with [`PoolError::ShuttingDown`] once `shutdown` has begun; the
    /// task is dropped unrun.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = Arc::new(Slot::new());
        let completion = Completion {
            slot: Some(Arc::clone(&slot)),
        };

        let job: Job = Box::new(move |worker| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(worker, %message, "task panicked");
                TaskError::Panicked { message }
            });
            completion.complete(outcome);
        });

        let mut state = lock(&self.shared.state);
        if state.stopping {
            return Err(PoolError::ShuttingDown);
        }
        state.tasks.push_back(job);
        drop(state);
        self.shared.available.notify_one();

        Ok(TaskHandle { slot })
    }

    /// Stop accepting tasks, run everything already queued, join the workers.
    ///
    /// Idempotent. Called from inside a pool task it joins every worker but
    /// its own.
    pub fn shutdown(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        if handles.is_empty() {
            return;
        }

        let pending = self.shared.stop();
        debug!(pending, workers = handles.len(), "thread pool shutting down");

        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked outside a task");
            }
        }
        debug!("thread pool shut down");
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Tasks queued but not yet picked up by a worker.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        lock(&self.shared.state).tasks.len()
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared.state).stopping
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for FixedThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("FixedThreadPool")
            .field("workers", &self.worker_count)
            .field("pending", &state.tasks.len())
            .field("stopping", &state.stopping)
            .finish()
    }
}

fn spawn_worker(config: &PoolConfig, shared: Arc<Shared>, index: usize) -> io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name, index));
    if let Some(bytes) = config.stack_size {
        builder = builder.stack_size(bytes);
    }
    builder.spawn(move || worker_loop(&shared, index))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct Slot<R> {
    result: Mutex<Option<Result<R, TaskError>>>,
    done: Condvar,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn fill(&self, outcome: Result<R, TaskError>) {
        *lock(&self.result) = Some(outcome);
        self.done.notify_all();
    }
}

/// Producer side of a [`TaskHandle`]. Dropped unfilled, it reports
/// [`TaskError::Canceled`].
struct Completion<R> {
    slot: Option<Arc<Slot<R>>>,
}

impl<R> Completion<R> {
    fn complete(mut self, outcome: Result<R, TaskError>) {
        if let Some(slot) = self.slot.take() {
            slot.fill(outcome);
        }
    }
}

impl<R> Drop for Completion<R> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.fill(Err(TaskError::Canceled));
        }
    }
}

/// The eventual result of a submitted task.
#[must_use = "a task's panic is only observable through its handle"]
pub struct TaskHandle<R> {
    slot: Arc<Slot<R>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task finishes and take its result.
    pub fn join(self) -> Result<R, TaskError> {
        let guard = lock(&self.slot.result);
        let mut result = self
            .slot
            .done
            .wait_while(guard, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        result.take().unwrap_or(Err(TaskError::Canceled))
    }

    /// Wait up to `timeout` for the task to finish. Returns whether it has.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = lock(&self.slot.result);
        let (result, _) = self
            .slot
            .done
            .wait_timeout_while(guard, timeout, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        result.is_some()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        lock(&self.slot.result).is_some()
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
