//! Work-stealing thread pool.
//!
//! One FIFO queue per worker; submission is round-robin across the queues,
//! and a worker scans every queue (starting at its own) before blocking on
//! its own. Teardown guarantees that every task pushed before it began
//! receives exactly one of its two terminal actions.

mod worker;

#[cfg(test)]
mod tests;

use crate::exec::CpuScheduler;
use crate::pool::worker::Worker;
use crate::queue::TaskQueue;
use crate::stop::StopSource;
use crate::sync::CountdownLatch;
use crate::task::RawTask;
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

pub(crate) type ThreadNameFn = Arc<dyn Fn() -> String + Send + Sync + 'static>;

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));

    Arc::new(move || {
        let prev = counter.fetch_add(1, Ordering::Relaxed);
        format!("spool-worker-{}", prev)
    })
}

/// Configures and builds a [`ThreadPool`].
pub struct Builder {
    /// The number of worker threads. Defaults to one per CPU core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the pool.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the pool.
    thread_stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
        }
    }

    pub fn worker_threads(&mut self, val: usize) -> &mut Self {
        assert!(val > 0, "Worker threads cannot be set to 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the name of threads spawned by the pool.
    ///
    /// The default name is "spool-worker-{N}".
    pub fn thread_name(&mut self, val: impl Into<String>) -> &mut Self {
        let val = val.into();
        self.thread_name = Arc::new(move || val.clone());
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// pool.
    pub fn thread_name_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = Arc::new(f);
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater if the platform specifies a
    /// minimal stack size.
    pub fn thread_stack_size(&mut self, val: usize) -> &mut Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Spawns the worker threads and returns the running pool.
    pub fn build(&mut self) -> ThreadPool {
        let worker_threads = self
            .worker_threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get));

        let core = Arc::new(PoolCore::new(worker_threads));

        // The constructor counts too, so the pool is only handed back once
        // every worker thread is up and running.
        let ready = Arc::new(CountdownLatch::new(worker_threads + 1));

        let mut stops = Vec::with_capacity(worker_threads);
        let handles = (0..worker_threads)
            .map(|index| {
                let stop = StopSource::new();
                let worker = Worker::new(index, Arc::clone(&core), stop.token());
                stops.push(stop);
                self.spawn_worker(worker, Arc::clone(&ready))
            })
            .collect::<HashMap<_, _>>();

        ready.arrive_and_wait();

        ThreadPool {
            core,
            handles: Mutex::new(handles),
            stops,
        }
    }

    fn spawn_worker(
        &self,
        worker: Worker,
        ready: Arc<CountdownLatch>,
    ) -> (ThreadId, thread::JoinHandle<()>) {
        let mut builder = thread::Builder::new().name((*self.thread_name)());

        if let Some(stack_size) = self.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || {
                ready.arrive_and_wait();
                worker.run();
            })
            .expect("failed to spawn worker thread");

        (handle.thread().id(), handle)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the pool handle, its workers, and every scheduler handle
/// derived from the pool.
pub(crate) struct PoolCore {
    /// One queue per worker; workers steal from each other through `try_pop`.
    queues: Vec<TaskQueue>,

    /// Round-robin cursor for task submission.
    next_queue: AtomicUsize,

    /// Every worker arrives here once it observes its stop request. After the
    /// last arrival no worker will steal from any queue again, so each one
    /// can safely drain and disable its own remaining tasks.
    quiesce: CountdownLatch,
}

impl PoolCore {
    fn new(worker_threads: usize) -> Self {
        Self {
            queues: (0..worker_threads).map(|_| TaskQueue::new()).collect(),
            next_queue: AtomicUsize::new(0),
            quiesce: CountdownLatch::new(worker_threads),
        }
    }

    /// Distributes `task` round-robin across the worker queues.
    ///
    /// A task pushed once teardown has begun is disabled immediately on the
    /// calling thread: its queue would never be serviced again, and
    /// rejecting-then-disabling keeps the exactly-once completion guarantee
    /// instead of leaking the task.
    pub(crate) fn push(&self, task: RawTask) {
        let slot = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        if !self.queues[slot].push(task) {
            task.disable();
        }
    }
}

impl fmt::Debug for PoolCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolCore")
            .field("workers", &self.queues.len())
            .finish_non_exhaustive()
    }
}

/// A fixed-size pool of worker threads consuming tasks from per-worker FIFO
/// queues.
///
/// Submission is round-robin. A worker prefers its own queue but scans every
/// other queue before blocking, so a backlog on one queue is stolen by idle
/// workers; FIFO order holds per queue, not across the pool. Dropping the
/// pool stops the workers, aborts the queues, and joins; every task pushed
/// before teardown began receives exactly one of `start`/`disable`.
pub struct ThreadPool {
    core: Arc<PoolCore>,
    handles: Mutex<HashMap<ThreadId, thread::JoinHandle<()>>>,
    /// One stop source per worker; requesting these is the shutdown signal.
    stops: Vec<StopSource>,
}

impl ThreadPool {
    /// Spawns a pool with `worker_threads` workers and default thread
    /// configuration.
    pub fn new(worker_threads: usize) -> Self {
        Builder::new().worker_threads(worker_threads).build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Submits a task for execution on some worker.
    #[allow(unused)]
    pub(crate) fn push(&self, task: RawTask) {
        self.core.push(task);
    }

    /// The number of worker threads.
    pub fn max_concurrency(&self) -> usize {
        self.core.queues.len()
    }

    /// Returns a scheduler handle for submitting work through the
    /// [`exec`](crate::exec) protocol.
    pub fn scheduler(&self) -> CpuScheduler {
        CpuScheduler::new(Arc::clone(&self.core))
    }

    /// Joins every worker thread, reporting how many panicked.
    fn join_all(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        let errors = handles
            .drain()
            .filter_map(|(thread_id, handle)| handle.join().err().map(|_| thread_id))
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} worker thread(s) panicked", errors.len()))
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for stop in &self.stops {
            stop.request_stop();
        }
        for queue in &self.core.queues {
            queue.abort();
        }

        if let Err(e) = self.join_all() {
            eprintln!("spool: {:?} during pool shutdown", e);
        }

        // Backstop after the join: nothing else touches the queues now, so
        // anything a panicked worker failed to drain still gets disabled.
        for queue in &self.core.queues {
            while let Some(task) = queue.pop() {
                task.disable();
            }
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("max_concurrency", &self.max_concurrency())
            .finish_non_exhaustive()
    }
}
