use crate::pool::PoolCore;
use crate::stop::StopToken;
use crate::task::RawTask;
use crate::util::ScopeGuard;
use std::sync::Arc;

/// A single pool worker. It owns queue slot `index` and services it until a
/// stop is requested on its stop token.
pub(super) struct Worker {
    index: usize,
    core: Arc<PoolCore>,
    token: StopToken,
}

impl Worker {
    pub(super) fn new(index: usize, core: Arc<PoolCore>, token: StopToken) -> Self {
        Self { index, core, token }
    }

    pub(super) fn run(&self) {
        // Armed up front: even if a task panics and unwinds this thread, the
        // shutdown protocol still arrives at the quiesce latch and drains
        // this worker's queue, so pool teardown cannot hang.
        let _shutdown = ScopeGuard::new(|| self.shutdown());

        while !self.token.stop_requested() {
            if let Some(task) = self.find_task() {
                task.start();
            } else if let Some(task) = self.core.queues[self.index].pop() {
                // Only this worker ever blocks on its own queue.
                task.start();
            }
        }
    }

    /// Scans every queue for a ready task, starting at this worker's own
    /// queue, without blocking on any of them.
    fn find_task(&self) -> Option<RawTask> {
        let n = self.core.queues.len();
        (0..n).find_map(|i| self.core.queues[(self.index + i) % n].try_pop())
    }

    /// Runs once the stop request is observed. The workers first rendezvous
    /// so no late steal scan can race a drain; after that each worker
    /// disables whatever is left in its own queue.
    fn shutdown(&self) {
        self.core.quiesce.arrive_and_wait();

        while let Some(task) = self.core.queues[self.index].pop() {
            task.disable();
        }
    }
}
