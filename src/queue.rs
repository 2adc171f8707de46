use crate::list::IntrusiveList;
use crate::task::{Header, RawTask};
use parking_lot::{Condvar, Mutex};

/// FIFO queue of pending tasks, one per worker thread.
///
/// Producers may push from any thread. Blocking [`pop`](TaskQueue::pop) is
/// meant for exactly one dedicated consumer per queue: a single push wakes a
/// single waiter. The `try_` variants never block, not even on lock
/// contention, so workers can steal from each other's queues without
/// stalling.
pub(crate) struct TaskQueue {
    inner: Mutex<Inner>,
    /// Signalled on the empty -> non-empty transition and on `abort`.
    not_empty: Condvar,
}

struct Inner {
    tasks: IntrusiveList<Header>,
    /// One-way flag: once set, blocking pops stop waiting and pushes are
    /// rejected. Never cleared.
    aborted: bool,
}

// Safety: the list's raw links are only touched under `inner`'s mutex, and
// task ownership moves with the RawTask handles across push/pop.
unsafe impl Send for Inner {}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: IntrusiveList::new(),
                aborted: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Appends `task`, waking the consumer if the queue was empty.
    ///
    /// Returns `false` without enqueueing once the queue is aborted: the
    /// queue will never be serviced again, so the caller keeps ownership and
    /// must disable the task itself.
    pub(crate) fn push(&self, task: RawTask) -> bool {
        let mut inner = self.inner.lock();
        self.push_locked(&mut inner, task)
    }

    /// As [`push`](TaskQueue::push), but returns `false` immediately when the
    /// lock is contended.
    #[allow(unused)]
    pub(crate) fn try_push(&self, task: RawTask) -> bool {
        match self.inner.try_lock() {
            Some(mut inner) => self.push_locked(&mut inner, task),
            None => false,
        }
    }

    fn push_locked(&self, inner: &mut Inner, task: RawTask) -> bool {
        if inner.aborted {
            return false;
        }

        let was_empty = inner.tasks.is_empty();
        // Safety: the task is a live heap allocation owned by the queue until
        // it is popped again.
        unsafe { inner.tasks.push_back(task.header_ptr()) };

        if was_empty {
            self.not_empty.notify_one();
        }
        true
    }

    /// Removes the front task, blocking while the queue is empty and not
    /// aborted.
    ///
    /// Once the queue is aborted this never blocks: it returns the remaining
    /// tasks in order, then `None` forever, which is exactly the drain a
    /// stopping worker needs.
    pub(crate) fn pop(&self) -> Option<RawTask> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = Self::pop_locked(&mut inner) {
                return Some(task);
            }
            if inner.aborted {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Removes the front task, returning `None` immediately when the queue is
    /// empty or the lock is contended.
    pub(crate) fn try_pop(&self) -> Option<RawTask> {
        let mut inner = self.inner.try_lock()?;
        Self::pop_locked(&mut inner)
    }

    fn pop_locked(inner: &mut Inner) -> Option<RawTask> {
        let header = inner.tasks.pop_front()?;
        // Safety: the header was pushed from an owning RawTask; popping moves
        // that ownership to the caller.
        Some(unsafe { RawTask::from_raw(header) })
    }

    /// Permanently aborts the queue and wakes every waiter. Idempotent.
    pub(crate) fn abort(&self) {
        let mut inner = self.inner.lock();
        if !inner.aborted {
            inner.aborted = true;
            self.not_empty.notify_all();
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        debug_assert!(
            self.inner.get_mut().tasks.is_empty(),
            "queue dropped with tasks still linked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ProbeLog, ProbeTask};
    use static_assertions::assert_impl_all;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    assert_impl_all!(TaskQueue: Send, Sync);

    #[test]
    fn test_pop_is_fifo() {
        let queue = TaskQueue::new();
        let log = ProbeLog::new(5);

        for index in 0..5 {
            assert!(queue.push(ProbeTask::allocate(index, &log)));
        }
        while let Some(task) = queue.try_pop() {
            task.start();
        }

        assert_eq!(*log.started.lock(), vec![0, 1, 2, 3, 4]);
        assert!(log.disabled.lock().is_empty());
    }

    #[test]
    fn test_push_wakes_blocked_pop() {
        let queue = Arc::new(TaskQueue::new());
        let log = ProbeLog::new(1);

        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            move || queue.pop()
        });

        // Give the consumer a chance to actually block.
        thread::sleep(Duration::from_millis(50));
        assert!(queue.push(ProbeTask::allocate(0, &log)));

        let task = consumer
            .join()
            .expect("consumer panicked")
            .expect("woken consumer expects a task");
        task.start();
        assert_eq!(*log.started.lock(), vec![0]);
    }

    #[test]
    fn test_abort_unblocks_pop_and_is_idempotent() {
        let queue = Arc::new(TaskQueue::new());

        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            move || queue.pop()
        });

        thread::sleep(Duration::from_millis(50));
        queue.abort();
        assert!(consumer.join().expect("consumer panicked").is_none());

        queue.abort();
        assert!(queue.pop().is_none());
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_push_rejected_after_abort() {
        let queue = TaskQueue::new();
        let log = ProbeLog::new(1);

        queue.abort();
        let task = ProbeTask::allocate(0, &log);
        assert!(!queue.push(task));
        assert!(!queue.try_push(task));

        // The caller keeps ownership and delivers the terminal action.
        task.disable();
        assert_eq!(*log.disabled.lock(), vec![0]);
    }

    #[test]
    fn test_pop_drains_remaining_tasks_after_abort() {
        let queue = TaskQueue::new();
        let log = ProbeLog::new(3);

        for index in 0..3 {
            assert!(queue.push(ProbeTask::allocate(index, &log)));
        }
        queue.abort();

        while let Some(task) = queue.pop() {
            task.disable();
        }

        assert_eq!(*log.disabled.lock(), vec![0, 1, 2]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_try_variants_bail_out_on_contention() {
        let queue = TaskQueue::new();
        let log = ProbeLog::new(1);
        let task = ProbeTask::allocate(0, &log);

        {
            let _guard = queue.inner.lock();
            assert!(!queue.try_push(task));
            assert!(queue.try_pop().is_none());
        }

        assert!(queue.push(task));
        let task = queue.try_pop().expect("uncontended try_pop succeeds");
        task.start();
        assert_eq!(*log.started.lock(), vec![0]);
    }
}
