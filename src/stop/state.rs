use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

/// Callback ids start at 1. Id 0 marks a callback that was never linked,
/// either because it ran inline at registration (stop already requested) or
/// because it was registered through an empty token.
pub(super) const UNLINKED_ID: u64 = 0;

type CallbackFn = Box<dyn FnOnce() + Send>;

/// Shared cancellation state: the requested flag, the live-source count, and
/// the registered callbacks.
///
/// One instance is shared, behind an `Arc`, by every source, token, and
/// callback derived from the same [`StopSource`](crate::stop::StopSource).
pub(super) struct StopState {
    /// Fast path for `stop_requested`; transitions exactly once.
    requested: AtomicBool,

    /// Number of `StopSource` handles currently alive for this state.
    sources: AtomicUsize,

    inner: Mutex<Callbacks>,

    /// Signalled after each callback invocation completes, so a deregistering
    /// thread can wait out a concurrently running callback.
    done: Condvar,
}

struct Callbacks {
    list: CallbackList,

    /// Monotonically increasing id handed to each linked callback.
    next_id: u64,

    /// Which callback the stop request is currently running, and on which
    /// thread. `None` outside of an invocation.
    executing: Option<Executing>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Executing {
    id: u64,
    thread: ThreadId,
}

// Safety: the raw list links are only dereferenced under `inner`'s mutex, and
// every linked node is kept alive by its owning StopCallback, which unlinks
// (or waits out a running invocation) before releasing the node.
unsafe impl Send for StopState {}
unsafe impl Sync for StopState {}

impl StopState {
    pub(super) fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            sources: AtomicUsize::new(0),
            inner: Mutex::new(Callbacks {
                list: CallbackList::new(),
                next_id: UNLINKED_ID,
                executing: None,
            }),
            done: Condvar::new(),
        }
    }

    pub(super) fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(super) fn stop_possible(&self) -> bool {
        self.stop_requested() || self.sources.load(Ordering::Acquire) > 0
    }

    pub(super) fn add_source(&self) {
        self.sources.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn remove_source(&self) {
        let prev = self.sources.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "source count underflow");
    }

    /// Transitions not-requested -> requested. Exactly one caller across all
    /// handles of this state gets `true`; that caller synchronously runs
    /// every registered callback, in registration order, before returning.
    pub(super) fn request_stop(&self) -> bool {
        if self
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let mut inner = self.inner.lock();
        while let Some(node) = inner.list.pop_front() {
            // Safety: a node stays alive while `executing` says its
            // invocation is in flight; the owning StopCallback waits for that
            // to clear before releasing it (unless it is this very thread).
            let node_ref = unsafe { node.as_ref() };
            let callback = node_ref.callback.take();
            inner.executing = Some(Executing {
                id: node_ref.id.get(),
                thread: thread::current().id(),
            });

            // Run outside the lock so the callback may register, deregister,
            // or destroy callbacks, including its own registration. The node
            // may be freed while unlocked, so it must not be touched again.
            drop(inner);
            if let Some(callback) = callback {
                callback();
            }

            inner = self.inner.lock();
            inner.executing = None;
            self.done.notify_all();
        }

        true
    }

    /// Registers `node`. If a stop was already requested, the callback runs
    /// inline on this thread before returning and the node is never linked
    /// (its id stays 0).
    ///
    /// # Safety
    ///
    /// `node` must stay alive, at a stable address, until deregistered.
    pub(super) unsafe fn register(&self, node: NonNull<CallbackNode>) {
        let node_ref = unsafe { node.as_ref() };

        let mut inner = self.inner.lock();
        // Checked under the lock: the requesting thread holds it while
        // sweeping the list, so a registration either observes the flag or is
        // linked before the sweep reaches the end of the list.
        if self.stop_requested() {
            let callback = node_ref.callback.take();
            drop(inner);
            if let Some(callback) = callback {
                callback();
            }
            return;
        }

        inner.next_id += 1;
        node_ref.id.set(inner.next_id);
        // Safety: stability until deregistration is the caller's obligation.
        unsafe { inner.list.push_back(node) };
    }

    /// Unlinks `node`, waiting out its invocation if one is currently running
    /// on another thread, so the callback body and its captured state are
    /// never freed mid-run.
    ///
    /// Called from the owning StopCallback's drop. When a callback destroys
    /// its own registration from inside its body, the executing bookkeeping
    /// identifies this thread and the call returns without blocking instead
    /// of deadlocking on itself.
    pub(super) fn deregister(&self, node: &CallbackNode) {
        if node.id.get() == UNLINKED_ID {
            return;
        }

        let mut inner = self.inner.lock();
        if node.linked.get() {
            // Never ran, and a stop request can no longer reach it.
            // Safety: a linked node is in this state's list.
            unsafe { inner.list.remove(NonNull::from(node)) };
            return;
        }

        let me = thread::current().id();
        while let Some(executing) = inner.executing {
            if executing.id == node.id.get() && executing.thread != me {
                self.done.wait(&mut inner);
            } else {
                break;
            }
        }
    }
}

/// Heap-pinned registration record owned by a
/// [`StopCallback`](crate::stop::StopCallback). The cells are only touched
/// under the owning state's mutex, or before the node is shared.
pub(super) struct CallbackNode {
    id: Cell<u64>,
    linked: Cell<bool>,
    callback: Cell<Option<CallbackFn>>,
    prev: Cell<Option<NonNull<CallbackNode>>>,
    next: Cell<Option<NonNull<CallbackNode>>>,
}

impl CallbackNode {
    pub(super) fn new(callback: CallbackFn) -> Self {
        Self {
            id: Cell::new(UNLINKED_ID),
            linked: Cell::new(false),
            callback: Cell::new(Some(callback)),
            prev: Cell::new(None),
            next: Cell::new(None),
        }
    }
}

/// Intrusive doubly-linked list of callback registrations. Doubly linked so
/// deregistration anywhere in the list unlinks in O(1).
struct CallbackList {
    head: Option<NonNull<CallbackNode>>,
    tail: Option<NonNull<CallbackNode>>,
}

impl CallbackList {
    const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    /// # Safety
    ///
    /// `node` must be unlinked and must outlive its residency in the list.
    unsafe fn push_back(&mut self, node: NonNull<CallbackNode>) {
        let node_ref = unsafe { node.as_ref() };
        debug_assert!(!node_ref.linked.get(), "callback node is already linked");

        node_ref.prev.set(self.tail);
        node_ref.next.set(None);
        node_ref.linked.set(true);

        match self.tail {
            Some(tail) => unsafe { tail.as_ref() }.next.set(Some(node)),
            None => self.head = Some(node),
        }
        self.tail = Some(node);
    }

    fn pop_front(&mut self) -> Option<NonNull<CallbackNode>> {
        let node = self.head?;
        // Safety: linked nodes are alive while they are in the list.
        unsafe { self.remove(node) };
        Some(node)
    }

    /// # Safety
    ///
    /// `node` must currently be linked into this list.
    unsafe fn remove(&mut self, node: NonNull<CallbackNode>) {
        let node_ref = unsafe { node.as_ref() };
        debug_assert!(node_ref.linked.get(), "removing an unlinked callback node");

        let prev = node_ref.prev.take();
        let next = node_ref.next.take();
        match prev {
            Some(prev) => unsafe { prev.as_ref() }.next.set(next),
            None => self.head = next,
        }
        match next {
            Some(next) => unsafe { next.as_ref() }.prev.set(prev),
            None => self.tail = prev,
        }
        node_ref.linked.set(false);
    }
}
