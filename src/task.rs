use crate::list::{Linked, ListNode};
use std::cell::Cell;
use std::ptr::NonNull;

/// Terminal state of a task. Every task receives exactly one of the two
/// terminal actions over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// Queued or in flight; no terminal action delivered yet.
    Pending,
    /// `start` executed the task.
    Started,
    /// `disable` abandoned the task because its pool is shutting down.
    Disabled,
}

pub(crate) struct VTable {
    /// Executes the task and releases its storage.
    pub(crate) start: unsafe fn(NonNull<Header>),
    /// Abandons the task and releases its storage.
    pub(crate) disable: unsafe fn(NonNull<Header>),
}

/// Common prefix of every concrete task.
///
/// Must be the first field of a `#[repr(C)]` task type so queues can link
/// tasks through it and the vtable can recover the concrete task from a
/// header pointer.
#[repr(C)]
pub(crate) struct Header {
    node: ListNode,
    vtable: &'static VTable,
    state: Cell<TaskState>,
}

impl Header {
    pub(crate) fn new(vtable: &'static VTable) -> Self {
        Self {
            node: ListNode::new(),
            vtable,
            state: Cell::new(TaskState::Pending),
        }
    }

    /// One-shot transition out of `Pending`. A task receiving a second
    /// terminal action is a broken invariant.
    pub(crate) fn complete(&self, to: TaskState) {
        assert_eq!(
            self.state.get(),
            TaskState::Pending,
            "task received a second terminal action"
        );
        self.state.set(to);
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.node.is_linked()
    }
}

unsafe impl Linked for Header {
    fn node(&self) -> &ListNode {
        &self.node
    }
}

/// Handle to a type-erased heap task.
///
/// Whoever pops the handle from a queue is the task's sole owner and must
/// deliver exactly one terminal action, which also releases the task's
/// storage.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawTask {
    ptr: NonNull<Header>,
}

impl RawTask {
    /// # Safety
    ///
    /// `ptr` must point at the header of a live heap task whose ownership is
    /// handed over to this handle.
    pub(crate) unsafe fn from_raw(ptr: NonNull<Header>) -> Self {
        Self { ptr }
    }

    pub(crate) fn header_ptr(&self) -> NonNull<Header> {
        self.ptr
    }

    fn header(&self) -> &Header {
        // Safety: the task is alive until a terminal action consumes it.
        unsafe { self.ptr.as_ref() }
    }

    /// Executes the task, consuming its storage.
    pub(crate) fn start(self) {
        let vtable = self.header().vtable;
        unsafe { (vtable.start)(self.ptr) }
    }

    /// Abandons the task because its pool is shutting down, consuming its
    /// storage.
    pub(crate) fn disable(self) {
        let vtable = self.header().vtable;
        unsafe { (vtable.disable)(self.ptr) }
    }
}

// Safety: a RawTask is a unique owning handle to a heap task; queues hand it
// between threads with the queue mutex providing the necessary ordering.
unsafe impl Send for RawTask {}
