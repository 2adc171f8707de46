use crate::exec::{OperationState, Receiver, Scheduler, Sender};
use crate::pool::PoolCore;
use crate::task::{Header, RawTask, TaskState, VTable};
use std::ptr::NonNull;
use std::sync::Arc;

/// Cheap handle to a thread pool's execution context.
///
/// Two handles compare equal iff they reference the same pool.
#[derive(Clone, Debug)]
pub struct CpuScheduler {
    core: Arc<PoolCore>,
}

impl CpuScheduler {
    pub(crate) fn new(core: Arc<PoolCore>) -> Self {
        Self { core }
    }
}

impl PartialEq for CpuScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for CpuScheduler {}

impl Scheduler for CpuScheduler {
    type Sender = ScheduleSender;

    fn schedule(&self) -> ScheduleSender {
        ScheduleSender {
            core: Arc::clone(&self.core),
        }
    }
}

/// Sender describing "run on the pool".
///
/// The connected operation completes with the unit value on whichever worker
/// dequeues it, or with "stopped" if the pool is torn down (or already
/// tearing down) before the task runs. Which of the two happens is a race the
/// caller must be prepared for; both are normal outcomes.
#[derive(Clone, Debug)]
pub struct ScheduleSender {
    core: Arc<PoolCore>,
}

impl Sender for ScheduleSender {
    type Value = ();

    type Operation<R>
        = ScheduleOperation<R>
    where
        R: Receiver<()>;

    fn connect<R>(self, receiver: R) -> ScheduleOperation<R>
    where
        R: Receiver<()>,
    {
        ScheduleOperation {
            core: self.core,
            receiver: Some(receiver),
            started: false,
        }
    }
}

/// A connected pool operation.
///
/// `start` moves the receiver into a heap task and hands it to the pool; from
/// then on the pool owns the task and delivers exactly one completion, so the
/// operation state itself may be dropped at any point afterwards.
pub struct ScheduleOperation<R: Receiver<()>> {
    core: Arc<PoolCore>,
    receiver: Option<R>,
    started: bool,
}

impl<R: Receiver<()>> OperationState for ScheduleOperation<R> {
    fn start(&mut self) {
        assert!(!self.started, "operation state started twice");
        self.started = true;

        let receiver = self
            .receiver
            .take()
            .expect("receiver is present until the first start");
        self.core.push(PoolTask::allocate(receiver));
    }
}

/// Heap task wrapping a receiver: `start` delivers the value completion,
/// `disable` delivers "stopped".
#[repr(C)]
struct PoolTask<R: Receiver<()>> {
    // The header must stay the first field: queues link tasks through it and
    // the vtable functions recover the task from a header pointer.
    header: Header,
    receiver: R,
}

impl<R: Receiver<()>> PoolTask<R> {
    fn allocate(receiver: R) -> RawTask {
        let task = Box::new(PoolTask {
            header: Header::new(vtable::<R>()),
            receiver,
        });
        let ptr = NonNull::new(Box::into_raw(task)).expect("box allocation is never null");
        // Safety: freshly allocated and unaliased; the handle takes ownership.
        unsafe { RawTask::from_raw(ptr.cast()) }
    }
}

fn vtable<R: Receiver<()>>() -> &'static VTable {
    &VTable {
        start: start_raw::<R>,
        disable: disable_raw::<R>,
    }
}

// Safety (both): `ptr` owns the heap PoolTask<R> created by `allocate`, and
// the caller is the task's sole owner, delivering its single terminal action.
unsafe fn start_raw<R: Receiver<()>>(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<PoolTask<R>>().as_ptr()) };
    let PoolTask { header, receiver } = *task;
    debug_assert!(!header.is_linked(), "running a task that is still queued");
    header.complete(TaskState::Started);
    receiver.set_value(());
}

unsafe fn disable_raw<R: Receiver<()>>(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<PoolTask<R>>().as_ptr()) };
    let PoolTask { header, receiver } = *task;
    debug_assert!(!header.is_linked(), "disabling a task that is still queued");
    header.complete(TaskState::Disabled);
    receiver.set_stopped();
}
