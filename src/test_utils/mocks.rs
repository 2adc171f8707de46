use crate::exec::{OperationState, Receiver, Sender};
use crate::sync::CountdownLatch;
use crate::task::{Header, RawTask, TaskState, VTable};
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;

/// Records which terminal action each probe task received, in order. The
/// latch releases once `expected` terminal actions have been delivered.
pub(crate) struct ProbeLog {
    pub(crate) started: Mutex<Vec<usize>>,
    pub(crate) disabled: Mutex<Vec<usize>>,
    events: CountdownLatch,
}

impl ProbeLog {
    pub(crate) fn new(expected: usize) -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(Vec::new()),
            disabled: Mutex::new(Vec::new()),
            events: CountdownLatch::new(expected),
        })
    }

    /// Blocks until every expected terminal action has been recorded.
    pub(crate) fn wait_all(&self) {
        self.events.wait();
    }
}

/// Heap task recording its terminal action into a [`ProbeLog`].
#[repr(C)]
pub(crate) struct ProbeTask {
    // First field by contract: queue links and vtable dispatch go through it.
    header: Header,
    index: usize,
    log: Arc<ProbeLog>,
}

impl ProbeTask {
    pub(crate) fn allocate(index: usize, log: &Arc<ProbeLog>) -> RawTask {
        let task = Box::new(ProbeTask {
            header: Header::new(probe_vtable()),
            index,
            log: Arc::clone(log),
        });
        let ptr = NonNull::new(Box::into_raw(task)).expect("box allocation is never null");
        // Safety: freshly allocated; the handle takes ownership.
        unsafe { RawTask::from_raw(ptr.cast()) }
    }
}

fn probe_vtable() -> &'static VTable {
    &VTable {
        start: probe_start,
        disable: probe_disable,
    }
}

// Safety (both): `ptr` owns the heap ProbeTask created by `allocate`.
unsafe fn probe_start(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<ProbeTask>().as_ptr()) };
    task.header.complete(TaskState::Started);
    task.log.started.lock().push(task.index);
    task.log.events.count_down(1);
}

unsafe fn probe_disable(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<ProbeTask>().as_ptr()) };
    task.header.complete(TaskState::Disabled);
    task.log.disabled.lock().push(task.index);
    task.log.events.count_down(1);
}

/// Heap task that blocks in `start` until its gate opens. Used to keep a
/// worker busy while a test arranges the rest of the pool.
#[repr(C)]
pub(crate) struct GateTask {
    header: Header,
    gate: Arc<CountdownLatch>,
}

impl GateTask {
    pub(crate) fn allocate(gate: &Arc<CountdownLatch>) -> RawTask {
        let task = Box::new(GateTask {
            header: Header::new(gate_vtable()),
            gate: Arc::clone(gate),
        });
        let ptr = NonNull::new(Box::into_raw(task)).expect("box allocation is never null");
        // Safety: freshly allocated; the handle takes ownership.
        unsafe { RawTask::from_raw(ptr.cast()) }
    }
}

fn gate_vtable() -> &'static VTable {
    &VTable {
        start: gate_start,
        disable: gate_disable,
    }
}

// Safety (both): `ptr` owns the heap GateTask created by `allocate`.
unsafe fn gate_start(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<GateTask>().as_ptr()) };
    task.header.complete(TaskState::Started);
    task.gate.wait();
}

unsafe fn gate_disable(ptr: NonNull<Header>) {
    let task = unsafe { Box::from_raw(ptr.cast::<GateTask>().as_ptr()) };
    task.header.complete(TaskState::Disabled);
}

/// Completion outcome observed by a [`TestReceiver`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome<T> {
    Value(T),
    Stopped,
}

/// Shared slot a [`TestReceiver`] fills with its single completion signal.
pub(crate) struct Completion<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    done: CountdownLatch,
}

impl<T> Completion<T> {
    /// Blocks until the receiver fires, then returns the outcome.
    pub(crate) fn wait(&self) -> Outcome<T> {
        self.done.wait();
        self.outcome
            .lock()
            .take()
            .expect("completion signalled without an outcome")
    }
}

/// Receiver that records its completion into a shared [`Completion`] slot and
/// releases anyone blocked on it.
pub(crate) struct TestReceiver<T> {
    completion: Arc<Completion<T>>,
}

pub(crate) fn test_receiver<T>() -> (TestReceiver<T>, Arc<Completion<T>>) {
    let completion = Arc::new(Completion {
        outcome: Mutex::new(None),
        done: CountdownLatch::new(1),
    });
    (
        TestReceiver {
            completion: Arc::clone(&completion),
        },
        completion,
    )
}

impl<T: Send + 'static> Receiver<T> for TestReceiver<T> {
    fn set_value(self, value: T) {
        *self.completion.outcome.lock() = Some(Outcome::Value(value));
        self.completion.done.count_down(1);
    }

    fn set_stopped(self) {
        *self.completion.outcome.lock() = Some(Outcome::Stopped);
        self.completion.done.count_down(1);
    }
}

/// Sender that completes inline with a value when started, for exercising
/// combinators without a pool.
#[derive(Clone, Debug)]
pub(crate) struct ValueSender<T>(pub(crate) T);

impl<T: Send + 'static> Sender for ValueSender<T> {
    type Value = T;

    type Operation<R>
        = InlineOperation<T, R>
    where
        R: Receiver<T>;

    fn connect<R>(self, receiver: R) -> InlineOperation<T, R>
    where
        R: Receiver<T>,
    {
        InlineOperation {
            input: Some((self.0, receiver)),
        }
    }
}

pub(crate) struct InlineOperation<T, R> {
    input: Option<(T, R)>,
}

impl<T: Send + 'static, R: Receiver<T>> OperationState for InlineOperation<T, R> {
    fn start(&mut self) {
        let (value, receiver) = self
            .input
            .take()
            .expect("operation state started twice");
        receiver.set_value(value);
    }
}

/// Sender that completes inline with "stopped" when started.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StoppedSender;

impl Sender for StoppedSender {
    type Value = ();

    type Operation<R>
        = StoppedOperation<R>
    where
        R: Receiver<()>;

    fn connect<R>(self, receiver: R) -> StoppedOperation<R>
    where
        R: Receiver<()>,
    {
        StoppedOperation {
            receiver: Some(receiver),
        }
    }
}

pub(crate) struct StoppedOperation<R> {
    receiver: Option<R>,
}

impl<R: Receiver<()>> OperationState for StoppedOperation<R> {
    fn start(&mut self) {
        self.receiver
            .take()
            .expect("operation state started twice")
            .set_stopped();
    }
}
