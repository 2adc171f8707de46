//! Composable scheduling protocol.
//!
//! A [`Scheduler`] hands out [`Sender`]s describing not-yet-started work;
//! connecting a sender to a [`Receiver`] yields an [`OperationState`]; and
//! starting the operation state makes the work run (possibly on another
//! thread) and signal the receiver with exactly one of "value" or "stopped",
//! exactly once.

mod schedule;
mod then;

pub use schedule::{CpuScheduler, ScheduleOperation, ScheduleSender};
pub use then::{Then, ThenReceiver, then};


/// Consumer of a single completion signal.
///
/// Exactly one of `set_value`/`set_stopped` is invoked, exactly once, over a
/// receiver's lifetime. Both take `self` by value, so a second signal is
/// unrepresentable.
pub trait Receiver<T>: Send + 'static {
    /// The operation produced a value.
    fn set_value(self, value: T);

    /// The operation was abandoned before it could produce a value, e.g.
    /// because the pool executing it shut down first. A normal outcome the
    /// caller must handle, not an error.
    fn set_stopped(self);
}

/// Description of not-yet-started work.
pub trait Sender {
    /// Value type delivered to the connected receiver.
    type Value;

    /// Operation state produced by [`connect`](Sender::connect).
    type Operation<R>: OperationState
    where
        R: Receiver<Self::Value>;

    /// Binds `receiver` to this work. Connecting starts nothing.
    fn connect<R>(self, receiver: R) -> Self::Operation<R>
    where
        R: Receiver<Self::Value>;
}

/// A connected, startable unit of work.
pub trait OperationState {
    /// Starts the work. Completion is then guaranteed to reach the connected
    /// receiver, synchronously or from another thread. Starting an operation
    /// state twice is a broken invariant.
    fn start(&mut self);
}

/// Source of senders bound to an execution context.
///
/// Handles are cheap to clone and compare equal iff they reference the same
/// context.
pub trait Scheduler: Clone + PartialEq {
    type Sender: Sender<Value = ()>;

    /// Returns a sender that completes on this scheduler's context.
    fn schedule(&self) -> Self::Sender;
}

/// Combinator methods for senders.
pub trait SenderExt: Sender + Sized {
    /// Chains `continuation` onto this sender's value completion; stopped
    /// completions skip the continuation and propagate unchanged.
    /// `sender.then(f).then(g)` applies `f`, then `g`.
    fn then<F, U>(self, continuation: F) -> Then<Self, F>
    where
        F: FnOnce(Self::Value) -> U + Send + 'static,
    {
        then(self, continuation)
    }
}

impl<S: Sender> SenderExt for S {}
