use crate::exec::{Receiver, Sender};

/// Composes `upstream` with a continuation to run on its value completion.
///
/// Equivalent to [`SenderExt::then`](crate::exec::SenderExt::then).
pub fn then<S, F, U>(upstream: S, continuation: F) -> Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> U + Send + 'static,
{
    Then {
        upstream,
        continuation,
    }
}

/// Sender adaptor produced by [`then`].
///
/// A `Then` holds no completion state of its own: cloning it and connecting
/// each clone produces fully independent operations.
#[derive(Clone, Debug)]
pub struct Then<S, F> {
    upstream: S,
    continuation: F,
}

impl<S, F, U> Sender for Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> U + Send + 'static,
{
    type Value = U;

    type Operation<R>
        = S::Operation<ThenReceiver<F, R>>
    where
        R: Receiver<U>;

    fn connect<R>(self, receiver: R) -> Self::Operation<R>
    where
        R: Receiver<U>,
    {
        // The upstream drives the composed operation; this sender merely
        // interposes a receiver.
        self.upstream.connect(ThenReceiver {
            continuation: self.continuation,
            downstream: receiver,
        })
    }
}

/// Receiver that runs the continuation on the upstream's value and forwards
/// the result downstream. Stopped completions pass through untouched, without
/// invoking the continuation.
pub struct ThenReceiver<F, R> {
    continuation: F,
    downstream: R,
}

impl<T, U, F, R> Receiver<T> for ThenReceiver<F, R>
where
    F: FnOnce(T) -> U + Send + 'static,
    R: Receiver<U>,
{
    fn set_value(self, value: T) {
        self.downstream.set_value((self.continuation)(value));
    }

    fn set_stopped(self) {
        self.downstream.set_stopped();
    }
}
