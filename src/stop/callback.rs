use crate::stop::StopToken;
use crate::stop::state::{CallbackNode, StopState};
use std::ptr::NonNull;
use std::sync::Arc;

/// RAII registration of a callback to run when a stop is requested.
///
/// The callback runs on the thread that wins the stop request. If the stop
/// was already requested when the callback is created, it runs inline on the
/// constructing thread before [`new`](StopCallback::new) returns.
///
/// Dropping the handle deregisters the callback. If the callback is running
/// on another thread at that moment, the drop blocks until the invocation
/// finishes, so the callback body and its captured state are never freed
/// mid-run. A callback destroying its own registration from inside its body
/// is detected and does not block.
pub struct StopCallback {
    state: Option<Arc<StopState>>,
    /// Heap-pinned so the intrusive list links stay valid when the handle
    /// itself moves.
    node: Box<CallbackNode>,
}

impl StopCallback {
    pub fn new<F>(token: &StopToken, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let node = Box::new(CallbackNode::new(Box::new(callback)));
        let state = token.state().cloned();

        if let Some(state) = &state {
            // Safety: the node is heap-allocated and deregistered in drop
            // before it is freed.
            unsafe { state.register(NonNull::from(node.as_ref())) };
        }

        Self { state, node }
    }
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.deregister(&self.node);
        }
    }
}

// Safety: the node's cells are only touched under the state's mutex, and the
// stored closure is itself required to be Send.
unsafe impl Send for StopCallback {}
