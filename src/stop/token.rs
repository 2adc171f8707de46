use crate::stop::state::StopState;
use std::fmt;
use std::sync::Arc;

/// Read-only observer handle for a stop-state.
///
/// Default-constructed tokens have no associated state: both predicates are
/// false forever, and callbacks registered through them never run.
#[derive(Clone, Default)]
pub struct StopToken {
    state: Option<Arc<StopState>>,
}

impl StopToken {
    pub(super) fn with_state(state: Arc<StopState>) -> Self {
        Self { state: Some(state) }
    }

    pub(super) fn state(&self) -> Option<&Arc<StopState>> {
        self.state.as_ref()
    }

    pub fn stop_requested(&self) -> bool {
        self.state.as_deref().is_some_and(StopState::stop_requested)
    }

    /// True iff a stop was already requested, or some source is still alive
    /// that could request one.
    pub fn stop_possible(&self) -> bool {
        self.state.as_deref().is_some_and(StopState::stop_possible)
    }
}

impl PartialEq for StopToken {
    /// Tokens compare equal iff they share the same stop-state, or both have
    /// none.
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for StopToken {}

impl fmt::Debug for StopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_requested", &self.stop_requested())
            .field("stop_possible", &self.stop_possible())
            .finish_non_exhaustive()
    }
}
