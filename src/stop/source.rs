use crate::stop::StopToken;
use crate::stop::state::StopState;
use std::fmt;
use std::sync::Arc;

/// Owning handle that can issue a stop request.
///
/// A stop request made through any clone is visible to every source, token,
/// and callback sharing the same stop-state. Once requested, a stop cannot be
/// withdrawn; additional requests have no effect.
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Creates a source with fresh stop-state.
    pub fn new() -> Self {
        let state = Arc::new(StopState::new());
        state.add_source();
        Self { state }
    }

    /// Returns a token observing this source's stop-state.
    pub fn token(&self) -> StopToken {
        StopToken::with_state(Arc::clone(&self.state))
    }

    /// Issues a stop request. Returns whether this call performed the
    /// not-requested -> requested transition; if it did, every registered
    /// callback ran synchronously on this thread before the call returned.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Always true while the source itself is alive.
    pub fn stop_possible(&self) -> bool {
        self.state.stop_possible()
    }
}

impl Clone for StopSource {
    fn clone(&self) -> Self {
        self.state.add_source();
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for StopSource {
    fn drop(&mut self) {
        self.state.remove_source();
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for StopSource {
    /// Sources compare equal iff they share the same stop-state.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StopSource {}

impl fmt::Debug for StopSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSource")
            .field("stop_requested", &self.stop_requested())
            .finish_non_exhaustive()
    }
}
