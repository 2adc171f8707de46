/// A guard that executes a closure when it goes out of scope.
///
/// Runs on every exit path (normal return, early return, or an unwinding
/// panic) so cleanup that must not be skipped can be armed up front.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Wrapped in an Option so drop can take the closure out and call it at
    // most once.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_guard_runs_on_scope_exit() {
        let fired = Cell::new(false);
        {
            let _guard = ScopeGuard::new(|| fired.set(true));
            assert!(!fired.get());
        }
        assert!(fired.get());
    }

    #[test]
    fn test_guard_runs_during_unwind() {
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let inner = std::sync::Arc::clone(&fired);

        let result = std::panic::catch_unwind(move || {
            let _guard = ScopeGuard::new(move || {
                inner.store(true, std::sync::atomic::Ordering::SeqCst);
            });
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
