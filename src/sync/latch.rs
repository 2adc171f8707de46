use parking_lot::{Condvar, Mutex};

/// A single-use countdown latch.
///
/// The count only ever decreases; once it reaches zero every current and
/// future waiter is released. Counting down past zero is a broken invariant.
pub struct CountdownLatch {
    remaining: Mutex<usize>,
    zero: Condvar,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrements the count by `n`, releasing all waiters on reaching zero.
    pub fn count_down(&self, n: usize) {
        let mut remaining = self.remaining.lock();
        assert!(n <= *remaining, "latch counted down below zero");
        *remaining -= n;
        if *remaining == 0 {
            self.zero.notify_all();
        }
    }

    /// Decrements the count by one, then blocks until it reaches zero.
    pub fn arrive_and_wait(&self) {
        let mut remaining = self.remaining.lock();
        assert!(*remaining > 0, "latch counted down below zero");
        *remaining -= 1;

        if *remaining == 0 {
            self.zero.notify_all();
            return;
        }
        while *remaining > 0 {
            self.zero.wait(&mut remaining);
        }
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.zero.wait(&mut remaining);
        }
    }

    /// Whether the count has already reached zero, without blocking.
    pub fn try_wait(&self) -> bool {
        *self.remaining.lock() == 0
    }
}
