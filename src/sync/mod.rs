//! Small synchronization primitives shared across the crate.

mod latch;

pub use latch::CountdownLatch;
