use crate::pool::{Builder, ThreadPool};
use crate::sync::CountdownLatch;
use crate::test_utils::{GateTask, ProbeLog, ProbeTask};
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

assert_impl_all!(ThreadPool: Send, Sync);

#[test]
fn test_construction_and_destruction() {
    let pool = ThreadPool::new(1);
    drop(pool);

    let boxed = Box::new(ThreadPool::new(2));
    drop(boxed);
}

#[test]
fn test_max_concurrency_is_worker_count() {
    let pool = ThreadPool::new(5);
    assert_eq!(pool.max_concurrency(), 5);
}

#[test]
#[should_panic(expected = "cannot be set to 0")]
fn test_zero_workers_is_fatal() {
    let _ = Builder::new().worker_threads(0);
}

#[rstest]
#[case::single(1, 4)]
#[case::pair(2, 16)]
#[case::wide(4, 64)]
fn test_every_pushed_task_runs(#[case] workers: usize, #[case] tasks: usize) {
    let log = ProbeLog::new(tasks);
    let pool = ThreadPool::new(workers);

    for index in 0..tasks {
        pool.push(ProbeTask::allocate(index, &log));
    }

    log.wait_all();
    drop(pool);

    let mut started = log.started.lock().clone();
    started.sort_unstable();
    assert_eq!(started, (0..tasks).collect::<Vec<_>>());
    assert!(log.disabled.lock().is_empty());
}

#[rstest]
#[case::pair(2, 16)]
#[case::wide(4, 64)]
fn test_teardown_delivers_exactly_one_terminal_action(#[case] workers: usize, #[case] tasks: usize) {
    let log = ProbeLog::new(tasks);
    {
        let pool = ThreadPool::new(workers);
        for index in 0..tasks {
            pool.push(ProbeTask::allocate(index, &log));
        }
        // Drop races the workers: some tasks start, the rest are disabled.
    }
    log.wait_all();

    let mut events = log.started.lock().clone();
    events.extend(log.disabled.lock().iter().copied());
    events.sort_unstable();
    assert_eq!(events, (0..tasks).collect::<Vec<_>>());
}

#[test]
fn test_idle_worker_steals_from_backlogged_queue() {
    let pool = ThreadPool::new(2);
    let gate = Arc::new(CountdownLatch::new(1));
    let log = ProbeLog::new(4);

    // Pile everything onto one queue: whichever worker picks up the gate
    // task blocks, and the other must steal the probes to finish them.
    pool.core.queues[0].push(GateTask::allocate(&gate));
    for index in 0..4 {
        pool.core.queues[0].push(ProbeTask::allocate(index, &log));
    }

    log.wait_all();
    assert_eq!(*log.started.lock(), vec![0, 1, 2, 3]);
    assert!(log.disabled.lock().is_empty());

    gate.count_down(1);
}

#[test]
fn test_push_after_teardown_begins_disables_inline() {
    let log = ProbeLog::new(1);
    let pool = ThreadPool::new(1);

    // Simulate a submission racing teardown: the queue is already aborted.
    pool.core.queues[0].abort();
    pool.core.push(ProbeTask::allocate(7, &log));

    log.wait_all();
    assert_eq!(*log.disabled.lock(), vec![7]);
    assert!(log.started.lock().is_empty());
}

#[test]
fn test_builder_thread_name_is_applied() {
    let pool = ThreadPool::builder()
        .worker_threads(2)
        .thread_name("custom-worker")
        .build();

    let handles = pool.handles.lock();
    for handle in handles.values() {
        assert_eq!(handle.thread().name(), Some("custom-worker"));
    }
}

#[test]
fn test_builder_thread_name_fn_and_stack_size() {
    let counter = Arc::new(AtomicUsize::new(0));
    let pool = ThreadPool::builder()
        .worker_threads(2)
        .thread_name_fn({
            let counter = Arc::clone(&counter);
            move || format!("w-{}", counter.fetch_add(1, Ordering::Relaxed))
        })
        .thread_stack_size(512 * 1024)
        .build();

    let handles = pool.handles.lock();
    let mut names = handles
        .values()
        .map(|h| h.thread().name().expect("worker threads are named").to_string())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec!["w-0", "w-1"]);
}

#[rstest]
#[case::two(2)]
#[case::four(4)]
fn test_stress_random_bursts(#[case] workers: usize) {
    let bursts = (0..8)
        .map(|_| fastrand::usize(1..64))
        .collect::<Vec<_>>();
    let total = bursts.iter().sum::<usize>();

    let log = ProbeLog::new(total);
    let pool = ThreadPool::new(workers);

    let mut index = 0;
    for burst in bursts {
        for _ in 0..burst {
            pool.push(ProbeTask::allocate(index, &log));
            index += 1;
        }
        std::thread::yield_now();
    }

    log.wait_all();
    let mut started = log.started.lock().clone();
    started.sort_unstable();
    assert_eq!(started, (0..total).collect::<Vec<_>>());
}
