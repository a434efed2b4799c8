//! Integration tests for groups, semaphores, deferred cells and fiber
//! lifetimes running on a multi-threaded runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use millrace::prelude::*;
use millrace::{assert_failure, assert_interrupted, assert_success};

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default().with_worker_threads(4)).unwrap()
}

/// Tracks how many tasks are active at once and the highest value seen.
#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn measured(gauge: &Arc<Gauge>, value: usize, pause: Duration) -> BoxedEffect<usize, String> {
    let enter = gauge.clone();
    let leave = gauge.clone();
    from_fn(move || {
        enter.enter();
        Ok::<_, String>(())
    })
    .and_then(move |_| sleep(pause))
    .map(move |_| {
        leave.leave();
        value
    })
    .boxed()
}

/// Wait until `semaphore` has `count` queued waiters.
fn queued(semaphore: &Semaphore, count: usize) -> impl Effect<Output = (), Error = String> {
    let semaphore = semaphore.clone();
    from_async(move || async move {
        while semaphore.waiting() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok::<_, String>(())
    })
}

/// Wait until `counter` has reached `count`.
fn reached(counter: &Arc<AtomicUsize>, count: usize) -> impl Effect<Output = (), Error = String> {
    let counter = counter.clone();
    from_async(move || async move {
        while counter.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok::<_, String>(())
    })
}

/// Count one more ready fiber.
fn arrive(counter: &Arc<AtomicUsize>) -> impl Effect<Output = (), Error = String> {
    let counter = counter.clone();
    from_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
    })
}

// ============================================================================
// run_all
// ============================================================================

#[test]
fn run_all_never_exceeds_the_limit() {
    let rt = runtime();
    let gauge = Arc::new(Gauge::default());
    let effects: Vec<_> = (0..12)
        .map(|i| measured(&gauge, i, Duration::from_millis(5)))
        .collect();

    let exit = rt.run(run_all(effects, Concurrency::Bounded(3)));

    assert_eq!(exit, Exit::Success((0..12).collect::<Vec<_>>()));
    assert!(gauge.peak() <= 3, "peak was {}", gauge.peak());
    assert!(gauge.peak() >= 1);
    rt.shutdown();
}

#[test]
fn run_all_default_limit_comes_from_config() {
    let rt = Runtime::new(
        RuntimeConfig::default()
            .with_worker_threads(4)
            .with_default_concurrency(2),
    )
    .unwrap();
    let gauge = Arc::new(Gauge::default());
    let effects: Vec<_> = (0..8)
        .map(|i| measured(&gauge, i, Duration::from_millis(5)))
        .collect();

    assert_success!(rt.run(run_all(effects, Concurrency::Default)));
    assert!(gauge.peak() <= 2, "peak was {}", gauge.peak());
    rt.shutdown();
}

#[test]
fn run_all_of_nothing_succeeds_with_nothing() {
    let rt = runtime();
    let effects: Vec<BoxedEffect<u8, String>> = Vec::new();
    assert_eq!(rt.run(run_all(effects, Concurrency::Bounded(2))), Exit::Success(vec![]));
    rt.shutdown();
}

#[test]
fn run_all_fail_fast_stops_admission_and_interrupts_running() {
    let rt = runtime();
    let started = Arc::new(Mutex::new(Vec::new()));
    let e2_exit = Arc::new(Mutex::new(None));

    let record = |n: usize| {
        let started = started.clone();
        from_fn(move || {
            started.lock().unwrap().push(n);
            Ok::<_, String>(())
        })
    };

    let e2_seen = e2_exit.clone();
    let e2_ready = Arc::new(AtomicUsize::new(0));
    let effects: Vec<BoxedEffect<usize, String>> = vec![
        // e1 finishes only once e2 is running, so e3 is admitted while e2 is live.
        record(1)
            .and_then({
                let e2_ready = e2_ready.clone();
                move |_| reached(&e2_ready, 1)
            })
            .map(|_| 1)
            .boxed(),
        add_finalizer(move |exit| async move {
            *e2_seen.lock().unwrap() = Some(exit);
            Ok::<_, BoxError>(())
        })
        .and_then({
            let step = record(2);
            move |_| step
        })
        .and_then(move |_| arrive(&e2_ready))
        .and_then(|_| sleep(Duration::from_secs(60)))
        .map(|_| 2)
        .boxed(),
        record(3)
            .and_then(|_| fail("e3 failed".to_string()))
            .boxed(),
        record(4).map(|_| 4).boxed(),
        record(5).map(|_| 5).boxed(),
    ];

    let exit = rt.run(run_all(effects, Concurrency::Bounded(2)));

    assert_failure!(exit, "e3 failed".to_string());
    let mut started = started.lock().unwrap().clone();
    started.sort_unstable();
    assert_eq!(started, vec![1, 2, 3]);
    assert_eq!(*e2_exit.lock().unwrap(), Some(ScopeExit::Interrupted));
    rt.shutdown();
}

#[test]
fn run_all_settled_keeps_going_after_failures() {
    let rt = runtime();
    let effects: Vec<BoxedEffect<usize, String>> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                sleep(Duration::from_millis(2)).map(move |_| i).boxed()
            } else {
                fail(format!("odd {}", i)).boxed()
            }
        })
        .collect();

    let exits = assert_success!(rt.run(run_all_settled::<_, _, ()>(effects, Concurrency::Bounded(2))));

    assert_eq!(exits.len(), 6);
    for (i, exit) in exits.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(exit, &Exit::Success(i));
        } else {
            assert_eq!(exit.failure(), Some(&format!("odd {}", i)));
        }
    }
    rt.shutdown();
}

#[test]
fn interrupting_a_group_interrupts_its_members() {
    let rt = runtime();
    let released = Arc::new(AtomicUsize::new(0));
    let ready = Arc::new(AtomicUsize::new(0));

    let members: Vec<BoxedEffect<(), String>> = (0..3)
        .map(|_| {
            let released = released.clone();
            let ready = ready.clone();
            add_finalizer(move |exit| async move {
                if exit == ScopeExit::Interrupted {
                    released.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<_, BoxError>(())
            })
            .and_then(move |_| arrive(&ready))
            .and_then(|_| sleep(Duration::from_secs(60)))
            .boxed()
        })
        .collect();

    let program = fork::<_, String>(run_all(members, Concurrency::Unbounded)).and_then(
        move |group| reached(&ready, 3).and_then(move |_| group.interrupt::<String>()),
    );

    let exit = assert_success!(rt.run(program));
    assert_interrupted!(exit);
    assert_eq!(released.load(Ordering::SeqCst), 3);
    rt.shutdown();
}

// ============================================================================
// Semaphore
// ============================================================================

#[test]
fn semaphore_conserves_permits_under_contention() {
    let rt = runtime();
    let sem = Semaphore::new(4);
    let gauge = Arc::new(Gauge::default());

    let workers: Vec<BoxedEffect<usize, String>> = (0..20)
        .map(|i| {
            let permits = 1 + i % 3;
            let held = gauge.clone();
            let body = from_fn(move || {
                for _ in 0..permits {
                    held.enter();
                }
                Ok::<_, String>(())
            })
            .and_then(|_| sleep(Duration::from_millis(2)))
            .map({
                let held = gauge.clone();
                move |_| {
                    for _ in 0..permits {
                        held.leave();
                    }
                    i
                }
            });
            sem.with_permits(permits, body).boxed()
        })
        .collect();

    assert_success!(rt.run(run_all(workers, Concurrency::Unbounded)));
    assert!(gauge.peak() <= 4, "peak was {}", gauge.peak());
    assert_eq!(sem.available(), 4);
    assert_eq!(sem.waiting(), 0);
    rt.shutdown();
}

#[test]
fn semaphore_grants_in_arrival_order() {
    let rt = runtime();
    let sem = Semaphore::new(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let waiter = |n: usize| {
        let order = order.clone();
        sem.with_permit(from_fn(move || {
            order.lock().unwrap().push(n);
            Ok::<_, String>(())
        }))
    };

    let program = sem
        .acquire::<String>(1)
        .and_then({
            let (w1, sem) = (waiter(1), sem.clone());
            move |_| fork(w1).zip(queued(&sem, 1))
        })
        .and_then({
            let (w2, sem) = (waiter(2), sem.clone());
            move |(f1, _)| fork(w2).zip(queued(&sem, 2)).map(move |(f2, _)| (f1, f2))
        })
        .and_then({
            let (w3, sem) = (waiter(3), sem.clone());
            move |(f1, f2)| {
                fork(w3)
                    .zip(queued(&sem, 3))
                    .map(move |(f3, _)| (f1, f2, f3))
            }
        })
        .and_then({
            let sem = sem.clone();
            move |fibers| sem.release(1).map(move |_| fibers)
        })
        .and_then(|(f1, f2, f3)| f1.join().zip(f2.join()).zip(f3.join()));

    assert_success!(rt.run(program));
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(sem.available(), 1);
    rt.shutdown();
}

#[test]
fn semaphore_small_request_does_not_overtake_queued_large_one() {
    let rt = runtime();
    let sem = Semaphore::new(3);
    assert!(sem.try_acquire(2).unwrap());

    let big = sem.acquire::<String>(3);
    let program = fork_daemon(big).zip(queued(&sem, 1)).map(|(fiber, _)| fiber);
    let fiber = assert_success!(rt.run(program));

    assert_eq!(sem.available(), 1);
    assert!(!sem.try_acquire(1).unwrap());

    sem.release_now(2).unwrap();
    let exit = rt.run(fiber.join());
    assert_success!(exit);
    assert_eq!(sem.in_use(), 3);
    sem.release_now(3).unwrap();
    rt.shutdown();
}

#[test]
fn interrupted_waiter_leaves_the_queue() {
    let rt = runtime();
    let sem = Semaphore::new(1);
    assert!(sem.try_acquire(1).unwrap());

    let program = fork::<_, String>(sem.acquire::<String>(1))
        .zip(queued(&sem, 1))
        .and_then(|(fiber, _)| fiber.interrupt::<String>());

    let exit = assert_success!(rt.run(program));
    assert_interrupted!(exit);
    assert_eq!(sem.waiting(), 0);
    sem.release_now(1).unwrap();
    assert_eq!(sem.available(), 1);
    rt.shutdown();
}

// ============================================================================
// Deferred
// ============================================================================

#[test]
fn waiter_started_before_write_sees_the_value() {
    let rt = runtime();
    let cell = Deferred::<u32, String>::new();
    let reader = cell.clone();

    let program = fork::<_, String>(reader.wait())
        .and_then({
            let cell = cell.clone();
            move |x| {
                sleep(Duration::from_millis(5))
                    .and_then(move |_| cell.succeed(42))
                    .map(move |_| x)
            }
        })
        .and_then(|x| x.join());

    assert_eq!(rt.run(program), Exit::Success(42));
    rt.shutdown();
}

#[test]
fn every_reader_sees_the_first_write() {
    let rt = runtime();
    let cell = Deferred::<u32, String>::new();

    let readers: Vec<BoxedEffect<u32, String>> = (0..5).map(|_| cell.wait().boxed()).collect();
    let writers = cell
        .fail::<String>("first".to_string())
        .zip(cell.succeed(7));

    let program = fork::<_, String>(run_all_settled::<_, _, String>(readers, Concurrency::Unbounded))
        .and_then(move |group| writers.and_then(move |wrote| group.join().map(move |exits| (wrote, exits))));

    let (wrote, exits) = assert_success!(rt.run(program));
    assert_eq!(wrote, (true, false));
    assert_eq!(exits.len(), 5);
    for exit in exits {
        assert_failure!(exit, "first".to_string());
    }
    assert_eq!(cell.poll(), Some(Exit::fail("first".to_string())));
    rt.shutdown();
}

// ============================================================================
// Fiber lifetimes
// ============================================================================

#[test]
fn daemon_is_interrupted_by_runtime_shutdown() {
    let rt = runtime();
    let exits = Arc::new(Mutex::new(Vec::new()));
    let seen = exits.clone();
    let ready = Deferred::<(), String>::new();
    let signal = ready.clone();

    let daemon = add_finalizer(move |exit| async move {
        seen.lock().unwrap().push(exit);
        Ok::<_, BoxError>(())
    })
    .and_then(move |_| signal.succeed(()))
    .and_then(|_| sleep::<String>(Duration::from_secs(60)));

    let program = fork_daemon::<_, String>(daemon)
        .and_then(move |fiber| ready.wait().map(move |_| fiber.id()));
    assert_success!(rt.run(program));
    assert_eq!(rt.live_fibers(), 1);
    assert!(exits.lock().unwrap().is_empty());

    rt.shutdown();
    assert_eq!(*exits.lock().unwrap(), vec![ScopeExit::Interrupted]);
}

#[test]
fn daemon_forked_during_shutdown_is_still_interrupted() {
    let rt = runtime();
    let released = Arc::new(AtomicUsize::new(0));
    let masked = Deferred::<(), String>::new();
    let late_ready = Deferred::<(), String>::new();

    let counter = released.clone();
    let late_signal = late_ready.clone();
    let late = add_finalizer(move |exit| async move {
        if exit == ScopeExit::Interrupted {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok::<_, BoxError>(())
    })
    .and_then(move |_| late_signal.succeed(()))
    .and_then(|_| sleep::<String>(Duration::from_secs(60)));

    let entered = masked.clone();
    let spawner = uninterruptible(
        entered
            .succeed(())
            .and_then(|_| sleep::<String>(Duration::from_millis(100)))
            .and_then(move |_| fork_daemon::<_, String>(late))
            .and_then(move |_| late_ready.wait()),
    )
    .and_then(|_| sleep::<String>(Duration::from_secs(60)));

    let program = fork_daemon::<_, String>(spawner).and_then(move |_| masked.wait());
    assert_success!(rt.run(program));

    rt.shutdown();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn grandchildren_are_interrupted_with_their_parent() {
    let rt = runtime();
    let interrupted = Arc::new(AtomicUsize::new(0));

    let ready = Arc::new(AtomicUsize::new(0));
    let leaf = |counter: Arc<AtomicUsize>, ready: Arc<AtomicUsize>| {
        add_finalizer(move |exit| async move {
            if exit == ScopeExit::Interrupted {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok::<_, BoxError>(())
        })
        .and_then(move |_| arrive(&ready))
        .and_then(|_| sleep::<String>(Duration::from_secs(60)))
    };

    let middle = fork::<_, String>(leaf(interrupted.clone(), ready.clone()))
        .zip(fork::<_, String>(leaf(interrupted.clone(), ready.clone())))
        .and_then(|_| sleep::<String>(Duration::from_secs(60)));

    let program = fork::<_, String>(middle)
        .and_then(move |fiber| reached(&ready, 2).and_then(move |_| fiber.interrupt::<String>()));

    let exit = assert_success!(rt.run(program));
    assert_interrupted!(exit);
    assert_eq!(interrupted.load(Ordering::SeqCst), 2);
    assert_eq!(rt.live_fibers(), 0);
    rt.shutdown();
}
