//! Integration tests for scoped resources and finalizer ordering.
//!
//! Every scenario runs on a real runtime and checks that releases happen
//! newest-first, exactly once, whatever the scoped computation did.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use millrace::prelude::*;
use millrace::{assert_died, assert_failure, assert_interrupted, assert_success, DefectKind};

type Log = Arc<Mutex<Vec<String>>>;

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap()
}

/// A resource that records its own release.
fn resource(name: &'static str, log: &Log) -> impl Effect<Output = &'static str, Error = String> {
    let log = log.clone();
    acquire_release(succeed(name), move |name| async move {
        log.lock().unwrap().push(format!("release {}", name));
        Ok::<_, BoxError>(())
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn releases_run_in_reverse_acquisition_order() {
    let rt = runtime();
    let log: Log = Arc::default();

    let program = scoped(
        resource("A", &log)
            .zip(resource("B", &log))
            .zip(resource("C", &log))
            .map(|((a, b), c)| format!("{}{}{}", a, b, c)),
    );

    assert_eq!(rt.run(program), Exit::Success("ABC".to_string()));
    assert_eq!(entries(&log), vec!["release C", "release B", "release A"]);
    rt.shutdown();
}

#[test]
fn nested_scope_releases_before_outer_continues() {
    let rt = runtime();
    let log: Log = Arc::default();
    let marker = log.clone();

    let program = scoped(resource("outer", &log).and_then({
        let log = log.clone();
        move |_| {
            scoped(resource("inner", &log)).map(move |_| {
                marker.lock().unwrap().push("after inner".to_string());
            })
        }
    }));

    assert_success!(rt.run(program));
    assert_eq!(
        entries(&log),
        vec!["release inner", "after inner", "release outer"]
    );
    rt.shutdown();
}

#[test]
fn bracket_releases_after_use() {
    let rt = runtime();
    let log: Log = Arc::default();
    let release_log = log.clone();
    let use_log = log.clone();

    let program = bracket(
        succeed::<_, String>(5),
        move |n| async move {
            release_log.lock().unwrap().push(format!("release {}", n));
            Ok::<_, BoxError>(())
        },
        move |n| {
            use_log.lock().unwrap().push(format!("use {}", n));
            succeed(n * 2)
        },
    );

    assert_eq!(rt.run(program), Exit::Success(10));
    assert_eq!(entries(&log), vec!["use 5", "release 5"]);
    rt.shutdown();
}

// ============================================================================
// Cleanup on every exit path
// ============================================================================

#[test]
fn failure_still_releases_everything() {
    let rt = runtime();
    let log: Log = Arc::default();

    let program = scoped(
        resource("A", &log)
            .zip(resource("B", &log))
            .and_then(|_| fail::<(), _>("use failed".to_string())),
    );

    assert_failure!(rt.run(program), "use failed".to_string());
    assert_eq!(entries(&log), vec!["release B", "release A"]);
    rt.shutdown();
}

#[test]
fn failed_acquire_registers_nothing() {
    let rt = runtime();
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();

    let program = scoped(acquire_release(
        fail::<u32, _>("no connection".to_string()),
        move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        },
    ));

    assert_failure!(rt.run(program), "no connection".to_string());
    assert_eq!(released.load(Ordering::SeqCst), 0);
    rt.shutdown();
}

#[test]
fn interruption_releases_exactly_once() {
    let rt = runtime();
    let exits = Arc::new(Mutex::new(Vec::new()));
    let seen = exits.clone();
    let acquired = Deferred::<(), String>::new();
    let signal = acquired.clone();

    let victim = scoped(
        acquire_release_exit(succeed::<_, String>("conn"), move |_, exit| async move {
            seen.lock().unwrap().push(exit);
            Ok::<_, BoxError>(())
        })
        .and_then(move |_| signal.succeed(()))
        .and_then(|_| sleep(Duration::from_secs(60))),
    );

    let program = fork::<_, String>(victim).and_then(move |fiber| {
        acquired
            .wait()
            .and_then(move |_| fiber.interrupt::<String>())
    });

    let exit = assert_success!(rt.run(program));
    assert_interrupted!(exit);
    assert_eq!(*exits.lock().unwrap(), vec![ScopeExit::Interrupted]);
    rt.shutdown();
}

#[test]
fn failing_release_does_not_stop_the_others() {
    let rt = runtime();
    let log: Log = Arc::default();

    let broken = acquire_release(succeed::<_, String>("broken"), |_| async {
        Err::<(), _>(std::io::Error::other("disk gone"))
    });
    let program = scoped(
        resource("A", &log)
            .zip(broken)
            .zip(resource("C", &log))
            .map(|_| ()),
    );

    let exit = rt.run(program);
    assert_died!(exit.clone());
    let cause = exit.cause().unwrap();
    assert_eq!(cause.defects().len(), 1);
    assert_eq!(cause.defects()[0].kind(), DefectKind::Finalizer);
    assert_eq!(entries(&log), vec!["release C", "release A"]);
    rt.shutdown();
}

#[test]
fn fiber_scope_closes_when_fiber_ends() {
    let rt = runtime();
    let log: Log = Arc::default();

    let child = resource("child", &log).map(|_| ());
    let program = fork::<_, String>(child).and_then(|fiber| fiber.join());

    assert_success!(rt.run(program));
    assert_eq!(entries(&log), vec!["release child"]);
    rt.shutdown();
}

#[test]
fn add_finalizer_sees_success_exit() {
    let rt = runtime();
    let exits = Arc::new(Mutex::new(Vec::new()));
    let seen = exits.clone();

    let program = scoped(add_finalizer::<_, _, BoxError, String>(move |exit| async move {
        seen.lock().unwrap().push(exit);
        Ok(())
    }));

    assert_success!(rt.run(program));
    assert_eq!(*exits.lock().unwrap(), vec![ScopeExit::Success]);
    rt.shutdown();
}
