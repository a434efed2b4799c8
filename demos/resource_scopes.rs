//! Resource Scopes Example
//!
//! Demonstrates scoped resource management on the millrace runtime.
//! Resources registered in a scope are released newest-first when the
//! scope closes, whether the work inside succeeded, failed, or was
//! interrupted.
//!
//! Shows practical patterns including:
//! - Basic `bracket` usage for a single resource
//! - Several resources in one scope with LIFO cleanup
//! - Cleanup when the work fails
//! - Cleanup when the fiber is interrupted
//! - A failing release reported as a defect
//!
//! Run with: cargo run --example resource_scopes

use std::sync::{Arc, Mutex};
use std::time::Duration;

use millrace::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

/// A named connection whose release is recorded in `log`.
fn connection(name: &'static str, log: &Log) -> impl Effect<Output = &'static str, Error = String> {
    let log = log.clone();
    acquire_release(
        from_fn(move || {
            println!("  open {}", name);
            Ok::<_, String>(name)
        }),
        move |name| async move {
            println!("  close {}", name);
            log.lock().unwrap().push(name.to_string());
            Ok::<_, BoxError>(())
        },
    )
}

// ==================== Basic Bracket Pattern ====================

/// Example 1: acquire, use, release.
fn example_basic_bracket(runtime: &Runtime) {
    println!("\n=== Example 1: Basic Bracket Pattern ===");

    let effect = bracket(
        succeed::<_, String>(42u32),
        |id| async move {
            println!("  Resource {} cleaned up!", id);
            Ok::<_, BoxError>(())
        },
        |id| {
            println!("  Using resource with id: {}", id);
            succeed(id * 2)
        },
    );

    println!("  Result: {:?}", runtime.run(effect));
}

// ==================== LIFO Cleanup ====================

/// Example 2: three connections in one scope close in reverse order.
fn example_lifo_cleanup(runtime: &Runtime) {
    println!("\n=== Example 2: Multiple Resources, LIFO Cleanup ===");

    let log: Log = Arc::default();
    let effect = scoped(
        connection("A", &log)
            .zip(connection("B", &log))
            .zip(connection("C", &log))
            .map(|((a, b), c)| format!("{}+{}+{}", a, b, c)),
    );

    println!("  Result: {:?}", runtime.run(effect));
    println!("  Release order: {:?}", log.lock().unwrap());
}

// ==================== Failure ====================

/// Example 3: the work fails, the resources are still released.
fn example_cleanup_on_failure(runtime: &Runtime) {
    println!("\n=== Example 3: Cleanup on Failure ===");

    let log: Log = Arc::default();
    let effect = scoped(
        connection("db", &log)
            .zip(connection("cache", &log))
            .and_then(|_| fail::<(), _>("query rejected".to_string())),
    );

    match runtime.run(effect) {
        Exit::Success(()) => println!("  unexpected success"),
        Exit::Failure(cause) => println!("  Failed: {}", cause),
    }
    println!("  Released: {:?}", log.lock().unwrap());
}

// ==================== Interruption ====================

/// Example 4: a fiber holding a resource is interrupted mid-sleep.
fn example_cleanup_on_interrupt(runtime: &Runtime) {
    println!("\n=== Example 4: Cleanup on Interruption ===");

    let log: Log = Arc::default();
    let opened = Deferred::<(), String>::new();
    let signal = opened.clone();

    let worker = scoped(
        connection("socket", &log)
            .and_then(move |_| signal.succeed(()))
            .and_then(|_| sleep(Duration::from_secs(3600))),
    );
    let effect = fork::<_, String>(worker).and_then(move |fiber| {
        opened
            .wait()
            .and_then(move |_| fiber.interrupt::<String>())
    });

    match runtime.run(effect) {
        Exit::Success(exit) => println!("  Worker ended interrupted: {}", exit.is_interrupted()),
        Exit::Failure(cause) => println!("  Failed: {}", cause),
    }
    println!("  Released: {:?}", log.lock().unwrap());
}

// ==================== Failing Release ====================

/// Example 5: a release that fails does not stop the others.
fn example_failing_release(runtime: &Runtime) {
    println!("\n=== Example 5: Failing Release ===");

    let log: Log = Arc::default();
    let flaky = acquire_release(succeed::<_, String>("flaky"), |_| async {
        Err::<(), _>(std::io::Error::other("connection reset during close"))
    });
    let effect = scoped(
        connection("first", &log)
            .zip(flaky)
            .zip(connection("last", &log))
            .map(|_| ()),
    );

    if let Exit::Failure(cause) = runtime.run(effect) {
        for defect in cause.defects() {
            println!("  {} defect: {}", defect.kind(), defect.message());
        }
    }
    println!("  Released: {:?}", log.lock().unwrap());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2))?;

    example_basic_bracket(&runtime);
    example_lifo_cleanup(&runtime);
    example_cleanup_on_failure(&runtime);
    example_cleanup_on_interrupt(&runtime);
    example_failing_release(&runtime);

    runtime.shutdown();
    Ok(())
}
