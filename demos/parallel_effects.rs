//! Parallel Effects Example
//!
//! Demonstrates running groups of effects on the millrace runtime:
//! - `run_all` with a concurrency limit, results in input order
//! - fail-fast: the first failure interrupts the rest
//! - `run_all_settled` to collect every outcome
//! - a `Semaphore` guarding a shared resource across fibers
//! - a `Deferred` used as a start signal
//! - `timeout` on a slow effect
//!
//! Run with: cargo run --example parallel_effects

use std::time::{Duration, Instant};

use millrace::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: u32,
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
enum FetchError {
    NotFound(u32),
    Unavailable,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound(id) => write!(f, "user {} not found", id),
            FetchError::Unavailable => write!(f, "service unavailable"),
        }
    }
}

/// Simulated lookup taking 50ms. Ids above 100 do not exist.
fn fetch_user(id: u32) -> BoxedEffect<User, FetchError> {
    sleep(Duration::from_millis(50))
        .and_then(move |_| {
            from_result(if id > 100 {
                Err(FetchError::NotFound(id))
            } else {
                Ok(User {
                    id,
                    name: format!("user-{}", id),
                })
            })
        })
        .boxed()
}

// ==================== run_all ====================

fn example_run_all(runtime: &Runtime) {
    println!("\n=== Example 1: run_all with a limit of 3 ===\n");

    let start = Instant::now();
    let effects: Vec<_> = (1..=6).map(fetch_user).collect();
    match runtime.run(run_all(effects, Concurrency::Bounded(3))) {
        Exit::Success(users) => {
            println!("✓ Loaded {} users in {:?}", users.len(), start.elapsed());
            for user in users {
                println!("  - User {}: {}", user.id, user.name);
            }
        }
        Exit::Failure(cause) => println!("✗ Failed: {}", cause),
    }

    println!("\nNote: six 50ms lookups, three at a time, take ~100ms");
}

// ==================== Fail-fast ====================

fn example_fail_fast(runtime: &Runtime) {
    println!("\n=== Example 2: Fail-fast ===\n");

    let effects: Vec<_> = [1, 2, 404, 4, 5].into_iter().map(fetch_user).collect();
    match runtime.run(run_all(effects, Concurrency::Bounded(2))) {
        Exit::Success(users) => println!("Loaded {} users", users.len()),
        Exit::Failure(cause) => println!("✓ Stopped at first failure: {}", cause),
    }
}

// ==================== Settled ====================

fn example_settled(runtime: &Runtime) {
    println!("\n=== Example 3: run_all_settled ===\n");

    let effects: Vec<_> = [7, 404, 9, 500].into_iter().map(fetch_user).collect();
    let exit = runtime.run(run_all_settled::<_, _, FetchError>(
        effects,
        Concurrency::Unbounded,
    ));
    if let Exit::Success(exits) = exit {
        for (i, exit) in exits.iter().enumerate() {
            match exit {
                Exit::Success(user) => println!("  {}. ok   {}", i + 1, user.name),
                Exit::Failure(cause) => println!("  {}. fail {}", i + 1, cause),
            }
        }
    }
}

// ==================== Semaphore ====================

fn example_semaphore(runtime: &Runtime) {
    println!("\n=== Example 4: Semaphore with 2 permits ===\n");

    let pool = Semaphore::new(2);
    let jobs: Vec<BoxedEffect<u32, FetchError>> = (1..=5)
        .map(|id| {
            let report = pool.clone();
            pool.with_permit(fetch_user(id).map(move |user| {
                println!(
                    "  {} done, {} permit(s) in use",
                    user.name,
                    report.in_use()
                );
                user.id
            }))
            .boxed()
        })
        .collect();

    let exit = runtime.run(run_all(jobs, Concurrency::Unbounded));
    println!("  Result: {:?}, permits free: {}", exit, pool.available());
}

// ==================== Deferred ====================

fn example_deferred(runtime: &Runtime) {
    println!("\n=== Example 5: Deferred start signal ===\n");

    let go = Deferred::<u32, FetchError>::new();
    let waiters: Vec<BoxedEffect<User, FetchError>> = (0..3)
        .map(|_| go.wait().and_then(fetch_user).boxed())
        .collect();

    let signal = go.clone();
    let program = fork::<_, FetchError>(run_all(waiters, Concurrency::Unbounded)).and_then(
        move |group| {
            sleep(Duration::from_millis(10))
                .and_then(move |_| signal.succeed(42))
                .and_then(move |_| group.join())
        },
    );

    match runtime.run(program) {
        Exit::Success(users) => println!("✓ {} waiters released, all fetched user {}", users.len(), users[0].id),
        Exit::Failure(cause) => println!("✗ {}", cause),
    }
}

// ==================== Timeout ====================

fn example_timeout(runtime: &Runtime) {
    println!("\n=== Example 6: Timeout ===\n");

    let slow = sleep::<FetchError>(Duration::from_secs(10))
        .and_then(|_| fail::<User, _>(FetchError::Unavailable))
        .timeout(Duration::from_millis(20));
    match runtime.run(slow) {
        Exit::Success(None) => println!("✓ Gave up after 20ms"),
        other => println!("Unexpected: {:?}", other),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let runtime = Runtime::new(
        RuntimeConfig::default()
            .with_worker_threads(4)
            .with_default_concurrency(4),
    )?;

    example_run_all(&runtime);
    example_fail_fast(&runtime);
    example_settled(&runtime);
    example_semaphore(&runtime);
    example_deferred(&runtime);
    example_timeout(&runtime);

    runtime.shutdown();
    Ok(())
}
