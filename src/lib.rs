//! # millrace
//!
//! A structured-concurrency effect runtime.
//!
//! Computations are *effects*: values describing work that may succeed,
//! fail with a typed error, die with a defect, or be interrupted. A
//! [`Runtime`] runs effects on *fibers*, lightweight tasks arranged in a
//! parent/child tree, and guarantees that
//!
//! - resources registered in a [`Scope`] are released newest-first when
//!   the scope closes, whatever the outcome,
//! - interrupting a fiber interrupts its children first and still runs
//!   every finalizer,
//! - groups of effects run with an explicit concurrency limit, in input
//!   order, fail-fast or accumulating.
//!
//! [`Semaphore`] bounds access to shared resources with FIFO fairness and
//! [`Deferred`] provides one-shot signalling between fibers.
//!
//! ## Quick Example
//!
//! ```rust
//! use millrace::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let resource = |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
//!     let on_release = log.clone();
//!     acquire_release(succeed::<_, String>(name), move |name| async move {
//!         on_release.lock().unwrap().push(format!("release {}", name));
//!         Ok::<_, BoxError>(())
//!     })
//! };
//!
//! let program = scoped(
//!     resource("a", log.clone())
//!         .and_then({
//!             let log = log.clone();
//!             move |_| resource("b", log)
//!         })
//!         .map(|_| "done"),
//! );
//!
//! let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(1)).unwrap();
//! assert_eq!(runtime.run(program), Exit::Success("done"));
//! assert_eq!(*log.lock().unwrap(), vec!["release b", "release a"]);
//! runtime.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod context;
pub mod deferred;
pub mod effect;
pub mod exit;
pub mod fiber;
pub mod runtime;
pub mod scope;
pub mod semaphore;
pub mod tag;
pub mod testing;
mod util;

// Re-exports
pub use context::Ctx;
pub use deferred::Deferred;
pub use effect::{BoxedEffect, Concurrency, Effect, EffectExt, RunAllMode};
pub use exit::{BoxError, Cause, Defect, DefectKind, Exit};
pub use fiber::{FiberHandle, FiberId, FiberStatus};
pub use runtime::{Runtime, RuntimeConfig, RuntimeError};
pub use scope::{FinalizerErrors, FinalizerKey, Scope, ScopeError, ScopeExit};
pub use semaphore::{Semaphore, SemaphoreError};
pub use tag::Tagged;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::effect::prelude::*;
}
