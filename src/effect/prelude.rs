//! Prelude module for convenient imports.
//!
//! Re-exports the effect traits, constructors, and runtime types most
//! programs need, so a single `use` is enough:
//!
//! ```rust
//! use millrace::prelude::*;
//!
//! let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(1)).unwrap();
//! let exit = runtime.run(succeed::<_, String>(20).map(|x| x + 1).map(|x| x * 2));
//! assert_eq!(exit, Exit::Success(42));
//! runtime.shutdown();
//! ```
//!
//! Use direct imports instead when you only need a few items or want to
//! avoid name clashes (`fork`, `sleep`, and `timeout` are common names).

// Traits
pub use crate::effect::ext::EffectExt;
pub use crate::effect::tracing::EffectTracingExt;
pub use crate::effect::trait_def::Effect;
pub use crate::tag::Tagged;

// Boxed Effect
pub use crate::effect::boxed::BoxedEffect;

// Constructors
pub use crate::effect::bracket::{
    acquire_release, acquire_release_exit, add_finalizer, bracket, scoped,
};
pub use crate::effect::constructors::{
    die, fail, fork, fork_daemon, from_async, from_fn, from_result, pure, sleep, succeed, timeout,
    uninterruptible, yield_now,
};
pub use crate::effect::parallel::{run_all, run_all_settled, Concurrency};

// Runtime and primitives
pub use crate::context::Ctx;
pub use crate::deferred::Deferred;
pub use crate::exit::{BoxError, Cause, Defect, Exit};
pub use crate::fiber::{FiberHandle, FiberId, FiberStatus};
pub use crate::runtime::{Runtime, RuntimeConfig};
pub use crate::scope::{Scope, ScopeExit};
pub use crate::semaphore::Semaphore;
