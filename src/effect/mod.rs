//! Effects: descriptions of computations run by fibers.
//!
//! An effect is a value implementing [`Effect`]. Building one does
//! nothing; running it on a [`Runtime`](crate::Runtime) starts a fiber that
//! drives it to an [`Exit`](crate::Exit). Combinators return concrete
//! types, so pipelines compile down to nested structs; [`BoxedEffect`]
//! erases the type when it must be named.
//!
//! # Overview
//!
//! | Concern | Items |
//! |---------|-------|
//! | Constructors | [`succeed`], [`fail`], [`die`], [`from_fn`], [`from_async`], [`from_result`], [`sleep`], [`yield_now`] |
//! | Sequencing | [`EffectExt::map`], [`EffectExt::and_then`], [`EffectExt::zip`], [`EffectExt::tap`] |
//! | Recovery | [`EffectExt::catch_tag`], [`EffectExt::catch_some`], [`EffectExt::catch_all`], [`EffectExt::map_err`] |
//! | Resources | [`acquire_release`], [`acquire_release_exit`], [`add_finalizer`], [`scoped`], [`bracket`] |
//! | Fibers | [`fork`], [`fork_daemon`], [`FiberHandle::join`](crate::FiberHandle::join), [`timeout`], [`uninterruptible`] |
//! | Groups | [`run_all`], [`run_all_settled`], [`Concurrency`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let program = bracket(
//!     from_fn(|| Ok::<_, String>(Arc::new(Connection::open()))),
//!     |conn| async move { conn.close() },
//!     |conn| from_async(move || async move { conn.query("select 1").await }),
//! );
//!
//! let exit = runtime.run(program);
//! ```

pub mod boxed;
pub mod bracket;
pub mod combinators;
pub mod constructors;
pub mod ext;
pub mod parallel;
pub mod prelude;
pub mod tracing;
mod trait_def;

// Re-export core trait
pub use trait_def::Effect;

// Re-export extension traits
pub use ext::EffectExt;
pub use self::tracing::{EffectTracingExt, Instrument};

// Re-export boxed types
pub use boxed::{BoxFuture, BoxedEffect};

// Re-export all combinator types
pub use combinators::{
    AndThen, CatchAll, CatchSome, CatchTag, Die, Exited, Fail, FromAsync, FromFn, FromResult, Map,
    MapErr, Sleep, Succeed, Tap, Timeout, Uninterruptible, YieldNow, Zip,
};

// Re-export resource management
pub use bracket::{
    acquire_release, acquire_release_exit, add_finalizer, bracket, scoped, AcquireRelease,
    AcquireReleaseExit, AddFinalizer, Scoped,
};

// Re-export constructors
pub use constructors::{
    die, fail, fork, fork_daemon, from_async, from_fn, from_result, pure, sleep, succeed, timeout,
    uninterruptible, yield_now,
};

// Re-export parallel execution
pub use parallel::{run_all, run_all_settled, Concurrency, RunAll, RunAllMode, RunAllSettled};
