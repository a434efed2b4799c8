//! Constructor functions for creating effects.
//!
//! These functions provide ergonomic ways to create effects without
//! directly constructing the combinator types.

use std::future::Future;
use std::time::Duration;

use crate::effect::combinators::{
    Die, Fail, FromAsync, FromFn, FromResult, Sleep, Succeed, Timeout, Uninterruptible, YieldNow,
};
use crate::effect::trait_def::Effect;
use crate::exit::{BoxError, Defect};
use crate::fiber::Fork;

/// Create an effect that succeeds with the given value.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = succeed::<_, String>(42);
/// assert_eq!(runtime.run(effect), Exit::Success(42));
/// ```
pub fn succeed<T: Send, E: Send>(value: T) -> Succeed<T, E> {
    Succeed::new(value)
}

/// Alias for [`succeed`].
pub fn pure<T: Send, E: Send>(value: T) -> Succeed<T, E> {
    Succeed::new(value)
}

/// Create an effect that fails with the given typed error.
pub fn fail<T: Send, E: Send>(error: E) -> Fail<T, E> {
    Fail::new(error)
}

/// Create an effect that dies with a defect. Typed recovery does not
/// catch it.
pub fn die<T: Send, E: Send>(error: impl Into<BoxError>) -> Die<T, E> {
    Die::new(Defect::new(error))
}

/// Lift a `Result` into an effect.
pub fn from_result<T: Send, E: Send>(result: Result<T, E>) -> FromResult<T, E> {
    FromResult::new(result)
}

/// Create an effect from a synchronous function. Panics become defects.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = from_fn(|| "42".parse::<i32>());
/// ```
pub fn from_fn<T, E, F>(f: F) -> FromFn<F>
where
    F: FnOnce() -> Result<T, E> + Send,
    T: Send,
    E: Send,
{
    FromFn::new(f)
}

/// Create an effect from an async function.
///
/// The future is a suspension point: interrupting the fiber drops it.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = from_async(|| async { reqwest::get(url).await });
/// ```
pub fn from_async<T, E, F, Fut>(f: F) -> FromAsync<F>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    FromAsync::new(f)
}

/// Suspend the fiber for `duration`.
pub fn sleep<E: Send>(duration: Duration) -> Sleep<E> {
    Sleep::new(duration)
}

/// Let other fibers run, observing any pending interruption.
pub fn yield_now<E: Send>() -> YieldNow<E> {
    YieldNow::new()
}

/// Start `effect` on a child fiber and return its handle immediately.
///
/// The child is interrupted if it is still running when the current fiber
/// ends. Join it, interrupt it, or use [`fork_daemon`] to detach it.
pub fn fork<Eff, E>(effect: Eff) -> Fork<Eff, E>
where
    Eff: Effect + 'static,
    E: Send,
{
    Fork::new(effect, false)
}

/// Start `effect` on a fiber owned by the runtime. It is not interrupted
/// when the current fiber ends, only at runtime shutdown.
pub fn fork_daemon<Eff, E>(effect: Eff) -> Fork<Eff, E>
where
    Eff: Effect + 'static,
    E: Send,
{
    Fork::new(effect, true)
}

/// Mask interruption while `effect` runs.
pub fn uninterruptible<Eff: Effect>(effect: Eff) -> Uninterruptible<Eff> {
    Uninterruptible { inner: effect }
}

/// Run `effect` for at most `duration`.
pub fn timeout<Eff>(effect: Eff, duration: Duration) -> Timeout<Eff>
where
    Eff: Effect + 'static,
{
    Timeout {
        inner: effect,
        duration,
    }
}
