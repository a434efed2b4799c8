//! Extension trait providing combinator methods for all Effects.
//!
//! The `EffectExt` trait is automatically implemented for all types
//! that implement `Effect`. It provides ergonomic combinator methods
//! like `map`, `and_then`, `catch_all`, and `boxed`.

use std::marker::PhantomData;
use std::time::Duration;

use crate::effect::boxed::BoxedEffect;
use crate::effect::bracket::Scoped;
use crate::effect::combinators::{
    AndThen, CatchAll, CatchSome, CatchTag, Exited, Map, MapErr, Tap, Timeout, Uninterruptible,
    Zip,
};
use crate::effect::trait_def::Effect;
use crate::fiber::Fork;
use crate::tag::Tagged;

/// Extension trait providing combinator methods for all Effects.
///
/// This trait is automatically implemented for all types that implement `Effect`.
/// You don't need to implement this trait yourself.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = succeed::<_, String>(21)
///     .map(|x| x * 2)
///     .and_then(|x| succeed(x + 1))
///     .map_err(|e| format!("Error: {}", e));
///
/// assert_eq!(runtime.run(effect), Exit::Success(43));
/// ```
pub trait EffectExt: Effect {
    /// Transform the success value.
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: FnOnce(Self::Output) -> U + Send,
        U: Send,
    {
        Map { inner: self, f }
    }

    /// Transform the typed failure. Defects and interruptions are untouched.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let effect = fail::<i32, _>("error")
    ///     .map_err(|e| format!("wrapped: {}", e));
    /// ```
    fn map_err<E2, F>(self, f: F) -> MapErr<Self, F>
    where
        F: FnMut(Self::Error) -> E2 + Send,
        E2: Send,
    {
        MapErr { inner: self, f }
    }

    /// Chain a dependent effect.
    ///
    /// If this effect succeeds, apply the function to produce the next effect.
    /// If this effect fails, propagate the error.
    fn and_then<E2, F>(self, f: F) -> AndThen<Self, F>
    where
        E2: Effect<Error = Self::Error>,
        F: FnOnce(Self::Output) -> E2 + Send,
    {
        AndThen { inner: self, f }
    }

    /// Recover from any typed failure.
    ///
    /// Defects and interruptions are not recoverable and pass through.
    /// Prefer [`catch_tag`](Self::catch_tag) or
    /// [`catch_some`](Self::catch_some) so unrelated failures keep
    /// propagating.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let effect = fail::<i32, _>("error")
    ///     .catch_all(|_| succeed::<_, String>(42));
    /// ```
    fn catch_all<E2, F>(self, f: F) -> CatchAll<Self, F>
    where
        E2: Effect<Output = Self::Output>,
        F: FnOnce(Self::Error) -> E2 + Send,
    {
        CatchAll { inner: self, f }
    }

    /// Recover from the typed failures the partial function accepts.
    fn catch_some<E2, F>(self, partial_fn: F) -> CatchSome<Self, F>
    where
        F: FnOnce(&Self::Error) -> Option<E2> + Send,
        E2: Effect<Output = Self::Output, Error = Self::Error>,
    {
        CatchSome {
            inner: self,
            partial_fn,
        }
    }

    /// Recover from the failure variant whose tag is `tag`; all other
    /// variants keep propagating.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let effect = load_user(id)
    ///     .catch_tag("NotFound", |_| succeed(User::guest()));
    /// ```
    fn catch_tag<E2, F>(self, tag: &'static str, handler: F) -> CatchTag<Self, F>
    where
        Self::Error: Tagged,
        F: FnOnce(Self::Error) -> E2 + Send,
        E2: Effect<Output = Self::Output, Error = Self::Error>,
    {
        CatchTag {
            inner: self,
            tag,
            handler,
        }
    }

    /// Perform a side effect and return the original value.
    ///
    /// If the side effect fails, the entire computation fails.
    fn tap<E2, F>(self, f: F) -> Tap<Self, F>
    where
        F: FnOnce(&Self::Output) -> E2 + Send,
        E2: Effect<Output = (), Error = Self::Error>,
    {
        Tap { inner: self, f }
    }

    /// Run this effect, then `other`, and pair their values.
    fn zip<E2>(self, other: E2) -> Zip<Self, E2>
    where
        E2: Effect<Error = Self::Error>,
    {
        Zip::new(self, other)
    }

    /// Succeed with this effect's [`Exit`](crate::Exit), whatever it is.
    fn exit<E2: Send>(self) -> Exited<Self, E2> {
        Exited {
            inner: self,
            _marker: PhantomData,
        }
    }

    /// Mask interruption while this effect runs.
    fn uninterruptible(self) -> Uninterruptible<Self> {
        Uninterruptible { inner: self }
    }

    /// Give up after `duration`, yielding `None`.
    fn timeout(self, duration: Duration) -> Timeout<Self>
    where
        Self: 'static,
    {
        Timeout {
            inner: self,
            duration,
        }
    }

    /// Run this effect in its own scope, released when it ends.
    fn scoped(self) -> Scoped<Self> {
        crate::effect::bracket::scoped(self)
    }

    /// Start this effect on a child fiber of the current one.
    fn fork<E2>(self) -> Fork<Self, E2>
    where
        Self: 'static,
    {
        Fork::new(self, false)
    }

    /// Start this effect on a fiber owned by the runtime rather than the
    /// current fiber. It outlives its parent.
    fn fork_daemon<E2>(self) -> Fork<Self, E2>
    where
        Self: 'static,
    {
        Fork::new(self, true)
    }

    /// Convert to a boxed effect for type erasure.
    fn boxed(self) -> BoxedEffect<Self::Output, Self::Error>
    where
        Self: 'static,
    {
        BoxedEffect::new(self)
    }
}

// Blanket implementation for all Effect types
impl<E: Effect> EffectExt for E {}
