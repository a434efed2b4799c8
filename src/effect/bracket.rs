//! Scoped resource management.
//!
//! Resources are tied to the scope in the running fiber's [`Ctx`]:
//!
//! - [`acquire_release`] acquires a value and registers its release in the
//!   current scope. The release runs when that scope closes, newest-first
//!   with every other finalizer, whatever the outcome.
//! - [`scoped`] runs an effect in a fresh child scope and closes it as soon
//!   as the effect ends, so resources acquired inside live exactly as long
//!   as the block.
//! - [`bracket`] combines the two for the common acquire / use / release
//!   shape.
//!
//! Acquisition runs uninterruptibly: once an acquire has started it either
//! fails (and nothing is registered) or its release is registered, so an
//! interruption can never leak a resource.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let program = scoped(
//!     acquire_release(open_connection(), |conn| async move { conn.close().await })
//!         .and_then(|conn| run_query(conn)),
//! );
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::context::Ctx;
use crate::effect::combinators::AndThen;
use crate::effect::trait_def::Effect;
use crate::exit::{BoxError, Cause, Defect};
use crate::scope::{boxed_finalizer, run_finalizer, Finalizer, ScopeError, ScopeExit};

/// Register `finalizer` for `resource` in the current scope. If the scope
/// has already closed the release runs immediately and the effect dies.
async fn register_release<R, E>(ctx: &Ctx, resource: R, finalizer: Finalizer) -> Result<R, Cause<E>> {
    match ctx.scope().register(finalizer) {
        Ok(_) => Ok(resource),
        Err(finalizer) => {
            tracing::warn!(fiber = %ctx.fiber_id(), "acquired into a closed scope, releasing immediately");
            let closed = Cause::Die(Defect::misuse(ScopeError::Closed));
            match run_finalizer(finalizer, ScopeExit::Failure).await {
                Ok(()) => Err(closed),
                Err(defect) => Err(closed.then(Cause::Die(defect))),
            }
        }
    }
}

/// Effect returned by [`acquire_release`].
pub struct AcquireRelease<Acq, Rel> {
    acquire: Acq,
    release: Rel,
}

impl<Acq, Rel> std::fmt::Debug for AcquireRelease<Acq, Rel> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireRelease")
            .field("acquire", &"<effect>")
            .field("release", &"<function>")
            .finish()
    }
}

impl<Acq, Rel, Fut, Err> Effect for AcquireRelease<Acq, Rel>
where
    Acq: Effect,
    Acq::Output: Clone + 'static,
    Rel: FnOnce(Acq::Output) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    type Output = Acq::Output;
    type Error = Acq::Error;

    async fn run(self, ctx: &Ctx) -> Result<Acq::Output, Cause<Acq::Error>> {
        let resource = self.acquire.run(&ctx.masked()).await?;
        let held = resource.clone();
        let release = self.release;
        let finalizer = boxed_finalizer(move |_exit| release(held));
        register_release(ctx, resource, finalizer).await
    }
}

/// Effect returned by [`acquire_release_exit`].
pub struct AcquireReleaseExit<Acq, Rel> {
    acquire: Acq,
    release: Rel,
}

impl<Acq, Rel> std::fmt::Debug for AcquireReleaseExit<Acq, Rel> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireReleaseExit")
            .field("acquire", &"<effect>")
            .field("release", &"<function>")
            .finish()
    }
}

impl<Acq, Rel, Fut, Err> Effect for AcquireReleaseExit<Acq, Rel>
where
    Acq: Effect,
    Acq::Output: Clone + 'static,
    Rel: FnOnce(Acq::Output, ScopeExit) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    type Output = Acq::Output;
    type Error = Acq::Error;

    async fn run(self, ctx: &Ctx) -> Result<Acq::Output, Cause<Acq::Error>> {
        let resource = self.acquire.run(&ctx.masked()).await?;
        let held = resource.clone();
        let release = self.release;
        let finalizer = boxed_finalizer(move |exit| release(held, exit));
        register_release(ctx, resource, finalizer).await
    }
}

/// Effect returned by [`add_finalizer`].
pub struct AddFinalizer<F, E> {
    finalizer: F,
    _marker: PhantomData<E>,
}

impl<F, E> std::fmt::Debug for AddFinalizer<F, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddFinalizer")
            .field("finalizer", &"<function>")
            .finish()
    }
}

impl<F, Fut, Err, E> Effect for AddFinalizer<F, E>
where
    F: FnOnce(ScopeExit) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
    E: Send,
{
    type Output = ();
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<(), Cause<E>> {
        ctx.scope()
            .add_finalizer(self.finalizer)
            .map(|_| ())
            .map_err(|e| Cause::Die(Defect::misuse(e)))
    }
}

/// Effect returned by [`scoped`].
pub struct Scoped<Inner> {
    inner: Inner,
}

impl<Inner> std::fmt::Debug for Scoped<Inner> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoped")
            .field("inner", &"<effect>")
            .finish()
    }
}

impl<Inner: Effect> Effect for Scoped<Inner> {
    type Output = Inner::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<Inner::Error>> {
        let scope = ctx
            .scope()
            .fork()
            .map_err(|e| Cause::Die(Defect::misuse(e)))?;
        let inner_ctx = ctx.with_scope(scope.clone());
        let result = match AssertUnwindSafe(self.inner.run(&inner_ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Cause::Die(Defect::from_panic(payload))),
        };
        scope.close_with(result).await
    }
}

/// Acquire a resource and register its release in the current scope.
///
/// `acquire` runs uninterruptibly. If it fails, nothing is registered.
/// Otherwise `release` receives a clone of the value when the scope
/// closes; wrap handles that are not `Clone` in an `Arc`. A failing or
/// panicking release becomes a finalizer defect attached to the scope's
/// outcome; it never stops other releases.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let conn = acquire_release(
///     from_async(|| pool.checkout()),
///     |conn| async move { conn.checkin().await },
/// );
/// ```
pub fn acquire_release<Acq, Rel, Fut, Err>(acquire: Acq, release: Rel) -> AcquireRelease<Acq, Rel>
where
    Acq: Effect,
    Acq::Output: Clone + 'static,
    Rel: FnOnce(Acq::Output) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    AcquireRelease { acquire, release }
}

/// Like [`acquire_release`], with the release told how the scope ended.
pub fn acquire_release_exit<Acq, Rel, Fut, Err>(
    acquire: Acq,
    release: Rel,
) -> AcquireReleaseExit<Acq, Rel>
where
    Acq: Effect,
    Acq::Output: Clone + 'static,
    Rel: FnOnce(Acq::Output, ScopeExit) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    AcquireReleaseExit { acquire, release }
}

/// Register a finalizer in the current scope.
pub fn add_finalizer<F, Fut, Err, E>(finalizer: F) -> AddFinalizer<F, E>
where
    F: FnOnce(ScopeExit) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
    E: Send,
{
    AddFinalizer {
        finalizer,
        _marker: PhantomData,
    }
}

/// Run `effect` in a child scope of the current one, closing it when the
/// effect ends.
///
/// The result is the effect's own outcome with any finalizer failures
/// appended; a success whose cleanup failed becomes a defect.
pub fn scoped<Inner: Effect>(effect: Inner) -> Scoped<Inner> {
    Scoped { inner: effect }
}

/// Acquire, use, and release a resource in its own scope.
///
/// Equivalent to `scoped(acquire_release(acquire, release).and_then(use_fn))`.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = bracket(
///     from_fn(|| File::open("data.txt").map(Arc::new)),
///     |_file| async { Ok::<_, BoxError>(()) },
///     |file| from_fn(move || read_contents(&file)),
/// );
/// ```
pub fn bracket<Acq, Rel, Fut, Err, Use, UseEffect>(
    acquire: Acq,
    release: Rel,
    use_fn: Use,
) -> Scoped<AndThen<AcquireRelease<Acq, Rel>, Use>>
where
    Acq: Effect,
    Acq::Output: Clone + 'static,
    Rel: FnOnce(Acq::Output) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
    Use: FnOnce(Acq::Output) -> UseEffect + Send,
    UseEffect: Effect<Error = Acq::Error>,
{
    scoped(AndThen {
        inner: acquire_release(acquire, release),
        f: use_fn,
    })
}
