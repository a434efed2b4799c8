//! BoxedEffect - type-erased effect for opt-in boxing.
//!
//! Use `BoxedEffect` when you need to:
//! - Store different effect types in a collection
//! - Return different effects from match arms
//! - Create recursive effect functions
//!
//! Boxing clones the [`Ctx`] into the future so it is `'static`. The
//! context is a handful of `Arc`s, so this is cheap.

use std::future::Future;
use std::pin::Pin;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased effect.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// fn countdown(n: u32) -> BoxedEffect<u32, String> {
///     if n == 0 {
///         succeed(0).boxed()
///     } else {
///         yield_now()
///             .and_then(move |_| countdown(n - 1))
///             .map(move |rest| n + rest)
///             .boxed()
///     }
/// }
/// ```
pub struct BoxedEffect<T, E> {
    run_fn: Box<dyn FnOnce(Ctx) -> BoxFuture<'static, Result<T, Cause<E>>> + Send>,
}

impl<T, E> std::fmt::Debug for BoxedEffect<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedEffect")
            .field("run_fn", &"<function>")
            .finish()
    }
}

impl<T, E> BoxedEffect<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Erase the type of `effect`.
    pub fn new<Eff>(effect: Eff) -> Self
    where
        Eff: Effect<Output = T, Error = E> + 'static,
    {
        BoxedEffect {
            run_fn: Box::new(move |ctx: Ctx| Box::pin(async move { effect.run(&ctx).await })),
        }
    }
}

impl<T, E> Effect for BoxedEffect<T, E>
where
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    fn run(self, ctx: &Ctx) -> impl Future<Output = Result<T, Cause<E>>> + Send {
        (self.run_fn)(ctx.clone())
    }
}
