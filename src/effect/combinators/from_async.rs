//! FromAsync - effect from an async function.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Defect};

/// Effect from an async function.
///
/// The returned future is a suspension point: if the fiber is interrupted
/// while it is pending, the future is dropped and the effect ends with the
/// interruption. Panics become defects.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = from_async(|| async { Ok::<_, String>(42) });
/// assert_eq!(runtime.run(effect), Exit::Success(42));
/// ```
pub struct FromAsync<F> {
    f: F,
}

impl<F> std::fmt::Debug for FromAsync<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FromAsync")
            .field("f", &"<function>")
            .finish()
    }
}

impl<F> FromAsync<F> {
    /// Create a new FromAsync effect.
    pub fn new(f: F) -> Self {
        FromAsync { f }
    }
}

impl<F, Fut, T, E> Effect for FromAsync<F>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<T, Cause<E>> {
        let fut = AssertUnwindSafe((self.f)()).catch_unwind();
        match ctx.suspend(fut).await? {
            Ok(result) => result.map_err(Cause::Fail),
            Err(payload) => Err(Cause::Die(Defect::from_panic(payload))),
        }
    }
}
