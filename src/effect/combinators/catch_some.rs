//! CatchSome combinator for Option-based partial recovery.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// Recovers using an Option-returning partial function.
///
/// The function inspects the typed failure by reference. Returning `None`
/// lets the original failure propagate untouched.
///
/// # Examples
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = fetch_config()
///     .catch_some(|e| match e {
///         ConfigError::Missing => Some(succeed(Config::default())),
///         _ => None,
///     });
/// ```
pub struct CatchSome<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) partial_fn: F,
}

impl<Inner, F> std::fmt::Debug for CatchSome<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchSome")
            .field("inner", &"<effect>")
            .field("partial_fn", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for CatchSome<Inner, F>
where
    Inner: Effect,
    F: FnOnce(&Inner::Error) -> Option<E2> + Send,
    E2: Effect<Output = Inner::Output, Error = Inner::Error>,
{
    type Output = Inner::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<Inner::Error>> {
        match self.inner.run(ctx).await {
            Ok(value) => Ok(value),
            Err(Cause::Fail(error)) => match (self.partial_fn)(&error) {
                Some(recovery) => recovery.run(ctx).await,
                None => Err(Cause::Fail(error)),
            },
            Err(other) => Err(other),
        }
    }
}
