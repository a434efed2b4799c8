//! Exited combinator - reifies the outcome of an effect as a value.

use std::marker::PhantomData;

use crate::context::Ctx;
use crate::effect::combinators::catch_all::retype;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Exit};

/// Runs the inner effect and always succeeds with its [`Exit`].
///
/// Interruption of the *current* fiber is the exception: it still
/// propagates, so a fiber cannot swallow its own cancellation.
pub struct Exited<Inner, E2> {
    pub(crate) inner: Inner,
    pub(crate) _marker: PhantomData<E2>,
}

impl<Inner, E2> std::fmt::Debug for Exited<Inner, E2> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exited")
            .field("inner", &"<effect>")
            .finish()
    }
}

impl<Inner, E2> Effect for Exited<Inner, E2>
where
    Inner: Effect,
    E2: Send,
{
    type Output = Exit<Inner::Output, Inner::Error>;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<E2>> {
        let exit: Exit<_, _> = self.inner.run(ctx).await.into();
        match exit {
            Exit::Failure(cause)
                if cause.is_interrupted() && cause.interruptions().contains(&ctx.fiber_id()) =>
            {
                Err(retype(cause))
            }
            other => Ok(other),
        }
    }
}
