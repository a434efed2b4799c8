//! Tap combinator - perform side effect and return original value.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// An effect that performs a side effect and returns the original value.
///
/// Created by [`EffectExt::tap`](crate::effect::EffectExt::tap).
pub struct Tap<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: F,
}

impl<Inner, F> std::fmt::Debug for Tap<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tap")
            .field("inner", &"<effect>")
            .field("f", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for Tap<Inner, F>
where
    Inner: Effect,
    F: FnOnce(&Inner::Output) -> E2 + Send,
    E2: Effect<Output = (), Error = Inner::Error>,
{
    type Output = Inner::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<Inner::Error>> {
        let value = self.inner.run(ctx).await?;
        (self.f)(&value).run(ctx).await?;
        Ok(value)
    }
}
