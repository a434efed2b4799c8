//! CatchTag combinator - recovers one variant of a tagged error.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;
use crate::tag::Tagged;

/// Recovers only failures whose [`Tagged::tag`] equals `tag`. Every other
/// failure, and every defect or interruption, propagates.
pub struct CatchTag<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) tag: &'static str,
    pub(crate) handler: F,
}

impl<Inner, F> std::fmt::Debug for CatchTag<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchTag")
            .field("inner", &"<effect>")
            .field("tag", &self.tag)
            .field("handler", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for CatchTag<Inner, F>
where
    Inner: Effect,
    Inner::Error: Tagged,
    F: FnOnce(Inner::Error) -> E2 + Send,
    E2: Effect<Output = Inner::Output, Error = Inner::Error>,
{
    type Output = Inner::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<Inner::Error>> {
        match self.inner.run(ctx).await {
            Ok(value) => Ok(value),
            Err(Cause::Fail(error)) if error.has_tag(self.tag) => {
                tracing::trace!(tag = self.tag, "recovering tagged failure");
                (self.handler)(error).run(ctx).await
            }
            Err(other) => Err(other),
        }
    }
}
