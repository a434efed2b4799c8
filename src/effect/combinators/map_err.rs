//! MapErr combinator - transforms the typed failure.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// MapErr combinator - transforms every typed failure in the cause.
///
/// Defects and interruptions pass through unchanged.
pub struct MapErr<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: F,
}

impl<Inner, F> std::fmt::Debug for MapErr<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapErr")
            .field("inner", &"<effect>")
            .field("f", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for MapErr<Inner, F>
where
    Inner: Effect,
    F: FnMut(Inner::Error) -> E2 + Send,
    E2: Send,
{
    type Output = Inner::Output;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<E2>> {
        self.inner.run(ctx).await.map_err(|cause| cause.map(self.f))
    }
}
