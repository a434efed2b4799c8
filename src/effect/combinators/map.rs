//! Map combinator - transforms the success value.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// Map combinator - transforms the success value.
pub struct Map<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: F,
}

impl<Inner, F> std::fmt::Debug for Map<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("inner", &"<effect>")
            .field("f", &"<function>")
            .finish()
    }
}

impl<Inner, F, U> Effect for Map<Inner, F>
where
    Inner: Effect,
    F: FnOnce(Inner::Output) -> U + Send,
    U: Send,
{
    type Output = U;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<U, Cause<Inner::Error>> {
        self.inner.run(ctx).await.map(self.f)
    }
}
