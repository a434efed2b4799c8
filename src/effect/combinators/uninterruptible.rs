//! Uninterruptible combinator - masks interruption for a region.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// Runs the inner effect with interruption masked. Suspension points
/// inside it wait to completion; a pending interruption is observed at the
/// first suspension point after the region.
pub struct Uninterruptible<Inner> {
    pub(crate) inner: Inner,
}

impl<Inner> std::fmt::Debug for Uninterruptible<Inner> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uninterruptible")
            .field("inner", &"<effect>")
            .finish()
    }
}

impl<Inner: Effect> Effect for Uninterruptible<Inner> {
    type Output = Inner::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<Inner::Error>> {
        self.inner.run(&ctx.masked()).await
    }
}
