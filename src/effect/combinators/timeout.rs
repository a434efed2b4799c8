//! Timeout combinator - bounds an effect's running time.

use std::time::Duration;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Exit};
use crate::fiber;

/// Runs the inner effect on a child fiber and waits at most `duration`.
///
/// Yields `Some(value)` if it finished in time and `None` if it had to be
/// interrupted. The child is fully unwound, finalizers included, before
/// `None` is returned. Failures of the inner effect, and finalizer defects
/// raised while unwinding it, propagate.
pub struct Timeout<Inner> {
    pub(crate) inner: Inner,
    pub(crate) duration: Duration,
}

impl<Inner> std::fmt::Debug for Timeout<Inner> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("inner", &"<effect>")
            .field("duration", &self.duration)
            .finish()
    }
}

impl<Inner> Effect for Timeout<Inner>
where
    Inner: Effect + 'static,
    Inner::Output: 'static,
    Inner::Error: 'static,
{
    type Output = Option<Inner::Output>;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<Inner::Error>> {
        let handle = fiber::spawn(self.inner, ctx.fiber(), ctx.runtime());
        let child = handle.id();
        let finished = ctx
            .suspend(tokio::time::timeout(self.duration, handle.inner().wait_done()))
            .await?;
        let timed_out = finished.is_err();
        if timed_out {
            tracing::debug!(fiber = %child, timeout = ?self.duration, "timed out, interrupting");
            handle.request_interrupt();
        }
        match handle.wait().await {
            Exit::Success(value) => Ok(Some(value)),
            Exit::Failure(cause)
                if timed_out
                    && cause.interruptions().contains(&child)
                    && cause.defects().is_empty() =>
            {
                Ok(None)
            }
            Exit::Failure(cause) => Err(cause),
        }
    }
}
