//! Sleep and YieldNow - pure suspension points.

use std::marker::PhantomData;
use std::time::Duration;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// Suspends the fiber for a duration. Interruptible.
#[derive(Debug, Clone, Copy)]
pub struct Sleep<E> {
    duration: Duration,
    _phantom: PhantomData<E>,
}

impl<E> Sleep<E> {
    /// Create a new Sleep effect.
    pub fn new(duration: Duration) -> Self {
        Sleep {
            duration,
            _phantom: PhantomData,
        }
    }
}

impl<E: Send> Effect for Sleep<E> {
    type Output = ();
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<(), Cause<E>> {
        ctx.suspend(tokio::time::sleep(self.duration)).await
    }
}

/// Gives other fibers a chance to run, and observes interruption.
#[derive(Debug, Clone, Copy)]
pub struct YieldNow<E> {
    _phantom: PhantomData<E>,
}

impl<E> YieldNow<E> {
    /// Create a new YieldNow effect.
    pub fn new() -> Self {
        YieldNow {
            _phantom: PhantomData,
        }
    }
}

impl<E> Default for YieldNow<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send> Effect for YieldNow<E> {
    type Output = ();
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<(), Cause<E>> {
        ctx.checkpoint()?;
        ctx.suspend(tokio::task::yield_now()).await
    }
}
