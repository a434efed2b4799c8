//! Zip combinator - runs two effects in sequence and pairs the results.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// Runs `first`, then `second`, and yields both values.
///
/// Fail-fast: `second` does not run if `first` fails. Use
/// [`run_all`](crate::effect::run_all) to run effects concurrently.
pub struct Zip<E1, E2> {
    first: E1,
    second: E2,
}

impl<E1, E2> std::fmt::Debug for Zip<E1, E2> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zip")
            .field("first", &"<effect>")
            .field("second", &"<effect>")
            .finish()
    }
}

impl<E1, E2> Zip<E1, E2> {
    /// Create a new Zip effect.
    pub fn new(first: E1, second: E2) -> Self {
        Zip { first, second }
    }
}

impl<E1, E2> Effect for Zip<E1, E2>
where
    E1: Effect,
    E2: Effect<Error = E1::Error>,
{
    type Output = (E1::Output, E2::Output);
    type Error = E1::Error;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<E1::Error>> {
        let a = self.first.run(ctx).await?;
        let b = self.second.run(ctx).await?;
        Ok((a, b))
    }
}
