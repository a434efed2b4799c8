//! CatchAll combinator - recovers from any typed failure.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Defect};

/// Recovers from any typed failure by running the effect the handler
/// returns.
///
/// Defects and interruptions always propagate. A typed failure followed by
/// finalizer defects is still handed to the handler, and the defects are
/// attached to whatever the handler produces, so the effect as a whole
/// still dies with them.
pub struct CatchAll<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: F,
}

impl<Inner, F> std::fmt::Debug for CatchAll<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchAll")
            .field("inner", &"<effect>")
            .field("f", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for CatchAll<Inner, F>
where
    Inner: Effect,
    E2: Effect<Output = Inner::Output>,
    F: FnOnce(Inner::Error) -> E2 + Send,
{
    type Output = Inner::Output;
    type Error = E2::Error;

    async fn run(self, ctx: &Ctx) -> Result<Inner::Output, Cause<E2::Error>> {
        match self.inner.run(ctx).await {
            Ok(value) => Ok(value),
            Err(cause) => match cause.into_failure_and_defects() {
                Ok((error, defects)) => {
                    let recovered = (self.f)(error).run(ctx).await;
                    match Cause::sequence(defects.into_iter().map(Cause::Die).collect()) {
                        None => recovered,
                        Some(cleanup) => match recovered {
                            Ok(_) => Err(cleanup),
                            Err(cause) => Err(cause.then(cleanup)),
                        },
                    }
                }
                Err(other) => Err(retype(other)),
            },
        }
    }
}

/// Rebuild an unrecoverable cause under a new error type. A typed failure
/// nested in a composite cause has no representation there and becomes a
/// defect.
pub(crate) fn retype<E, E2>(cause: Cause<E>) -> Cause<E2> {
    match cause {
        Cause::Fail(_) => Cause::Die(Defect::new("typed failure followed by a cleanup defect")),
        Cause::Die(defect) => Cause::Die(defect),
        Cause::Interrupt(id) => Cause::Interrupt(id),
        Cause::Then(a, b) => Cause::Then(Box::new(retype(*a)), Box::new(retype(*b))),
    }
}
