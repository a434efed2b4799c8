//! AndThen combinator - chains dependent effects.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// AndThen combinator - chains dependent effects.
///
/// The error type of the chained effect must match the error type
/// of the original effect. Use `map_err` to convert error types
/// before chaining:
///
/// ```rust,ignore
/// fetch_user(id)                           // Error = DbError
///     .map_err(AppError::from)             // Error = AppError
///     .and_then(|user| send_email(user))   // Error = AppError
/// ```
pub struct AndThen<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: F,
}

impl<Inner, F> std::fmt::Debug for AndThen<Inner, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AndThen")
            .field("inner", &"<effect>")
            .field("f", &"<function>")
            .finish()
    }
}

impl<Inner, F, E2> Effect for AndThen<Inner, F>
where
    Inner: Effect,
    E2: Effect<Error = Inner::Error>,
    F: FnOnce(Inner::Output) -> E2 + Send,
{
    type Output = E2::Output;
    type Error = Inner::Error;

    async fn run(self, ctx: &Ctx) -> Result<E2::Output, Cause<Inner::Error>> {
        let value = self.inner.run(ctx).await?;
        (self.f)(value).run(ctx).await
    }
}
