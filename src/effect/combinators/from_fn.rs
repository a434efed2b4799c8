//! FromFn - effect from a synchronous function.

use std::panic::{self, AssertUnwindSafe};

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Defect};

/// Effect from a synchronous function.
///
/// The function runs as one uninterruptible step. A panic inside it is
/// caught and becomes a defect.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = from_fn(|| "42".parse::<i32>());
/// assert_eq!(runtime.run(effect), Exit::Success(42));
/// ```
pub struct FromFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FromFn").field("f", &"<function>").finish()
    }
}

impl<F> FromFn<F> {
    /// Create a new FromFn effect.
    pub fn new(f: F) -> Self {
        FromFn { f }
    }
}

impl<F, T, E> Effect for FromFn<F>
where
    F: FnOnce() -> Result<T, E> + Send,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<T, Cause<E>> {
        match panic::catch_unwind(AssertUnwindSafe(self.f)) {
            Ok(result) => result.map_err(Cause::Fail),
            Err(payload) => Err(Cause::Die(Defect::from_panic(payload))),
        }
    }
}
