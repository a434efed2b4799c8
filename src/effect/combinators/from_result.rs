//! FromResult - lift a `Result` into an effect.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// An effect that yields an already computed `Result`.
#[derive(Debug, Clone)]
pub struct FromResult<T, E> {
    result: Result<T, E>,
}

impl<T, E> FromResult<T, E> {
    /// Create a new FromResult effect.
    pub fn new(result: Result<T, E>) -> Self {
        FromResult { result }
    }
}

impl<T: Send, E: Send> Effect for FromResult<T, E> {
    type Output = T;
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<T, Cause<E>> {
        self.result.map_err(Cause::Fail)
    }
}
