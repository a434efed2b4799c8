//! Succeed - wraps a value as an effect with no side effects.

use std::marker::PhantomData;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// A pure value wrapped as an effect.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effect = succeed::<_, String>(42);
/// assert_eq!(runtime.run(effect), Exit::Success(42));
/// ```
#[derive(Debug, Clone)]
pub struct Succeed<T, E> {
    value: T,
    _phantom: PhantomData<E>,
}

impl<T, E> Succeed<T, E> {
    /// Create a new Succeed effect from a value.
    pub fn new(value: T) -> Self {
        Succeed {
            value,
            _phantom: PhantomData,
        }
    }
}

impl<T: Send, E: Send> Effect for Succeed<T, E> {
    type Output = T;
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<T, Cause<E>> {
        Ok(self.value)
    }
}
