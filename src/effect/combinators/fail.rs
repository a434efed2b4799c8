//! Fail and Die - effects that end without a value.

use std::marker::PhantomData;

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Defect};

/// An effect that fails with a typed error.
#[derive(Debug, Clone)]
pub struct Fail<T, E> {
    error: E,
    _phantom: PhantomData<T>,
}

impl<T, E> Fail<T, E> {
    /// Create a new Fail effect from an error.
    pub fn new(error: E) -> Self {
        Fail {
            error,
            _phantom: PhantomData,
        }
    }
}

impl<T: Send, E: Send> Effect for Fail<T, E> {
    type Output = T;
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<T, Cause<E>> {
        Err(Cause::Fail(self.error))
    }
}

/// An effect that dies with a defect. Defects bypass typed recovery.
#[derive(Debug, Clone)]
pub struct Die<T, E> {
    defect: Defect,
    _phantom: PhantomData<(T, E)>,
}

impl<T, E> Die<T, E> {
    /// Create a new Die effect.
    pub fn new(defect: Defect) -> Self {
        Die {
            defect,
            _phantom: PhantomData,
        }
    }
}

impl<T: Send, E: Send> Effect for Die<T, E> {
    type Output = T;
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<T, Cause<E>> {
        Err(Cause::Die(self.defect))
    }
}
