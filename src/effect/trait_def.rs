//! The `Effect` trait: a description of a computation run by a fiber.
//!
//! An effect is an immutable value. Running it consumes it and produces
//! either its output or a [`Cause`] explaining why it did not succeed:
//! a typed failure, a defect, or an interruption.
//!
//! Combinators return concrete types, so a pipeline of effects is a
//! single nested struct with no heap allocation; use
//! [`boxed`](crate::effect::EffectExt::boxed) when type erasure is needed.

use std::future::Future;

use crate::context::Ctx;
use crate::exit::Cause;

/// A computation that may succeed with `Output`, fail with `Error`, die,
/// or be interrupted.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// fn load_user(id: u64) -> impl Effect<Output = User, Error = DbError> {
///     from_async(move || db::fetch_user(id))
///         .map(|row| User::from(row))
/// }
/// ```
pub trait Effect: Sized + Send {
    /// The success type.
    type Output: Send;

    /// The typed failure type.
    type Error: Send;

    /// Run this effect on the fiber described by `ctx`.
    ///
    /// Implementations await other effects with `ctx`, register resources
    /// in `ctx.scope()`, and wrap any blocking wait in
    /// [`Ctx::suspend`] so interruption is observed there.
    fn run(
        self,
        ctx: &Ctx,
    ) -> impl Future<Output = Result<Self::Output, Cause<Self::Error>>> + Send;
}
