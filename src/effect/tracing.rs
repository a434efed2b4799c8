//! Tracing support for effects.
//!
//! This module provides the `Instrument` combinator and `instrument` method
//! for wrapping effects in tracing spans.

use crate::context::Ctx;
use crate::effect::trait_def::Effect;
use crate::exit::Cause;

/// An effect wrapped in a tracing span.
///
/// Created by [`EffectTracingExt::instrument`].
#[derive(Debug)]
pub struct Instrument<E> {
    pub(crate) inner: E,
    pub(crate) span: tracing::Span,
}

impl<E> Effect for Instrument<E>
where
    E: Effect,
{
    type Output = E::Output;
    type Error = E::Error;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<Self::Error>> {
        use tracing::Instrument as _;
        self.inner.run(ctx).instrument(self.span).await
    }
}

/// Extension trait for adding tracing instrumentation to effects.
pub trait EffectTracingExt: Effect {
    /// Wrap this effect in a tracing span.
    ///
    /// The span is entered whenever the effect is polled. Fibers forked
    /// inside it start outside the span; instrument the forked effect to
    /// carry one over.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use millrace::prelude::*;
    /// use tracing::debug_span;
    ///
    /// fn fetch_order(order_id: String) -> impl Effect<Output = Order, Error = String> {
    ///     let span = debug_span!("fetch_order", order_id = %order_id);
    ///     from_async(move || load(order_id)).instrument(span)
    /// }
    /// ```
    fn instrument(self, span: tracing::Span) -> Instrument<Self> {
        Instrument { inner: self, span }
    }
}

impl<E: Effect> EffectTracingExt for E {}
