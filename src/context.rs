//! The execution context handed to every running effect.
//!
//! A [`Ctx`] ties a running effect to the fiber executing it, the scope its
//! resources are registered in, and the runtime that schedules it. Effects
//! never build a `Ctx` themselves; the runtime creates one per fiber and
//! combinators derive narrower ones (a child scope for `scoped`, a masked
//! one for `uninterruptible`).

use std::future::Future;
use std::sync::Arc;

use crate::exit::Cause;
use crate::fiber::{FiberId, FiberInner};
use crate::runtime::RuntimeShared;
use crate::scope::Scope;

/// Per-fiber execution context.
#[derive(Clone)]
pub struct Ctx {
    fiber: Arc<FiberInner>,
    scope: Scope,
    runtime: Arc<RuntimeShared>,
    interruptible: bool,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("fiber", &self.fiber.id())
            .field("scope", &self.scope)
            .field("interruptible", &self.interruptible)
            .finish()
    }
}

impl Ctx {
    pub(crate) fn new(fiber: Arc<FiberInner>, scope: Scope, runtime: Arc<RuntimeShared>) -> Self {
        Ctx {
            fiber,
            scope,
            runtime,
            interruptible: true,
        }
    }

    /// Id of the fiber running this effect.
    pub fn fiber_id(&self) -> FiberId {
        self.fiber.id()
    }

    /// The scope new finalizers are registered in.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// True once an interruption has been requested for this fiber, even
    /// if it has not been observed yet.
    pub fn is_interrupt_requested(&self) -> bool {
        self.fiber.is_interrupt_requested()
    }

    /// False inside an `uninterruptible` region.
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    /// Await `fut` as a suspension point of this fiber.
    ///
    /// If the fiber is (or becomes) interrupted while interruptible, `fut`
    /// is dropped and the interruption is returned as the cause. Inside an
    /// uninterruptible region `fut` always runs to completion.
    pub async fn suspend<F, E>(&self, fut: F) -> Result<F::Output, Cause<E>>
    where
        F: Future,
    {
        if !self.interruptible {
            return Ok(fut.await);
        }
        tokio::select! {
            biased;
            _ = self.fiber.interrupted() => Err(Cause::Interrupt(self.fiber.id())),
            out = fut => Ok(out),
        }
    }

    /// Observe a pending interruption without suspending.
    pub fn checkpoint<E>(&self) -> Result<(), Cause<E>> {
        if self.interruptible && self.fiber.is_interrupt_requested() {
            Err(Cause::Interrupt(self.fiber.id()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn fiber(&self) -> &Arc<FiberInner> {
        &self.fiber
    }

    pub(crate) fn runtime(&self) -> &Arc<RuntimeShared> {
        &self.runtime
    }

    pub(crate) fn with_scope(&self, scope: Scope) -> Ctx {
        Ctx {
            scope,
            ..self.clone()
        }
    }

    pub(crate) fn masked(&self) -> Ctx {
        Ctx {
            interruptible: false,
            ..self.clone()
        }
    }
}
