//! Running collections of effects concurrently.
//!
//! - [`run_all`] runs effects fail-fast: the first failure stops admission,
//!   interrupts everything still running, and becomes the result.
//! - [`run_all_settled`] runs every effect to completion and returns one
//!   [`Exit`] per input.
//!
//! Both take a [`Concurrency`] limit. Effects are admitted strictly in
//! input order as running ones finish, never more than the limit at once,
//! and output slot `i` always holds the result of input `i`. Each effect
//! runs on its own child fiber, so its scope is closed (and its resources
//! released) before it counts as finished.
//!
//! There is no implicit unbounded mode: [`Concurrency::Default`] resolves
//! to the runtime's configured `default_concurrency`.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let fetches: Vec<_> = urls.into_iter().map(fetch).collect();
//! let pages = run_all(fetches, Concurrency::Bounded(4));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::context::Ctx;
use crate::effect::combinators::catch_all::retype;
use crate::effect::trait_def::Effect;
use crate::exit::{Cause, Defect, Exit};
use crate::fiber::{self, FiberInner};

/// How many effects of a group may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// At most `n` at a time. `n` must be at least 1.
    Bounded(usize),
    /// Fork everything immediately. Must be asked for explicitly.
    Unbounded,
    /// The runtime's configured default limit.
    #[default]
    Default,
}

impl Concurrency {
    fn resolve<E>(self, ctx: &Ctx) -> Result<usize, Cause<E>> {
        match self {
            Concurrency::Bounded(0) => Err(Cause::Die(Defect::misuse(
                "concurrency limit must be at least 1",
            ))),
            Concurrency::Bounded(n) => Ok(n),
            Concurrency::Unbounded => Ok(usize::MAX),
            Concurrency::Default => Ok(ctx.runtime().default_concurrency()),
        }
    }
}

/// What a group run does when one of its effects fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAllMode {
    /// Stop at the first failure and interrupt the rest.
    FailFast,
    /// Run everything and report each outcome.
    Accumulate,
}

type Slots<A, E> = Vec<Option<Exit<A, E>>>;

/// Shared engine for both modes.
///
/// Returns the per-slot exits, or the cause that stopped the group: the
/// first failure in fail-fast mode, or the interruption of the calling
/// fiber. In both early-exit cases every running child has been
/// interrupted and has finished unwinding before this returns.
async fn drive<Eff>(
    ctx: &Ctx,
    effects: Vec<Eff>,
    concurrency: Concurrency,
    mode: RunAllMode,
) -> Result<Slots<Eff::Output, Eff::Error>, Cause<Eff::Error>>
where
    Eff: Effect + 'static,
    Eff::Output: 'static,
    Eff::Error: 'static,
{
    let limit = concurrency.resolve(ctx)?;
    let total = effects.len();
    tracing::debug!(fiber = %ctx.fiber_id(), total, limit, ?mode, "running group");

    let mut slots: Slots<Eff::Output, Eff::Error> = (0..total).map(|_| None).collect();
    let mut pending = effects.into_iter().enumerate();
    let mut live: BTreeMap<usize, Arc<FiberInner>> = BTreeMap::new();
    let mut running = FuturesUnordered::new();

    loop {
        while running.len() < limit {
            let Some((index, effect)) = pending.next() else {
                break;
            };
            let handle = fiber::spawn(effect, ctx.fiber(), ctx.runtime());
            live.insert(index, handle.inner().clone());
            running.push(async move { (index, handle.wait().await) });
        }

        let next = match ctx.suspend(running.next()).await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(interrupted) => {
                abort(&live, &mut running).await;
                return Err(interrupted);
            }
        };

        let (index, exit) = next;
        live.remove(&index);
        match exit {
            Exit::Failure(cause) if mode == RunAllMode::FailFast => {
                tracing::debug!(
                    fiber = %ctx.fiber_id(),
                    slot = index,
                    not_started = pending.len(),
                    "group failed, interrupting running effects"
                );
                abort(&live, &mut running).await;
                return Err(cause);
            }
            exit => slots[index] = Some(exit),
        }
    }

    Ok(slots)
}

/// Interrupt every live member and wait for all of them, uninterruptibly.
async fn abort<S>(live: &BTreeMap<usize, Arc<FiberInner>>, running: &mut S)
where
    S: futures::Stream + Unpin,
{
    for fiber in live.values() {
        fiber.interrupt();
    }
    while running.next().await.is_some() {}
}

/// Effect returned by [`run_all`].
pub struct RunAll<Eff> {
    effects: Vec<Eff>,
    concurrency: Concurrency,
}

impl<Eff> RunAll<Eff> {
    /// Always [`RunAllMode::FailFast`].
    pub fn mode(&self) -> RunAllMode {
        RunAllMode::FailFast
    }
}

impl<Eff> fmt::Debug for RunAll<Eff> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunAll")
            .field("effects", &self.effects.len())
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode())
            .finish()
    }
}

impl<Eff> Effect for RunAll<Eff>
where
    Eff: Effect + 'static,
    Eff::Output: 'static,
    Eff::Error: 'static,
{
    type Output = Vec<Eff::Output>;
    type Error = Eff::Error;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<Eff::Error>> {
        let slots = drive(ctx, self.effects, self.concurrency, RunAllMode::FailFast).await?;
        slots.into_iter().flatten().map(Exit::into_result).collect()
    }
}

/// Effect returned by [`run_all_settled`].
pub struct RunAllSettled<Eff, E2> {
    effects: Vec<Eff>,
    concurrency: Concurrency,
    _marker: PhantomData<E2>,
}

impl<Eff, E2> RunAllSettled<Eff, E2> {
    /// Always [`RunAllMode::Accumulate`].
    pub fn mode(&self) -> RunAllMode {
        RunAllMode::Accumulate
    }
}

impl<Eff, E2> fmt::Debug for RunAllSettled<Eff, E2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunAllSettled")
            .field("effects", &self.effects.len())
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode())
            .finish()
    }
}

impl<Eff, E2> Effect for RunAllSettled<Eff, E2>
where
    Eff: Effect + 'static,
    Eff::Output: 'static,
    Eff::Error: 'static,
    E2: Send,
{
    type Output = Vec<Exit<Eff::Output, Eff::Error>>;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<E2>> {
        match drive(ctx, self.effects, self.concurrency, RunAllMode::Accumulate).await {
            Ok(slots) => Ok(slots.into_iter().flatten().collect()),
            // Accumulate mode only stops early for a bad limit or when the
            // caller itself is interrupted; neither carries a typed failure.
            Err(cause) => Err(retype(cause)),
        }
    }
}

/// Run effects concurrently, fail-fast, preserving input order.
///
/// Succeeds with every output in input order, or fails with the cause of
/// the first effect to fail. After a failure no further effects are
/// started, and those still running are interrupted and fully unwound
/// before the failure is returned.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::prelude::*;
///
/// let effects: Vec<BoxedEffect<i32, String>> = vec![
///     succeed(1).boxed(),
///     sleep(Duration::from_millis(10)).map(|_| 2).boxed(),
///     succeed(3).boxed(),
/// ];
/// let exit = runtime.run(run_all(effects, Concurrency::Bounded(2)));
/// assert_eq!(exit, Exit::Success(vec![1, 2, 3]));
/// ```
pub fn run_all<I, Eff>(effects: I, concurrency: Concurrency) -> RunAll<Eff>
where
    I: IntoIterator<Item = Eff>,
    Eff: Effect + 'static,
{
    RunAll {
        effects: effects.into_iter().collect(),
        concurrency,
    }
}

/// Run effects concurrently to completion, preserving input order.
///
/// Never fails because of an individual effect; the outcome of each is
/// reported in its slot.
pub fn run_all_settled<I, Eff, E2>(effects: I, concurrency: Concurrency) -> RunAllSettled<Eff, E2>
where
    I: IntoIterator<Item = Eff>,
    Eff: Effect + 'static,
{
    RunAllSettled {
        effects: effects.into_iter().collect(),
        concurrency,
        _marker: PhantomData,
    }
}
