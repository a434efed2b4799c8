//! Fibers: cancellable, independently scheduled units of execution.
//!
//! A fiber runs one effect to completion on the runtime's worker pool and
//! records its [`Exit`]. Fibers form a tree: every fiber holds strong
//! references to its live children and a weak reference back to its
//! parent. When a fiber's effect ends, for any reason, it
//!
//! 1. interrupts every live child and waits for them (depth-first),
//! 2. closes its own scope, running finalizers newest-first,
//! 3. stores its exit and wakes anyone joining it.
//!
//! Interruption is cooperative: it is observed at the next suspension
//! point (`join`, semaphore acquire, deferred wait, sleep, wrapped
//! futures), never in the middle of a synchronous step.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let program = fork(sleep::<String>(Duration::from_secs(60)))
//!     .and_then(|fiber| fiber.interrupt())
//!     .map(|exit| exit.is_interrupted());
//!
//! assert_eq!(runtime.run(program), Exit::Success(true));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;

use crate::context::Ctx;
use crate::effect::Effect;
use crate::exit::{Cause, Defect, Exit};
use crate::runtime::RuntimeShared;
use crate::scope::Scope;
use crate::util::lock;

static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a fiber, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    /// Wrap a raw id. Ids handed out by the runtime are never reused.
    pub const fn new(raw: u64) -> Self {
        FiberId(raw)
    }

    /// The raw numeric id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    fn next() -> Self {
        FiberId(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a fiber. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberStatus {
    /// Not finished yet (possibly blocked, possibly not started).
    Running,
    /// Completed with a value.
    Succeeded,
    /// Completed with a typed failure or a defect.
    Failed,
    /// Stopped by interruption.
    Interrupted,
}

impl FiberStatus {
    /// True for every state except `Running`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, FiberStatus::Running)
    }

    fn of<A, E>(exit: &Exit<A, E>) -> Self {
        match exit {
            Exit::Success(_) => FiberStatus::Succeeded,
            Exit::Failure(cause) if cause.is_interrupted() => FiberStatus::Interrupted,
            Exit::Failure(_) => FiberStatus::Failed,
        }
    }
}

// ============================================================================
// FiberInner - the untyped node in the fiber tree
// ============================================================================

pub(crate) struct FiberInner {
    id: FiberId,
    parent: Option<Weak<FiberInner>>,
    interrupt: watch::Sender<bool>,
    done: watch::Sender<bool>,
    status: Mutex<FiberStatus>,
    children: Mutex<BTreeMap<FiberId, Arc<FiberInner>>>,
}

impl fmt::Debug for FiberInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberInner")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl FiberInner {
    fn new(parent: Option<Weak<FiberInner>>) -> Self {
        let (interrupt, _) = watch::channel(false);
        let (done, _) = watch::channel(false);
        FiberInner {
            id: FiberId::next(),
            parent,
            interrupt,
            done,
            status: Mutex::new(FiberStatus::Running),
            children: Mutex::new(BTreeMap::new()),
        }
    }

    /// The runtime's root fiber. It never runs an effect; it only owns the
    /// fibers forked from outside any effect and daemon fibers.
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(FiberInner::new(None))
    }

    pub(crate) fn new_child(parent: &Arc<FiberInner>) -> Arc<Self> {
        let child = Arc::new(FiberInner::new(Some(Arc::downgrade(parent))));
        lock(&parent.children).insert(child.id, child.clone());
        child
    }

    pub(crate) fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) fn status(&self) -> FiberStatus {
        *lock(&self.status)
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    pub(crate) fn is_interrupt_requested(&self) -> bool {
        *self.interrupt.borrow()
    }

    /// Request interruption. Idempotent.
    pub(crate) fn interrupt(&self) {
        if !self.interrupt.send_replace(true) && !self.is_done() {
            tracing::debug!(fiber = %self.id, "interrupt requested");
        }
    }

    /// Resolves once interruption has been requested.
    pub(crate) async fn interrupted(&self) {
        let mut rx = self.interrupt.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Resolves once the fiber is terminal.
    pub(crate) async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub(crate) fn live_children(&self) -> usize {
        lock(&self.children).len()
    }

    pub(crate) fn children_snapshot(&self) -> Vec<Arc<FiberInner>> {
        lock(&self.children).values().cloned().collect()
    }

    /// Interrupt every live child and wait until all of them are terminal.
    /// Each child does the same for its own children before finishing, so
    /// the whole subtree is unwound depth-first. Children forked while the
    /// earlier ones unwind (from an uninterruptible region, say) are picked
    /// up by the next round.
    pub(crate) async fn interrupt_children(&self) {
        loop {
            let children = self.children_snapshot();
            if children.is_empty() {
                return;
            }
            tracing::debug!(fiber = %self.id, count = children.len(), "interrupting children");
            for child in &children {
                child.interrupt();
            }
            futures::future::join_all(children.iter().map(|child| child.wait_done())).await;
        }
    }

    fn finish(&self, status: FiberStatus) {
        *lock(&self.status) = status;
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            lock(&parent.children).remove(&self.id);
        }
        self.done.send_replace(true);
        tracing::debug!(fiber = %self.id, ?status, "fiber finished");
    }
}

// ============================================================================
// Typed result cell and handle
// ============================================================================

struct FiberCell<A, E> {
    inner: Arc<FiberInner>,
    exit: Mutex<Option<Exit<A, E>>>,
}

impl<A, E> FiberCell<A, E> {
    fn complete(&self, exit: Exit<A, E>) {
        let status = FiberStatus::of(&exit);
        *lock(&self.exit) = Some(exit);
        self.inner.finish(status);
    }

    async fn wait(&self) -> Exit<A, E> {
        self.inner.wait_done().await;
        lock(&self.exit)
            .take()
            .unwrap_or_else(|| Exit::Failure(Cause::Die(Defect::misuse("fiber exit already taken"))))
    }
}

/// Handle to a forked fiber.
///
/// The handle is the only way to obtain the fiber's result, so it is not
/// `Clone`: [`join`](Self::join), [`await_exit`](Self::await_exit),
/// [`interrupt`](Self::interrupt) and [`join_timeout`](Self::join_timeout)
/// consume it. Dropping a handle does not detach the fiber; it stays a
/// child of the fiber that forked it and is interrupted when that fiber
/// finishes.
pub struct FiberHandle<A, E> {
    cell: Arc<FiberCell<A, E>>,
}

impl<A, E> fmt::Debug for FiberHandle<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberHandle")
            .field("id", &self.cell.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<A, E> FiberHandle<A, E> {
    /// The fiber's id.
    pub fn id(&self) -> FiberId {
        self.cell.inner.id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> FiberStatus {
        self.cell.inner.status()
    }

    /// True once the fiber is terminal.
    pub fn is_done(&self) -> bool {
        self.cell.inner.is_done()
    }

    /// Request interruption without waiting for it to take effect.
    pub fn request_interrupt(&self) {
        self.cell.inner.interrupt();
    }

    /// Wait for the fiber from outside any effect.
    pub async fn wait(self) -> Exit<A, E> {
        self.cell.wait().await
    }

    /// Effect that waits for the fiber and continues with its result: a
    /// failure or interruption of the fiber becomes a failure of the joiner.
    pub fn join(self) -> Join<A, E> {
        Join { handle: self }
    }

    /// Effect that waits for the fiber and yields its [`Exit`] as a value.
    pub fn await_exit<E2>(self) -> AwaitExit<A, E, E2> {
        AwaitExit {
            handle: self,
            _marker: PhantomData,
        }
    }

    /// Effect that interrupts the fiber, waits until it has fully unwound,
    /// and yields its final [`Exit`].
    pub fn interrupt<E2>(self) -> InterruptFiber<A, E, E2> {
        InterruptFiber {
            handle: self,
            _marker: PhantomData,
        }
    }

    /// Effect that waits at most `timeout` for the fiber. If it has not
    /// finished by then it is interrupted; either way its final [`Exit`] is
    /// yielded.
    pub fn join_timeout<E2>(self, timeout: Duration) -> JoinTimeout<A, E, E2> {
        JoinTimeout {
            handle: self,
            timeout,
            _marker: PhantomData,
        }
    }

    pub(crate) fn inner(&self) -> &Arc<FiberInner> {
        &self.cell.inner
    }
}

// ============================================================================
// Spawning
// ============================================================================

/// Start `effect` on a new fiber parented to `parent`.
pub(crate) fn spawn<Eff>(
    effect: Eff,
    parent: &Arc<FiberInner>,
    runtime: &Arc<RuntimeShared>,
) -> FiberHandle<Eff::Output, Eff::Error>
where
    Eff: Effect + 'static,
    Eff::Output: 'static,
    Eff::Error: 'static,
{
    let inner = FiberInner::new_child(parent);
    let cell = Arc::new(FiberCell {
        inner: inner.clone(),
        exit: Mutex::new(None),
    });
    tracing::debug!(fiber = %inner.id, parent = %parent.id, "fiber forked");

    let ctx = Ctx::new(inner, Scope::new(), runtime.clone());
    let task_cell = cell.clone();
    runtime.handle().spawn(async move {
        let exit = run_fiber(effect, ctx).await;
        task_cell.complete(exit);
    });

    FiberHandle { cell }
}

async fn run_fiber<Eff: Effect>(effect: Eff, ctx: Ctx) -> Exit<Eff::Output, Eff::Error> {
    let fiber = ctx.fiber().clone();
    let result = if fiber.is_interrupt_requested() {
        tracing::debug!(fiber = %fiber.id(), "interrupted before start");
        Err(Cause::Interrupt(fiber.id()))
    } else {
        match AssertUnwindSafe(effect.run(&ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let defect = Defect::from_panic(payload);
                tracing::warn!(fiber = %fiber.id(), %defect, "fiber panicked");
                Err(Cause::Die(defect))
            }
        }
    };

    fiber.interrupt_children().await;
    ctx.scope().close_with(result).await.into()
}

// ============================================================================
// Effects
// ============================================================================

/// Effect that starts a child fiber. See [`fork`](crate::effect::fork).
pub struct Fork<Eff, E> {
    effect: Eff,
    daemon: bool,
    _marker: PhantomData<E>,
}

impl<Eff, E> Fork<Eff, E> {
    pub(crate) fn new(effect: Eff, daemon: bool) -> Self {
        Fork {
            effect,
            daemon,
            _marker: PhantomData,
        }
    }
}

impl<Eff, E> fmt::Debug for Fork<Eff, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fork")
            .field("effect", &"<effect>")
            .field("daemon", &self.daemon)
            .finish()
    }
}

impl<Eff, E> Effect for Fork<Eff, E>
where
    Eff: Effect + 'static,
    Eff::Output: 'static,
    Eff::Error: 'static,
    E: Send,
{
    type Output = FiberHandle<Eff::Output, Eff::Error>;
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<Self::Output, Cause<E>> {
        let parent = if self.daemon {
            ctx.runtime().root().clone()
        } else {
            ctx.fiber().clone()
        };
        Ok(spawn(self.effect, &parent, ctx.runtime()))
    }
}

/// Effect returned by [`FiberHandle::join`].
#[derive(Debug)]
pub struct Join<A, E> {
    handle: FiberHandle<A, E>,
}

impl<A, E> Effect for Join<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    type Output = A;
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<A, Cause<E>> {
        let cell = self.handle.cell;
        ctx.suspend(cell.inner.wait_done()).await?;
        cell.wait().await.into_result()
    }
}

/// Effect returned by [`FiberHandle::await_exit`].
#[derive(Debug)]
pub struct AwaitExit<A, E, E2> {
    handle: FiberHandle<A, E>,
    _marker: PhantomData<E2>,
}

impl<A, E, E2> Effect for AwaitExit<A, E, E2>
where
    A: Send + 'static,
    E: Send + 'static,
    E2: Send,
{
    type Output = Exit<A, E>;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<Exit<A, E>, Cause<E2>> {
        let cell = self.handle.cell;
        ctx.suspend(cell.inner.wait_done()).await?;
        Ok(cell.wait().await)
    }
}

/// Effect returned by [`FiberHandle::interrupt`].
#[derive(Debug)]
pub struct InterruptFiber<A, E, E2> {
    handle: FiberHandle<A, E>,
    _marker: PhantomData<E2>,
}

impl<A, E, E2> Effect for InterruptFiber<A, E, E2>
where
    A: Send + 'static,
    E: Send + 'static,
    E2: Send,
{
    type Output = Exit<A, E>;
    type Error = E2;

    async fn run(self, _ctx: &Ctx) -> Result<Exit<A, E>, Cause<E2>> {
        let cell = self.handle.cell;
        cell.inner.interrupt();
        // Waiting for the target to unwind is not itself interruptible:
        // the caller must not observe the target half torn down.
        Ok(cell.wait().await)
    }
}

/// Effect returned by [`FiberHandle::join_timeout`].
#[derive(Debug)]
pub struct JoinTimeout<A, E, E2> {
    handle: FiberHandle<A, E>,
    timeout: Duration,
    _marker: PhantomData<E2>,
}

impl<A, E, E2> Effect for JoinTimeout<A, E, E2>
where
    A: Send + 'static,
    E: Send + 'static,
    E2: Send,
{
    type Output = Exit<A, E>;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<Exit<A, E>, Cause<E2>> {
        let cell = self.handle.cell;
        let finished = ctx
            .suspend(tokio::time::timeout(self.timeout, cell.inner.wait_done()))
            .await?;
        if finished.is_err() {
            tracing::debug!(fiber = %cell.inner.id(), timeout = ?self.timeout, "join timed out, interrupting");
            cell.inner.interrupt();
        }
        Ok(cell.wait().await)
    }
}
