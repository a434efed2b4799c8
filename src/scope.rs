//! Scopes: ordered registries of cleanup actions.
//!
//! A [`Scope`] owns a stack of finalizers. Closing the scope runs them
//! newest-first, whatever the outcome of the computation that used the
//! scope. A failing or panicking finalizer does not stop the others; every
//! failure is collected into [`FinalizerErrors`] and can be folded into the
//! scoped computation's [`Cause`] with [`Scope::close_with`].
//!
//! # Child scopes
//!
//! [`Scope::fork`] opens a child scope registered in its parent at the
//! current top of the parent's stack. A child may close on its own, before
//! its parent; it then unregisters itself. A child that is still open when
//! the parent closes is closed by the parent, in LIFO position, with the
//! parent's exit, and its finalizer failures are reported by the parent.
//!
//! # Example
//!
//! ```rust
//! use millrace::scope::{Scope, ScopeExit};
//! use std::sync::{Arc, Mutex};
//!
//! # tokio_test::block_on(async {
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let scope = Scope::new();
//!
//! for name in ["a", "b", "c"] {
//!     let log = log.clone();
//!     scope
//!         .add_finalizer(move |_| async move {
//!             log.lock().unwrap().push(name);
//!             Ok::<_, std::io::Error>(())
//!         })
//!         .unwrap();
//! }
//!
//! scope.close(ScopeExit::Success).await.unwrap();
//! assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::FutureExt;
use tokio::sync::watch;

use crate::effect::BoxFuture;
use crate::exit::{BoxError, Cause, Defect};
use crate::util::lock;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// How the computation owning a scope ended. Passed to every finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeExit {
    /// The scoped computation produced a value.
    Success,
    /// The scoped computation failed or died.
    Failure,
    /// The scoped computation was interrupted.
    Interrupted,
}

impl ScopeExit {
    /// Classify a computation's result.
    pub fn of<A, E>(result: &Result<A, Cause<E>>) -> Self {
        match result {
            Ok(_) => ScopeExit::Success,
            Err(cause) if cause.is_interrupted() => ScopeExit::Interrupted,
            Err(_) => ScopeExit::Failure,
        }
    }
}

/// A cleanup action. It receives the scope's exit and may fail.
pub type Finalizer = Box<dyn FnOnce(ScopeExit) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Key of a registered finalizer, usable with [`Scope::remove_finalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalizerKey(u64);

// ============================================================================
// Errors
// ============================================================================

/// Error returned when registering against a closed scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// The scope has already been closed.
    Closed,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Closed => write!(f, "scope is already closed"),
        }
    }
}

impl std::error::Error for ScopeError {}

/// Every finalizer failure from one close, in the order they ran.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizerErrors(Vec<Defect>);

impl FinalizerErrors {
    /// The individual failures.
    pub fn defects(&self) -> &[Defect] {
        &self.0
    }

    /// Number of failed finalizers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a value returned by `close`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold the failures into a cause, oldest first. The chain is kept
    /// balanced so its depth grows with the log of the failure count.
    pub fn into_cause<E>(self) -> Cause<E> {
        Cause::sequence(self.0.into_iter().map(Cause::Die).collect())
            .unwrap_or_else(|| Cause::Die(Defect::misuse("empty finalizer error set")))
    }
}

impl fmt::Display for FinalizerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} finalizer(s) failed", self.0.len())?;
        for defect in &self.0 {
            write!(f, "; {}", defect)?;
        }
        Ok(())
    }
}

impl std::error::Error for FinalizerErrors {}

// ============================================================================
// Scope
// ============================================================================

enum Entry {
    Finalizer(Finalizer),
    Child(Arc<ScopeInner>),
}

enum ScopeState {
    Open {
        entries: Vec<(FinalizerKey, Entry)>,
        next_key: u64,
    },
    Closing,
    Closed,
}

struct ScopeInner {
    id: u64,
    state: Mutex<ScopeState>,
    closed: watch::Sender<bool>,
    parent: Mutex<Option<(Weak<ScopeInner>, FinalizerKey)>>,
}

/// An ordered registry of finalizers with LIFO release on close.
///
/// `Scope` is a cheap handle; clones refer to the same registry.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("finalizers", &self.len())
            .finish()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Open an empty root scope.
    pub fn new() -> Self {
        Scope {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(ScopeState::Open {
                    entries: Vec::new(),
                    next_key: 0,
                }),
                closed: watch::channel(false).0,
                parent: Mutex::new(None),
            }),
        }
    }

    /// Open a child scope. See the module docs for how children close.
    pub fn fork(&self) -> Result<Scope, ScopeError> {
        let child = Scope::new();
        let key = self
            .push(child.inner.clone(), Entry::Child)
            .map_err(|_| ScopeError::Closed)?;
        *lock(&child.inner.parent) = Some((Arc::downgrade(&self.inner), key));
        Ok(child)
    }

    /// True once `close` has started.
    pub fn is_closed(&self) -> bool {
        !matches!(*lock(&self.inner.state), ScopeState::Open { .. })
    }

    /// Number of registered entries (finalizers and open children).
    pub fn len(&self) -> usize {
        match &*lock(&self.inner.state) {
            ScopeState::Open { entries, .. } => entries.len(),
            ScopeState::Closing | ScopeState::Closed => 0,
        }
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a cleanup action.
    ///
    /// Fails with [`ScopeError::Closed`] once the scope has closed.
    pub fn add_finalizer<F, Fut, Err>(&self, finalizer: F) -> Result<FinalizerKey, ScopeError>
    where
        F: FnOnce(ScopeExit) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Err>> + Send + 'static,
        Err: Into<BoxError> + 'static,
    {
        self.register(boxed_finalizer(finalizer))
            .map_err(|_| ScopeError::Closed)
    }

    /// Register an already boxed finalizer, handing it back if the scope is
    /// closed so the caller can still run it.
    pub(crate) fn register(&self, finalizer: Finalizer) -> Result<FinalizerKey, Finalizer> {
        self.push(finalizer, Entry::Finalizer)
    }

    /// Unregister a finalizer without running it. Returns false when the key
    /// is unknown or the scope is closed.
    pub fn remove_finalizer(&self, key: FinalizerKey) -> bool {
        match &mut *lock(&self.inner.state) {
            ScopeState::Open { entries, .. } => {
                let before = entries.len();
                entries.retain(|(k, _)| *k != key);
                entries.len() != before
            }
            ScopeState::Closing | ScopeState::Closed => false,
        }
    }

    fn push<T>(&self, item: T, entry: impl FnOnce(T) -> Entry) -> Result<FinalizerKey, T> {
        match &mut *lock(&self.inner.state) {
            ScopeState::Open { entries, next_key } => {
                let key = FinalizerKey(*next_key);
                *next_key += 1;
                entries.push((key, entry(item)));
                Ok(key)
            }
            ScopeState::Closing | ScopeState::Closed => Err(item),
        }
    }

    /// Close the scope, running every finalizer newest-first.
    ///
    /// All finalizers run even if some fail. Closing a scope that another
    /// caller is already closing waits for that close to finish and then
    /// reports no failures, as does closing an already closed scope.
    pub async fn close(&self, exit: ScopeExit) -> Result<(), FinalizerErrors> {
        let failures = close_inner(self.inner.clone(), exit).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FinalizerErrors(failures))
        }
    }

    /// Close the scope with the outcome of the computation that used it and
    /// attach any finalizer failures to that outcome.
    ///
    /// A success turns into a failure carrying the finalizer defects; a
    /// failure keeps its primary cause with the defects appended.
    pub async fn close_with<A, E>(&self, result: Result<A, Cause<E>>) -> Result<A, Cause<E>> {
        match self.close(ScopeExit::of(&result)).await {
            Ok(()) => result,
            Err(errors) => match result {
                Ok(_) => Err(errors.into_cause()),
                Err(cause) => Err(cause.then(errors.into_cause())),
            },
        }
    }
}

pub(crate) fn boxed_finalizer<F, Fut, Err>(finalizer: F) -> Finalizer
where
    F: FnOnce(ScopeExit) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    Box::new(move |exit| Box::pin(async move { finalizer(exit).await.map_err(Into::into) }))
}

/// Run one finalizer, turning an error or a panic into a defect.
pub(crate) async fn run_finalizer(finalizer: Finalizer, exit: ScopeExit) -> Result<(), Defect> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| finalizer(exit))) {
        Ok(fut) => fut,
        Err(payload) => return Err(Defect::finalizer_panic(payload)),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(Defect::finalizer(error)),
        Err(payload) => Err(Defect::finalizer_panic(payload)),
    }
}

fn close_inner(inner: Arc<ScopeInner>, exit: ScopeExit) -> BoxFuture<'static, Vec<Defect>> {
    Box::pin(async move {
        let entries = {
            let mut state = lock(&inner.state);
            match &mut *state {
                ScopeState::Open { entries, .. } => {
                    let entries = std::mem::take(entries);
                    *state = ScopeState::Closing;
                    Some(entries)
                }
                ScopeState::Closing | ScopeState::Closed => None,
            }
        };
        let Some(entries) = entries else {
            let mut closed = inner.closed.subscribe();
            // The sender lives in `inner`, so this cannot fail.
            let _ = closed.wait_for(|done| *done).await;
            return Vec::new();
        };
        let _finished = MarkClosed(inner.clone());

        tracing::debug!(scope = inner.id, count = entries.len(), ?exit, "closing scope");

        let mut failures = Vec::new();
        for (_, entry) in entries.into_iter().rev() {
            match entry {
                Entry::Finalizer(finalizer) => {
                    if let Err(defect) = run_finalizer(finalizer, exit).await {
                        tracing::warn!(scope = inner.id, %defect, "finalizer failed");
                        failures.push(defect);
                    }
                }
                Entry::Child(child) => failures.extend(close_inner(child, exit).await),
            }
        }

        // Stay registered in the parent until every finalizer has run, so a
        // parent closing concurrently waits for us in LIFO position. If the
        // parent is the one closing us this is a no-op.
        let parent = lock(&inner.parent).take();
        if let Some((parent, key)) = parent {
            if let Some(parent) = parent.upgrade() {
                Scope { inner: parent }.remove_finalizer(key);
            }
        }
        failures
    })
}

/// Marks a closing scope closed and wakes waiting closers, also when the
/// close itself is dropped half way.
struct MarkClosed(Arc<ScopeInner>);

impl Drop for MarkClosed {
    fn drop(&mut self) {
        *lock(&self.0.state) = ScopeState::Closed;
        self.0.closed.send_replace(true);
    }
}
