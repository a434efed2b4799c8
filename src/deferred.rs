//! Single-write, broadcast-read synchronization cell.
//!
//! A [`Deferred`] starts empty and is completed at most once with an
//! [`Exit`]. The first writer wins: later writes are no-ops that report
//! `false`, and readers never see the value change. Every reader, whether
//! it started waiting before or after the write, observes an identical
//! clone of the written exit.
//!
//! It is meant for one-shot handshakes between fibers, not as a channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let ready = Deferred::<u32, String>::new();
//! let program = fork(ready.wait())
//!     .and_then(move |waiter| ready.succeed(42).and_then(move |_| waiter.join()));
//!
//! assert_eq!(runtime.run(program), Exit::Success(42));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

use crate::context::Ctx;
use crate::effect::Effect;
use crate::exit::{Cause, Exit};

struct Inner<A, E> {
    value: OnceLock<Exit<A, E>>,
    notify: Notify,
}

/// A cell written at most once and readable by any number of fibers.
///
/// Clones refer to the same cell.
pub struct Deferred<A, E> {
    inner: Arc<Inner<A, E>>,
}

impl<A, E> Clone for Deferred<A, E> {
    fn clone(&self) -> Self {
        Deferred {
            inner: self.inner.clone(),
        }
    }
}

impl<A, E> Default for Deferred<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> fmt::Debug for Deferred<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<A, E> Deferred<A, E> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Deferred {
            inner: Arc::new(Inner {
                value: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// True once a value has been written.
    pub fn is_done(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// Write `exit` if the cell is still empty. Returns whether this call
    /// performed the write.
    pub fn complete_now(&self, exit: Exit<A, E>) -> bool {
        let written = self.inner.value.set(exit).is_ok();
        if written {
            self.inner.notify.notify_waiters();
        }
        written
    }

    /// Effect that writes `exit`. Yields `true` if it performed the write
    /// and `false` if the cell was already complete.
    pub fn complete<E2>(&self, exit: Exit<A, E>) -> Complete<A, E, E2> {
        Complete {
            deferred: self.clone(),
            exit,
            _marker: PhantomData,
        }
    }

    /// `complete(Exit::Success(value))`.
    pub fn succeed<E2>(&self, value: A) -> Complete<A, E, E2> {
        self.complete(Exit::Success(value))
    }

    /// `complete(Exit::Failure(Cause::Fail(error)))`.
    pub fn fail<E2>(&self, error: E) -> Complete<A, E, E2> {
        self.complete(Exit::Failure(Cause::Fail(error)))
    }

    async fn written(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a write in between is not missed.
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

impl<A: Clone, E: Clone> Deferred<A, E> {
    /// The written exit, without waiting.
    pub fn poll(&self) -> Option<Exit<A, E>> {
        self.inner.value.get().cloned()
    }

    /// Wait for the write from outside any effect.
    pub async fn wait_exit(&self) -> Exit<A, E> {
        loop {
            if let Some(exit) = self.poll() {
                return exit;
            }
            self.written().await;
        }
    }

    /// Effect that waits for the write and continues with it: a written
    /// failure becomes this effect's failure.
    pub fn wait(&self) -> Await<A, E> {
        Await {
            deferred: self.clone(),
        }
    }
}

/// Effect returned by [`Deferred::complete`], [`Deferred::succeed`] and
/// [`Deferred::fail`].
pub struct Complete<A, E, E2> {
    deferred: Deferred<A, E>,
    exit: Exit<A, E>,
    _marker: PhantomData<E2>,
}

impl<A, E, E2> fmt::Debug for Complete<A, E, E2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Complete")
            .field("deferred", &self.deferred)
            .field("exit", &"<exit>")
            .finish()
    }
}

impl<A, E, E2> Effect for Complete<A, E, E2>
where
    A: Send + Sync,
    E: Send + Sync,
    E2: Send,
{
    type Output = bool;
    type Error = E2;

    async fn run(self, ctx: &Ctx) -> Result<bool, Cause<E2>> {
        let written = self.deferred.complete_now(self.exit);
        if !written {
            tracing::debug!(fiber = %ctx.fiber_id(), "deferred already complete, write ignored");
        }
        Ok(written)
    }
}

/// Effect returned by [`Deferred::wait`].
#[derive(Debug)]
pub struct Await<A, E> {
    deferred: Deferred<A, E>,
}

impl<A, E> Effect for Await<A, E>
where
    A: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    type Output = A;
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<A, Cause<E>> {
        ctx.suspend(self.deferred.written()).await?;
        self.deferred.wait_exit().await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let cell = Deferred::<i32, String>::new();
        assert!(!cell.is_done());
        assert_eq!(cell.poll(), None);

        assert!(cell.complete_now(Exit::Success(1)));
        assert!(!cell.complete_now(Exit::Success(2)));
        assert!(!cell.complete_now(Exit::fail("late".to_string())));

        assert_eq!(cell.poll(), Some(Exit::Success(1)));
    }

    #[tokio::test]
    async fn readers_before_and_after_see_the_same_exit() {
        let cell = Deferred::<i32, String>::new();

        let early: Vec<_> = (0..3)
            .map(|_| {
                let cell = cell.clone();
                tokio::spawn(async move { cell.wait_exit().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(cell.complete_now(Exit::fail("boom".to_string())));

        for reader in early {
            assert_eq!(reader.await.unwrap(), Exit::fail("boom".to_string()));
        }
        assert_eq!(cell.wait_exit().await, Exit::fail("boom".to_string()));
    }
}
