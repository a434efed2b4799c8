//! Counting semaphore with strict FIFO admission.
//!
//! A [`Semaphore`] has a fixed capacity set at construction. Fibers acquire
//! `n` permits at a time and are served in arrival order: a waiter at the
//! head of the queue blocks everyone behind it until its full request can
//! be granted, so large requests are never starved by small ones and no
//! partial grants happen.
//!
//! Waiting is a suspension point. An interrupted waiter leaves the queue
//! immediately; if its grant raced with the interruption the permits go
//! straight back to the semaphore.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let db_slots = Semaphore::new(4);
//! let query = db_slots.with_permit(from_async(|| run_query()));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::context::Ctx;
use crate::effect::Effect;
use crate::exit::{Cause, Defect};
use crate::util::lock;

/// Misuse of a semaphore. Raised as a defect by the semaphore effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    /// Asked for more permits than the semaphore will ever have.
    ExceedsCapacity {
        /// Permits requested.
        requested: usize,
        /// Total capacity.
        capacity: usize,
    },
    /// Asked for zero permits.
    ZeroPermits,
    /// Released more permits than are currently held.
    OverRelease {
        /// Permits released.
        released: usize,
        /// Permits held at the time.
        in_use: usize,
    },
}

impl fmt::Display for SemaphoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaphoreError::ExceedsCapacity {
                requested,
                capacity,
            } => write!(
                f,
                "requested {} permits from a semaphore with capacity {}",
                requested, capacity
            ),
            SemaphoreError::ZeroPermits => write!(f, "cannot acquire 0 permits"),
            SemaphoreError::OverRelease { released, in_use } => write!(
                f,
                "released {} permits but only {} are in use",
                released, in_use
            ),
        }
    }
}

impl std::error::Error for SemaphoreError {}

struct Waiter {
    id: u64,
    permits: usize,
    grant: oneshot::Sender<()>,
}

struct State {
    available: usize,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
}

impl State {
    /// Grant from the head of the queue while the head fits.
    fn grant_waiters(&mut self) {
        while self
            .waiters
            .front()
            .is_some_and(|head| head.permits <= self.available)
        {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.available -= waiter.permits;
            if waiter.grant.send(()).is_err() {
                self.available += waiter.permits;
            } else {
                tracing::trace!(waiter = waiter.id, permits = waiter.permits, "permits granted");
            }
        }
    }
}

struct Inner {
    capacity: usize,
    state: Mutex<State>,
}

/// A counting permit primitive bounding concurrent access.
///
/// Clones share the same permits.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Semaphore")
            .field("capacity", &self.inner.capacity)
            .field("available", &state.available)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

impl Semaphore {
    /// Create a semaphore with `capacity` permits, all available.
    pub fn new(capacity: usize) -> Self {
        Semaphore {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    available: capacity,
                    waiters: VecDeque::new(),
                    next_waiter: 0,
                }),
            }),
        }
    }

    /// Total number of permits.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permits not held by anyone.
    pub fn available(&self) -> usize {
        lock(&self.inner.state).available
    }

    /// Permits currently held. Always `capacity() - available()`.
    pub fn in_use(&self) -> usize {
        self.inner.capacity - self.available()
    }

    /// Number of fibers queued for permits.
    pub fn waiting(&self) -> usize {
        lock(&self.inner.state).waiters.len()
    }

    fn check(&self, permits: usize) -> Result<(), SemaphoreError> {
        if permits == 0 {
            Err(SemaphoreError::ZeroPermits)
        } else if permits > self.inner.capacity {
            Err(SemaphoreError::ExceedsCapacity {
                requested: permits,
                capacity: self.inner.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Take `permits` without waiting. Returns `Ok(false)` when they are not
    /// available right now or other fibers are already queued.
    pub fn try_acquire(&self, permits: usize) -> Result<bool, SemaphoreError> {
        self.check(permits)?;
        let mut state = lock(&self.inner.state);
        if state.waiters.is_empty() && state.available >= permits {
            state.available -= permits;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Return `permits` to the semaphore and wake waiters in FIFO order.
    pub fn release_now(&self, permits: usize) -> Result<(), SemaphoreError> {
        let mut state = lock(&self.inner.state);
        let in_use = self.inner.capacity - state.available;
        if permits > in_use {
            return Err(SemaphoreError::OverRelease {
                released: permits,
                in_use,
            });
        }
        state.available += permits;
        tracing::trace!(permits, available = state.available, "permits released");
        state.grant_waiters();
        Ok(())
    }

    /// Acquire `permits` as a suspension point of the fiber in `ctx`.
    pub(crate) async fn acquire_in<E>(&self, ctx: &Ctx, permits: usize) -> Result<(), Cause<E>> {
        self.check(permits)
            .map_err(|e| Cause::Die(Defect::misuse(e)))?;

        let (id, rx) = {
            let mut state = lock(&self.inner.state);
            if state.waiters.is_empty() && state.available >= permits {
                state.available -= permits;
                return Ok(());
            }
            let id = state.next_waiter;
            state.next_waiter = state.next_waiter.wrapping_add(1);
            let (grant, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, permits, grant });
            tracing::trace!(waiter = id, permits, fiber = %ctx.fiber_id(), "waiting for permits");
            (id, rx)
        };

        let mut waiting = Waiting {
            semaphore: self,
            id,
            permits,
            rx,
            granted: false,
        };
        match ctx.suspend(&mut waiting.rx).await? {
            Ok(()) => {
                waiting.granted = true;
                Ok(())
            }
            Err(_) => Err(Cause::Die(Defect::misuse("semaphore grant dropped"))),
        }
    }

    /// Effect that acquires `permits`, waiting in FIFO order.
    ///
    /// Requesting zero permits or more than [`capacity`](Self::capacity)
    /// dies with a [`SemaphoreError`].
    pub fn acquire<E>(&self, permits: usize) -> Acquire<E> {
        Acquire {
            semaphore: self.clone(),
            permits,
            _marker: PhantomData,
        }
    }

    /// Effect that releases `permits`.
    pub fn release<E>(&self, permits: usize) -> Release<E> {
        Release {
            semaphore: self.clone(),
            permits,
            _marker: PhantomData,
        }
    }

    /// Run `effect` while holding `permits`. The permits are returned on
    /// every exit path: success, failure, defect, or interruption.
    pub fn with_permits<Eff>(&self, permits: usize, effect: Eff) -> WithPermits<Eff> {
        WithPermits {
            semaphore: self.clone(),
            permits,
            effect,
        }
    }

    /// `with_permits(1, effect)`.
    pub fn with_permit<Eff>(&self, effect: Eff) -> WithPermits<Eff> {
        self.with_permits(1, effect)
    }
}

/// Queue entry guard. Dropping it without a grant leaves the queue; if the
/// grant already happened the permits are returned.
struct Waiting<'a> {
    semaphore: &'a Semaphore,
    id: u64,
    permits: usize,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        let mut state = lock(&self.semaphore.inner.state);
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
            tracing::trace!(waiter = self.id, "waiter left the queue");
        } else {
            // Popped by `grant_waiters` while `rx` was still alive, so the
            // grant was delivered to us.
            state.available += self.permits;
        }
        // The head may have changed; whoever is there now might fit.
        state.grant_waiters();
    }
}

/// Permits held by a running [`WithPermits`], returned on drop.
struct PermitGuard {
    semaphore: Semaphore,
    permits: usize,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Err(e) = self.semaphore.release_now(self.permits) {
            tracing::warn!(error = %e, "failed to return permits");
        }
    }
}

/// Effect returned by [`Semaphore::acquire`].
#[derive(Debug)]
pub struct Acquire<E> {
    semaphore: Semaphore,
    permits: usize,
    _marker: PhantomData<E>,
}

impl<E: Send> Effect for Acquire<E> {
    type Output = ();
    type Error = E;

    async fn run(self, ctx: &Ctx) -> Result<(), Cause<E>> {
        self.semaphore.acquire_in(ctx, self.permits).await
    }
}

/// Effect returned by [`Semaphore::release`].
#[derive(Debug)]
pub struct Release<E> {
    semaphore: Semaphore,
    permits: usize,
    _marker: PhantomData<E>,
}

impl<E: Send> Effect for Release<E> {
    type Output = ();
    type Error = E;

    async fn run(self, _ctx: &Ctx) -> Result<(), Cause<E>> {
        self.semaphore
            .release_now(self.permits)
            .map_err(|e| Cause::Die(Defect::misuse(e)))
    }
}

/// Effect returned by [`Semaphore::with_permits`].
pub struct WithPermits<Eff> {
    semaphore: Semaphore,
    permits: usize,
    effect: Eff,
}

impl<Eff> fmt::Debug for WithPermits<Eff> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithPermits")
            .field("semaphore", &self.semaphore)
            .field("permits", &self.permits)
            .field("effect", &"<effect>")
            .finish()
    }
}

impl<Eff: Effect> Effect for WithPermits<Eff> {
    type Output = Eff::Output;
    type Error = Eff::Error;

    async fn run(self, ctx: &Ctx) -> Result<Eff::Output, Cause<Eff::Error>> {
        self.semaphore.acquire_in(ctx, self.permits).await?;
        let _guard = PermitGuard {
            semaphore: self.semaphore,
            permits: self.permits,
        };
        self.effect.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_respects_capacity() {
        let sem = Semaphore::new(3);
        assert_eq!(sem.try_acquire(2), Ok(true));
        assert_eq!(sem.try_acquire(2), Ok(false));
        assert_eq!(sem.available(), 1);
        assert_eq!(sem.in_use(), 2);
        assert_eq!(
            sem.try_acquire(4),
            Err(SemaphoreError::ExceedsCapacity {
                requested: 4,
                capacity: 3
            })
        );
        assert_eq!(sem.try_acquire(0), Err(SemaphoreError::ZeroPermits));
    }

    #[test]
    fn over_release_is_rejected() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.try_acquire(1), Ok(true));
        assert_eq!(
            sem.release_now(2),
            Err(SemaphoreError::OverRelease {
                released: 2,
                in_use: 1
            })
        );
        assert_eq!(sem.release_now(1), Ok(()));
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn release_grants_head_first_without_partial_grants() {
        let sem = Semaphore::new(3);
        assert_eq!(sem.try_acquire(3), Ok(true));

        let (big_tx, mut big_rx) = oneshot::channel();
        let (small_tx, mut small_rx) = oneshot::channel();
        {
            let mut state = lock(&sem.inner.state);
            state.waiters.push_back(Waiter {
                id: 0,
                permits: 2,
                grant: big_tx,
            });
            state.waiters.push_back(Waiter {
                id: 1,
                permits: 1,
                grant: small_tx,
            });
        }

        // One permit would fit the small waiter, but the big one is first.
        sem.release_now(1).unwrap();
        assert!(big_rx.try_recv().is_err());
        assert!(small_rx.try_recv().is_err());
        assert_eq!(sem.available(), 1);

        sem.release_now(1).unwrap();
        assert!(big_rx.try_recv().is_ok());
        assert!(small_rx.try_recv().is_err());

        sem.release_now(1).unwrap();
        assert!(small_rx.try_recv().is_ok());
        assert_eq!(sem.available() + sem.in_use(), sem.capacity());
        assert_eq!(sem.in_use(), 3);
    }

    #[test]
    fn error_messages_name_the_numbers() {
        let e = SemaphoreError::ExceedsCapacity {
            requested: 5,
            capacity: 2,
        };
        assert!(e.to_string().contains('5'));
        assert!(e.to_string().contains('2'));
    }
}
