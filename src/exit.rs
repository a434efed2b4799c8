//! The result channel: how a computation ended.
//!
//! Every effect ends in an [`Exit`]: either a success value or a [`Cause`]
//! explaining why it did not succeed. A `Cause` keeps the four kinds of
//! non-success apart:
//!
//! - [`Cause::Fail`] - an expected, typed failure from the error channel
//! - [`Cause::Die`] - a [`Defect`]: a panic, a failed finalizer, or misuse
//!   of a runtime primitive
//! - [`Cause::Interrupt`] - the fiber was cancelled; this is not an error
//! - [`Cause::Then`] - one cause followed by another, used to attach
//!   finalizer failures to the outcome they happened after
//!
//! # Example
//!
//! ```rust
//! use millrace::{Cause, Exit};
//!
//! let exit: Exit<i32, String> = Exit::fail("boom".to_string());
//! assert!(exit.is_failure());
//! assert_eq!(exit.failure(), Some(&"boom".to_string()));
//!
//! let cause: Cause<String> = Cause::fail("first".to_string()).then(Cause::die("cleanup"));
//! assert_eq!(cause.defects().len(), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::fiber::FiberId;

/// Type-erased error used where the concrete error type is not tracked,
/// such as the failure of a finalizer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Defect
// ============================================================================

/// Where a [`Defect`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
    /// User code panicked.
    Panic,
    /// A scope finalizer failed or panicked.
    Finalizer,
    /// A runtime primitive was used incorrectly (for example asking a
    /// semaphore for more permits than it will ever have).
    Misuse,
    /// Raised explicitly with [`die`](crate::effect::die).
    Other,
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectKind::Panic => write!(f, "panic"),
            DefectKind::Finalizer => write!(f, "finalizer"),
            DefectKind::Misuse => write!(f, "misuse"),
            DefectKind::Other => write!(f, "defect"),
        }
    }
}

/// An unexpected, untyped failure.
///
/// Defects sit outside the typed error channel: `catch_all`, `catch_some`
/// and `catch_tag` never see them. Cloning is cheap; the original error is
/// kept behind an `Arc`.
#[derive(Clone)]
pub struct Defect {
    kind: DefectKind,
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Defect {
    /// Create a defect from any error.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self::with_kind(DefectKind::Other, error.into())
    }

    /// Create a defect from a failed finalizer.
    pub fn finalizer(error: impl Into<BoxError>) -> Self {
        Self::with_kind(DefectKind::Finalizer, error.into())
    }

    /// Create a defect describing misuse of a runtime primitive.
    pub fn misuse(error: impl Into<BoxError>) -> Self {
        Self::with_kind(DefectKind::Misuse, error.into())
    }

    /// Create a defect from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Defect {
            kind: DefectKind::Panic,
            message,
            source: None,
        }
    }

    /// Create a finalizer defect from a caught panic payload.
    pub(crate) fn finalizer_panic(payload: Box<dyn Any + Send>) -> Self {
        Defect {
            kind: DefectKind::Finalizer,
            ..Self::from_panic(payload)
        }
    }

    fn with_kind(kind: DefectKind, error: BoxError) -> Self {
        Defect {
            kind,
            message: error.to_string(),
            source: Some(Arc::from(error)),
        }
    }

    /// Where this defect came from.
    pub fn kind(&self) -> DefectKind {
        self.kind
    }

    /// Human readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original error, if the defect was built from one.
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl fmt::Debug for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Defect")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl PartialEq for Defect {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl std::error::Error for Defect {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(e) => Some(e.as_ref()),
            None => None,
        }
    }
}

// ============================================================================
// Cause
// ============================================================================

/// The full reason a computation did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum Cause<E> {
    /// Expected failure from the typed error channel.
    Fail(E),
    /// Unexpected failure outside the typed channel.
    Die(Defect),
    /// The identified fiber was interrupted.
    Interrupt(FiberId),
    /// The first cause, followed by a second one that happened later
    /// (typically during cleanup).
    Then(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    /// A typed failure.
    pub fn fail(error: E) -> Self {
        Cause::Fail(error)
    }

    /// A defect built from any error.
    pub fn die(error: impl Into<BoxError>) -> Self {
        Cause::Die(Defect::new(error))
    }

    /// Interruption of the given fiber.
    pub fn interrupt(fiber: FiberId) -> Self {
        Cause::Interrupt(fiber)
    }

    /// Sequence this cause with one that happened after it.
    pub fn then(self, next: Cause<E>) -> Self {
        Cause::Then(Box::new(self), Box::new(next))
    }

    /// Sequence causes oldest first as a balanced chain, so the depth of
    /// the result grows with the log of `causes.len()`. `None` when empty.
    pub fn sequence(mut causes: Vec<Cause<E>>) -> Option<Self> {
        if causes.len() <= 1 {
            return causes.pop();
        }
        let later = causes.split_off(causes.len() / 2);
        Some(Cause::sequence(causes)?.then(Cause::sequence(later)?))
    }

    /// The cause that happened first. Finalizer failures appended with
    /// [`then`](Self::then) never displace it.
    pub fn primary(&self) -> &Cause<E> {
        let mut cause = self;
        while let Cause::Then(first, _) = cause {
            cause = &**first;
        }
        cause
    }

    /// True when the primary cause is an interruption.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.primary(), Cause::Interrupt(_))
    }

    /// True when the primary cause is a typed failure.
    pub fn is_failure(&self) -> bool {
        matches!(self.primary(), Cause::Fail(_))
    }

    /// True when the primary cause is a defect.
    pub fn is_die(&self) -> bool {
        matches!(self.primary(), Cause::Die(_))
    }

    /// The first typed failure, in the order the causes happened.
    pub fn failure(&self) -> Option<&E> {
        self.failures().into_iter().next()
    }

    /// Every typed failure, in order.
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.walk(&mut |cause| {
            if let Cause::Fail(e) = cause {
                out.push(e);
            }
        });
        out
    }

    /// Every defect, in order.
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.walk(&mut |cause| {
            if let Cause::Die(d) = cause {
                out.push(d);
            }
        });
        out
    }

    /// Ids of every interrupted fiber mentioned in this cause.
    pub fn interruptions(&self) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.walk(&mut |cause| {
            if let Cause::Interrupt(id) = cause {
                out.push(*id);
            }
        });
        out
    }

    /// Transform the typed failures.
    pub fn map<E2, F>(self, f: F) -> Cause<E2>
    where
        F: FnMut(E) -> E2,
    {
        let mut f = f;
        self.map_inner(&mut f)
    }

    fn map_inner<E2, F>(self, f: &mut F) -> Cause<E2>
    where
        F: FnMut(E) -> E2,
    {
        match self {
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Die(d) => Cause::Die(d),
            Cause::Interrupt(id) => Cause::Interrupt(id),
            Cause::Then(a, b) => {
                let a = a.map_inner(f);
                let b = b.map_inner(f);
                Cause::Then(Box::new(a), Box::new(b))
            }
        }
    }

    /// Take the typed failure out of a cause that is *only* a typed
    /// failure. Anything carrying a defect or an interruption is returned
    /// untouched, since those are not recoverable.
    pub fn into_failure(self) -> Result<E, Cause<E>> {
        match self {
            Cause::Fail(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Split a typed failure from the defects raised after it, typically
    /// by finalizers of the scope it escaped. The cause comes back
    /// untouched unless it starts with a typed failure and everything after
    /// it is a defect.
    pub fn into_failure_and_defects(self) -> Result<(E, Vec<Defect>), Cause<E>> {
        let mut later = Vec::new();
        let mut cause = self;
        let primary = loop {
            match cause {
                Cause::Then(first, next) => {
                    later.push(*next);
                    cause = *first;
                }
                leaf => break leaf,
            }
        };
        later.reverse();

        let only_defects = later
            .iter()
            .all(|c| c.failures().is_empty() && c.interruptions().is_empty());
        match primary {
            Cause::Fail(error) if only_defects => {
                let defects = later
                    .into_iter()
                    .flat_map(Cause::into_leaves)
                    .filter_map(|leaf| match leaf {
                        Cause::Die(defect) => Some(defect),
                        _ => None,
                    })
                    .collect();
                Ok((error, defects))
            }
            primary => Err(later.into_iter().fold(primary, Cause::then)),
        }
    }

    fn into_leaves(self) -> Vec<Cause<E>> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];
        while let Some(cause) = stack.pop() {
            match cause {
                Cause::Then(first, next) => {
                    stack.push(*next);
                    stack.push(*first);
                }
                leaf => leaves.push(leaf),
            }
        }
        leaves
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Cause<E>)) {
        let mut stack = vec![self];
        while let Some(cause) = stack.pop() {
            match cause {
                Cause::Then(first, next) => {
                    stack.push(&**next);
                    stack.push(&**first);
                }
                leaf => visit(leaf),
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Fail(e) => write!(f, "{}", e),
            Cause::Die(d) => write!(f, "{}", d),
            Cause::Interrupt(id) => write!(f, "fiber {} was interrupted", id),
            Cause::Then(a, b) => write!(f, "{}; then {}", a, b),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Cause<E> {}

// ============================================================================
// Exit
// ============================================================================

/// How a computation ended: a value, or the cause of its failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit<A, E> {
    /// Completed with a value.
    Success(A),
    /// Did not complete with a value.
    Failure(Cause<E>),
}

impl<A, E> Exit<A, E> {
    /// A successful exit.
    pub fn succeed(value: A) -> Self {
        Exit::Success(value)
    }

    /// An exit with a typed failure.
    pub fn fail(error: E) -> Self {
        Exit::Failure(Cause::Fail(error))
    }

    /// An exit with a defect.
    pub fn die(error: impl Into<BoxError>) -> Self {
        Exit::Failure(Cause::die(error))
    }

    /// An exit for an interrupted fiber.
    pub fn interrupt(fiber: FiberId) -> Self {
        Exit::Failure(Cause::Interrupt(fiber))
    }

    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success(_))
    }

    /// True for any `Failure`, including interruption.
    pub fn is_failure(&self) -> bool {
        matches!(self, Exit::Failure(_))
    }

    /// True when the primary cause is an interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Exit::Failure(cause) => cause.is_interrupted(),
            Exit::Success(_) => false,
        }
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&A> {
        match self {
            Exit::Success(a) => Some(a),
            Exit::Failure(_) => None,
        }
    }

    /// The failure cause, if any.
    pub fn cause(&self) -> Option<&Cause<E>> {
        match self {
            Exit::Success(_) => None,
            Exit::Failure(c) => Some(c),
        }
    }

    /// The first typed failure, if any.
    pub fn failure(&self) -> Option<&E> {
        self.cause().and_then(Cause::failure)
    }

    /// Transform the success value.
    pub fn map<B, F>(self, f: F) -> Exit<B, E>
    where
        F: FnOnce(A) -> B,
    {
        match self {
            Exit::Success(a) => Exit::Success(f(a)),
            Exit::Failure(c) => Exit::Failure(c),
        }
    }

    /// Transform the typed failures.
    pub fn map_err<E2, F>(self, f: F) -> Exit<A, E2>
    where
        F: FnMut(E) -> E2,
    {
        match self {
            Exit::Success(a) => Exit::Success(a),
            Exit::Failure(c) => Exit::Failure(c.map(f)),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<A, Cause<E>> {
        self.into()
    }
}

impl<A, E> From<Result<A, Cause<E>>> for Exit<A, E> {
    fn from(result: Result<A, Cause<E>>) -> Self {
        match result {
            Ok(a) => Exit::Success(a),
            Err(c) => Exit::Failure(c),
        }
    }
}

impl<A, E> From<Exit<A, E>> for Result<A, Cause<E>> {
    fn from(exit: Exit<A, E>) -> Self {
        match exit {
            Exit::Success(a) => Ok(a),
            Exit::Failure(c) => Err(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_keeps_primary_cause() {
        let cause: Cause<&str> = Cause::interrupt(FiberId::new(3)).then(Cause::die("close"));
        assert!(cause.is_interrupted());
        assert!(!cause.is_die());
        assert_eq!(cause.interruptions(), vec![FiberId::new(3)]);
        assert_eq!(cause.defects()[0].message(), "close");
    }

    #[test]
    fn failures_are_collected_in_order() {
        let cause = Cause::fail(1).then(Cause::fail(2)).then(Cause::fail(3));
        assert_eq!(cause.failures(), vec![&1, &2, &3]);
        assert_eq!(cause.failure(), Some(&1));
    }

    #[test]
    fn into_failure_refuses_mixed_causes() {
        assert_eq!(Cause::<i32>::fail(7).into_failure(), Ok(7));

        let mixed = Cause::fail(7).then(Cause::die("cleanup"));
        assert!(mixed.into_failure().is_err());

        let interrupted = Cause::<i32>::interrupt(FiberId::new(1));
        assert!(interrupted.into_failure().is_err());
    }

    #[test]
    fn failure_followed_by_defects_splits_apart() {
        let cause = Cause::fail("business")
            .then(Cause::die("release a"))
            .then(Cause::die("release b"));
        let (error, defects) = cause.into_failure_and_defects().unwrap();
        assert_eq!(error, "business");
        assert_eq!(defects[0].message(), "release a");
        assert_eq!(defects[1].message(), "release b");

        let interrupted = Cause::fail("business").then(Cause::interrupt(FiberId::new(2)));
        assert_eq!(
            interrupted.clone().into_failure_and_defects(),
            Err(interrupted)
        );

        let defect_first: Cause<&str> = Cause::die("bug").then(Cause::fail("later"));
        assert_eq!(
            defect_first.clone().into_failure_and_defects(),
            Err(defect_first)
        );
    }

    #[test]
    fn sequence_keeps_order_and_stays_shallow() {
        let causes: Vec<Cause<usize>> = (0..100_000).map(Cause::fail).collect();
        let cause = Cause::sequence(causes).unwrap();
        let failures = cause.failures();
        assert_eq!(failures.len(), 100_000);
        assert_eq!(*failures[0], 0);
        assert_eq!(*failures[99_999], 99_999);
        assert_eq!(cause.primary(), &Cause::Fail(0));
        assert!(Cause::<usize>::sequence(Vec::new()).is_none());
    }

    #[test]
    fn map_reaches_nested_failures() {
        let cause = Cause::fail(1).then(Cause::fail(2));
        let mapped = cause.map(|n| n * 10);
        assert_eq!(mapped.failures(), vec![&10, &20]);
    }

    #[test]
    fn panic_payloads_become_defects() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        let defect = Defect::from_panic(payload);
        assert_eq!(defect.kind(), DefectKind::Panic);
        assert_eq!(defect.message(), "kaboom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Defect::from_panic(payload).message(), "owned");
    }

    #[test]
    fn exit_round_trips_through_result() {
        let exit: Exit<i32, String> = Ok(5).into();
        assert_eq!(exit, Exit::Success(5));
        assert_eq!(exit.into_result(), Ok(5));

        let exit: Exit<i32, String> = Exit::fail("no".to_string());
        assert_eq!(exit.into_result(), Err(Cause::Fail("no".to_string())));
    }

    #[test]
    fn interrupted_exit_is_not_a_typed_failure() {
        let exit: Exit<(), String> = Exit::interrupt(FiberId::new(9));
        assert!(exit.is_failure());
        assert!(exit.is_interrupted());
        assert_eq!(exit.failure(), None);
    }

    #[test]
    fn cause_display_mentions_each_part() {
        let cause: Cause<String> = Cause::fail("db down".to_string()).then(Cause::die("leak"));
        let text = cause.to_string();
        assert!(text.contains("db down"));
        assert!(text.contains("leak"));
    }
}
