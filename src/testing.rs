//! Testing utilities for code built on millrace.
//!
//! Assertion macros over [`Exit`](crate::Exit), and, with the `proptest`
//! feature, an `Arbitrary` implementation for generating exits.
//!
//! # Examples
//!
//! ```rust
//! use millrace::{assert_failure, assert_interrupted, assert_success, Exit, FiberId};
//!
//! let ok = Exit::<_, String>::succeed(42);
//! assert_eq!(assert_success!(ok), 42);
//!
//! let failed = Exit::<i32, _>::fail("boom".to_string());
//! assert_failure!(failed, "boom".to_string());
//!
//! let stopped = Exit::<i32, String>::interrupt(FiberId::new(3));
//! assert_interrupted!(stopped);
//! ```

/// Assert that an exit is a success and evaluate to its value.
///
/// Panics with the cause otherwise.
///
/// # Example
///
/// ```rust
/// use millrace::{assert_success, Exit};
///
/// let value = assert_success!(Exit::<_, String>::succeed("done"));
/// assert_eq!(value, "done");
/// ```
#[macro_export]
macro_rules! assert_success {
    ($exit:expr) => {
        match $exit {
            $crate::Exit::Success(value) => value,
            $crate::Exit::Failure(cause) => {
                panic!("Expected Success, got Failure: {:?}", cause);
            }
        }
    };
}

/// Assert that an exit failed with a typed error, optionally equal to an
/// expected value.
///
/// Defects and interruptions do not count as typed failures.
///
/// # Example
///
/// ```rust
/// use millrace::{assert_failure, Exit};
///
/// let exit = Exit::<i32, _>::fail("bad input");
/// assert_failure!(exit, "bad input");
/// ```
#[macro_export]
macro_rules! assert_failure {
    ($exit:expr) => {
        match $exit {
            $crate::Exit::Failure(cause) if cause.is_failure() => {}
            other => {
                panic!("Expected typed Failure, got: {:?}", other);
            }
        }
    };
    ($exit:expr, $expected:expr) => {
        match $exit {
            $crate::Exit::Failure(cause) if cause.is_failure() => {
                assert_eq!(cause.failure(), Some(&$expected));
            }
            other => {
                panic!(
                    "Expected Failure with error {:?}, got: {:?}",
                    $expected, other
                );
            }
        }
    };
}

/// Assert that an exit ended in interruption.
///
/// # Example
///
/// ```rust
/// use millrace::{assert_interrupted, Exit, FiberId};
///
/// assert_interrupted!(Exit::<(), String>::interrupt(FiberId::new(1)));
/// ```
#[macro_export]
macro_rules! assert_interrupted {
    ($exit:expr) => {
        match $exit {
            $crate::Exit::Failure(cause) if cause.is_interrupted() => {}
            other => {
                panic!("Expected Interrupted, got: {:?}", other);
            }
        }
    };
}

/// Assert that an exit ended in a defect.
#[macro_export]
macro_rules! assert_died {
    ($exit:expr) => {
        match $exit {
            $crate::Exit::Failure(cause) if cause.is_die() => {}
            other => {
                panic!("Expected Die, got: {:?}", other);
            }
        }
    };
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
use crate::exit::Exit;

/// Generates successes and typed failures. Defects and interruptions are
/// runtime events and are not generated.
#[cfg(feature = "proptest")]
impl<A, E> Arbitrary for Exit<A, E>
where
    A: Arbitrary + 'static,
    E: Arbitrary + 'static,
{
    type Parameters = (A::Parameters, E::Parameters);
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        let (a_params, e_params) = args;
        prop_oneof![
            any_with::<A>(a_params).prop_map(Exit::succeed),
            any_with::<E>(e_params).prop_map(Exit::fail),
        ]
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::exit::{Defect, Exit};
    use crate::fiber::FiberId;

    #[test]
    fn assert_success_yields_value() {
        let exit = Exit::<_, String>::succeed(42);
        assert_eq!(assert_success!(exit), 42);
    }

    #[test]
    fn assert_failure_macro() {
        assert_failure!(Exit::<i32, _>::fail("error".to_string()));
        assert_failure!(Exit::<i32, _>::fail("error".to_string()), "error".to_string());
    }

    #[test]
    fn assert_interrupted_macro() {
        assert_interrupted!(Exit::<i32, String>::interrupt(FiberId::new(9)));
    }

    #[test]
    fn assert_died_macro() {
        assert_died!(Exit::<i32, String>::Failure(crate::Cause::Die(Defect::new("x"))));
    }

    #[test]
    #[should_panic(expected = "Expected Success, got Failure")]
    fn assert_success_panics_on_failure() {
        let _ = assert_success!(Exit::<i32, _>::fail("error".to_string()));
    }

    #[test]
    #[should_panic(expected = "Expected typed Failure")]
    fn assert_failure_rejects_interruption() {
        assert_failure!(Exit::<i32, String>::interrupt(FiberId::new(1)));
    }

    #[test]
    #[should_panic(expected = "Expected Interrupted")]
    fn assert_interrupted_panics_on_success() {
        assert_interrupted!(Exit::<_, String>::succeed(1));
    }

    #[cfg(feature = "proptest")]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn exit_arbitrary_generates_valid_instances(
                exit in any::<Exit<i32, String>>()
            ) {
                match &exit {
                    Exit::Success(_) => prop_assert!(exit.is_success()),
                    Exit::Failure(_) => prop_assert!(exit.failure().is_some()),
                }
            }
        }
    }
}
