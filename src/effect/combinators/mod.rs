//! Zero-cost combinator types for effect composition.
//!
//! This module contains concrete types returned by effect combinators.
//! They don't allocate on the heap and can be optimized by the compiler.
//!
//! Most users won't need to work with these types directly. Instead,
//! use the combinator methods on `EffectExt` which return these types
//! behind `impl Effect<...>`.

mod and_then;
pub(crate) mod catch_all;
mod catch_some;
mod catch_tag;
mod exit;
mod fail;
mod from_async;
mod from_fn;
mod from_result;
mod map;
mod map_err;
mod sleep;
mod succeed;
mod tap;
mod timeout;
mod uninterruptible;
mod zip;

pub use and_then::AndThen;
pub use catch_all::CatchAll;
pub use catch_some::CatchSome;
pub use catch_tag::CatchTag;
pub use exit::Exited;
pub use fail::{Die, Fail};
pub use from_async::FromAsync;
pub use from_fn::FromFn;
pub use from_result::FromResult;
pub use map::Map;
pub use map_err::MapErr;
pub use sleep::{Sleep, YieldNow};
pub use succeed::Succeed;
pub use tap::Tap;
pub use timeout::Timeout;
pub use uninterruptible::Uninterruptible;
pub use zip::Zip;
