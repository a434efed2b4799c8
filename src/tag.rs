//! Tagged errors for selective recovery.
//!
//! An error type implements [`Tagged`] to expose a stable discriminator for
//! each variant. [`catch_tag`](crate::effect::EffectExt::catch_tag)
//! recovers exactly one variant and lets the others propagate, without
//! runtime type inspection.
//!
//! # Example
//!
//! ```rust
//! use millrace::Tagged;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum DbError {
//!     NotFound(u64),
//!     Timeout,
//! }
//!
//! impl Tagged for DbError {
//!     fn tag(&self) -> &'static str {
//!         match self {
//!             DbError::NotFound(_) => "NotFound",
//!             DbError::Timeout => "Timeout",
//!         }
//!     }
//! }
//!
//! assert_eq!(DbError::NotFound(7).tag(), "NotFound");
//! assert!(DbError::Timeout.has_tag("Timeout"));
//! ```

/// An error with a stable per-variant discriminator.
pub trait Tagged {
    /// The variant's tag. Must be the same for every value of a variant.
    fn tag(&self) -> &'static str;

    /// True if this value's tag is `tag`.
    fn has_tag(&self, tag: &str) -> bool {
        self.tag() == tag
    }
}

impl<T: Tagged + ?Sized> Tagged for Box<T> {
    fn tag(&self) -> &'static str {
        (**self).tag()
    }
}
