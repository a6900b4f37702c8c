//! Invariant checks for the element store and related structures.
//!
//! Checks are free in release builds unless the `strict-invariants` or
//! `check-invariants` feature is enabled.

use crate::amr_error::AmrError;

/// Validation of structural invariants (neighbor symmetry, valid ids, ...).
pub trait DebugInvariants {
    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), AmrError>;

    /// Panic on the first violation when invariant checking is enabled.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "invariant check failed");
    }
}

/// Run a fallible check and panic with context when invariant checking is
/// enabled; expands to nothing otherwise.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[amr invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
