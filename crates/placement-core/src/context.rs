//! Cancellation support for the hot selection path.
//!
//! The spec requires every core operation to accept a cancellation context
//! and check it between batches (per candidate in streaming variants, per
//! group in balanced variants). No async runtime is pulled in for this —
//! the selection path is synchronous, so a cheap atomic flag checked at
//! well-defined points is all that is needed.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PlacementError;

/// A cooperative cancellation flag, cheaply cloneable and shareable across
/// threads.
///
/// Cancelling a token cancels every clone of it. A fresh, never-cancelled
/// token is created with [`CancellationToken::new`]; [`CancellationToken::none`]
/// returns a token that can never be cancelled, for call sites (tests,
/// one-shot CLI invocations) that have no cancellation source of their own.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token that is never cancelled.
    pub fn none() -> Self {
        Self::new()
    }

    /// Marks this token (and every clone of it) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`cancel`][Self::cancel] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(PlacementError::Cancelled)` if this token has been
    /// cancelled, `Ok(())` otherwise. Selectors call this between
    /// candidates/groups on their hot path.
    pub fn check(&self) -> Result<(), PlacementError> {
        if self.is_cancelled() {
            Err(PlacementError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancelling_one_clone_cancels_all() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(PlacementError::Cancelled)));
    }
}
