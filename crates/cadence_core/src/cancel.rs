//! # Cancellation
//!
//! A one-shot cancellation flag shared between an owner (the source) and any
//! number of observers (tokens). Once cancelled, a source stays cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner side of a cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
}

/// Observer side of a cancellation flag.
///
/// A token either tracks a [`CancelSource`] or is the `never` token, which
/// can never report cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancelSource {
    /// Creates a source in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: Some(Arc::clone(&self.flag)),
        }
    }

    /// Flips the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether [`CancelSource::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl CancelToken {
    /// A token that never reports cancellation.
    #[must_use]
    pub fn never() -> Self {
        Self { flag: None }
    }

    /// Whether the observed source has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_observes_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[test]
    fn test_never_token_ignores_everything() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent_and_sticky() {
        let source = CancelSource::new();
        source.cancel();
        source.cancel();
        assert!(source.token().is_cancelled());
    }
}
