//! # Error Policy
//!
//! How a clock treats `Err` results out of user code (hooks, timing-point
//! listeners, coroutine bodies). The policy is fixed at clock construction;
//! there is no process-wide flag, so clocks with different policies coexist
//! in one process.

use serde::{Deserialize, Serialize};

/// Disposition of user-code errors for one clock.
///
/// Usage errors and teardown errors are not governed by this value: usage
/// errors always surface at the call site, and terminating-hook errors are
/// always logged and swallowed so termination can reach `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the error at `warn` and keep the frame loop going. One failing
    /// entity degrades itself, not the loop.
    #[default]
    Swallow,
    /// Collect every error raised during the frame and fail the tick with
    /// them. Intended for tests and debug builds.
    Strict,
}

impl ErrorPolicy {
    /// Whether this is the strict policy.
    #[inline]
    #[must_use]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}
