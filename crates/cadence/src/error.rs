//! # Error Types
//!
//! Three classes of failure move through the scheduler:
//!
//! - [`UsageError`]: a contract violation by the caller (wrong thread, wrong
//!   lifecycle state, double terminate). Always surfaced, never swallowed.
//! - User-code errors: `Err` results out of hooks and coroutine bodies.
//!   Dispatched through the clock's [`ErrorPolicy`](crate::ErrorPolicy) in
//!   exactly one place.
//! - Teardown errors: failures inside terminating hooks. Logged and
//!   swallowed regardless of policy, because termination must reach `Dead`.

use thiserror::Error;

pub use cadence_core::{HookError, HookResult};

/// A scheduler-contract violation by the caller.
///
/// These are never routed through the error policy; they always surface at
/// the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UsageError {
    /// The operation ran on a thread other than the clock's owning thread.
    #[error("operation attempted off the clock's owning thread")]
    WrongThread,
    /// The entity belongs to a different clock than the one addressed.
    #[error("entity belongs to a different clock context")]
    ContextMismatch,
    /// The clock has stopped (or is shutting down) and accepts no new work.
    #[error("the frame clock is not running")]
    ClockNotRunning,
    /// `activate` was called on an entity that already left the `New` state.
    #[error("entity has already been activated")]
    AlreadyActivated,
    /// The entity was never activated, so the operation has no target clock.
    #[error("entity has not been activated")]
    NotActivated,
    /// `terminate` was called on an entity already at or past `Terminating`.
    #[error("entity has already been terminated")]
    AlreadyTerminated,
    /// `terminate` was called while the activating hook was still running.
    #[error("entity is mid-activation; wait for the activating hook to finish")]
    ActivationInProgress,
    /// Direct termination was attempted on an object that has a parent.
    #[error("only a root object may be terminated directly")]
    NotRoot,
    /// The object was attached to a second parent.
    #[error("object already has a parent")]
    AlreadyHasParent,
}

/// Failure of a wait on a timing point.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The wait's cancellation scope was triggered before resolution.
    #[error("wait cancelled")]
    Cancelled,
    /// The wait itself was a contract violation.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Exit status of a coroutine body.
#[derive(Debug, Error)]
pub enum CoroutineError {
    /// The coroutine observed cancellation and unwound. A clean exit, not
    /// routed through the error policy.
    #[error("coroutine cancelled")]
    Cancelled,
    /// The coroutine violated a scheduler contract.
    #[error(transparent)]
    Usage(UsageError),
    /// The routine's own logic failed.
    #[error("coroutine failed: {0}")]
    Failed(HookError),
}

impl From<WaitError> for CoroutineError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Cancelled => Self::Cancelled,
            WaitError::Usage(usage) => Self::Usage(usage),
        }
    }
}

impl From<UsageError> for CoroutineError {
    fn from(err: UsageError) -> Self {
        Self::Usage(err)
    }
}

impl From<ActivateError> for CoroutineError {
    fn from(err: ActivateError) -> Self {
        match err {
            ActivateError::Usage(usage) => Self::Usage(usage),
            other => Self::Failed(Box::new(other)),
        }
    }
}

/// Failure of an entity activation.
#[derive(Debug, Error)]
pub enum ActivateError {
    /// The activation was a contract violation (wrong state, wrong thread,
    /// wrong clock).
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// The activating hook failed under the strict policy. The entity has
    /// been rolled forward to `Dead`.
    #[error("activating hook failed: {error}")]
    Hook {
        /// The hook's original error.
        error: HookError,
        /// The first error raised during the rollback teardown, if any.
        teardown_error: Option<HookError>,
    },
    /// The activating hook failed under the swallow policy. The original
    /// error was logged; the entity has been rolled forward to `Dead`.
    #[error("activation failed and the entity was rolled back")]
    RolledBack,
}

/// Failure of one clock tick.
#[derive(Debug, Error)]
pub enum TickError {
    /// The tick call itself violated a contract.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// User hooks failed during the frame and the clock runs the strict
    /// policy.
    #[error("user hooks failed during frame {frame}")]
    HookFailures {
        /// The frame in which the failures were collected.
        frame: u64,
        /// Every user-code error raised during the frame, in order.
        errors: Vec<HookError>,
    },
}

/// Failure to parse a [`ClockConfig`](crate::ClockConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document did not match the config schema.
    #[error("invalid clock config: {0}")]
    Parse(#[from] toml::de::Error),
}
