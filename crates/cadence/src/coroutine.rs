//! # Coroutines
//!
//! Multi-frame user logic as plain async blocks whose only suspension
//! points are timing-point waits. Coroutines are driven by their clock's
//! own executor; nothing runs in parallel, and the driver never
//! force-cancels a routine. Cancellation is cooperative: routines check
//! [`CoroutineState::can_run`] after every resume.

use std::future::Future;
use std::sync::Arc;

use cadence_core::CancelToken;

use crate::clock::FrameClock;
use crate::error::{CoroutineError, UsageError, WaitError};
use crate::layer::ObjectLayer;
use crate::lifecycle::LifeState;
use crate::light::Light;
use crate::object::SceneObject;
use crate::point::TimingPoints;
use crate::timing::FrameTiming;

/// Names one reservation slot for [`Coroutine::start_or_reserve`].
///
/// Reservations are keyed per (owner, key); two owners using the same key
/// do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationKey(pub &'static str);

/// An entity (or the clock itself) that coroutines can be scoped to.
pub trait CoroutineHost {
    /// The clock driving this host, once known.
    fn host_clock(&self) -> Option<FrameClock>;
    /// The host's current lifecycle state.
    fn host_life_state(&self) -> LifeState;
    /// Token tripped when the host starts terminating.
    fn host_cancel_token(&self) -> CancelToken;
    /// Stable id distinguishing this host's reservations from others'.
    fn host_scope_id(&self) -> u64;
}

impl CoroutineHost for SceneObject {
    fn host_clock(&self) -> Option<FrameClock> {
        self.lifecycle().clock()
    }

    fn host_life_state(&self) -> LifeState {
        self.state()
    }

    fn host_cancel_token(&self) -> CancelToken {
        self.cancel_token()
    }

    fn host_scope_id(&self) -> u64 {
        self.lifecycle().id()
    }
}

impl CoroutineHost for ObjectLayer {
    fn host_clock(&self) -> Option<FrameClock> {
        self.clock()
    }

    fn host_life_state(&self) -> LifeState {
        self.stage_core().state()
    }

    fn host_cancel_token(&self) -> CancelToken {
        self.stage_core().lifecycle().running_token()
    }

    fn host_scope_id(&self) -> u64 {
        self.stage_core().lifecycle().id()
    }
}

impl CoroutineHost for Light {
    fn host_clock(&self) -> Option<FrameClock> {
        self.lifecycle().clock()
    }

    fn host_life_state(&self) -> LifeState {
        self.state()
    }

    fn host_cancel_token(&self) -> CancelToken {
        self.lifecycle().running_token()
    }

    fn host_scope_id(&self) -> u64 {
        self.lifecycle().id()
    }
}

/// What a coroutine body is handed: its clock, its owner's liveness, and
/// cancellation-aware wait helpers.
#[derive(Clone)]
pub struct CoroutineState {
    clock: FrameClock,
    owner_state: Arc<dyn Fn() -> LifeState + Send + Sync>,
    cancel: CancelToken,
}

impl CoroutineState {
    fn new<H>(clock: FrameClock, owner: &H) -> Self
    where
        H: CoroutineHost + Clone + Send + Sync + 'static,
    {
        let probe = owner.clone();
        Self {
            clock,
            owner_state: Arc::new(move || probe.host_life_state()),
            cancel: owner.host_cancel_token(),
        }
    }

    /// The driving clock.
    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// The clock's timing points.
    #[must_use]
    pub fn points(&self) -> TimingPoints {
        self.clock.timing_points()
    }

    /// The owner's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the routine should keep running: the clock is live and the
    /// owner has not reached `Dead`.
    ///
    /// The check is polled, not pushed. A routine resumed in the same tick
    /// its owner started terminating may observe one extra resume before
    /// the check turns false: terminate takes effect at the next suspension
    /// point, not instantly.
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.clock.is_running() && (self.owner_state)() < LifeState::Dead
    }

    /// Waits for the next occurrence of `timing`, observing the owner's
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// [`WaitError::Cancelled`] when the owner terminated, or the usual
    /// wait contract violations.
    pub async fn next(&self, timing: FrameTiming) -> Result<(), WaitError> {
        self.points().get(timing).next_with(self.cancel.clone()).await
    }

    /// Waits for `timing` in a following frame, observing the owner's
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// See [`CoroutineState::next`].
    pub async fn next_frame(&self, timing: FrameTiming) -> Result<(), WaitError> {
        self.points()
            .get(timing)
            .next_frame_with(self.cancel.clone())
            .await
    }

    /// Waits `frames` occurrences of `timing`, observing the owner's
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// See [`CoroutineState::next`].
    pub async fn delay_frames(&self, timing: FrameTiming, frames: u64) -> Result<(), WaitError> {
        self.points()
            .get(timing)
            .delay_frames_with(frames, self.cancel.clone())
            .await
    }
}

/// Entry points for starting coroutines.
pub struct Coroutine;

impl Coroutine {
    /// Starts `routine` on the owner's clock, synchronously running it up
    /// to its first suspension point.
    ///
    /// # Errors
    ///
    /// [`UsageError::NotActivated`] when the owner has no clock yet,
    /// [`UsageError::WrongThread`] off the clock's thread, and
    /// [`UsageError::ClockNotRunning`] once the clock is shutting down.
    pub fn start<H, F, Fut>(owner: &H, routine: F) -> Result<(), UsageError>
    where
        H: CoroutineHost + Clone + Send + Sync + 'static,
        F: FnOnce(CoroutineState) -> Fut,
        Fut: Future<Output = Result<(), CoroutineError>> + Send + 'static,
    {
        let clock = owner.host_clock().ok_or(UsageError::NotActivated)?;
        clock.ensure_owner_thread()?;
        if !clock.accepts_work() {
            return Err(UsageError::ClockNotRunning);
        }
        let state = CoroutineState::new(clock.clone(), owner);
        clock.spawn(Box::pin(routine(state)));
        Ok(())
    }

    /// Starts `routine` at the next occurrence of `timing` unless a
    /// reservation for (owner, `key`) is already pending, in which case the
    /// new request is silently dropped. At most one reservation per slot is
    /// ever outstanding.
    ///
    /// # Errors
    ///
    /// See [`Coroutine::start`].
    pub fn start_or_reserve<H, F, Fut>(
        owner: &H,
        key: ReservationKey,
        timing: FrameTiming,
        routine: F,
    ) -> Result<(), UsageError>
    where
        H: CoroutineHost + Clone + Send + Sync + 'static,
        F: FnOnce(CoroutineState) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoroutineError>> + Send + 'static,
    {
        let clock = owner.host_clock().ok_or(UsageError::NotActivated)?;
        clock.ensure_owner_thread()?;
        if !clock.accepts_work() {
            return Err(UsageError::ClockNotRunning);
        }
        let scope = owner.host_scope_id();
        if !clock.try_reserve(scope, key) {
            return Ok(());
        }
        let owner = owner.clone();
        let release_clock = clock.clone();
        clock.timing_points().get(timing).post(move || {
            release_clock.release_reservation(scope, key);
            if let Err(error) = Coroutine::start(&owner, routine) {
                release_clock.report_user_error("reserved coroutine", Box::new(error));
            }
        });
        Ok(())
    }
}
