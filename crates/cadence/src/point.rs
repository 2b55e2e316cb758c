//! # Timing Points
//!
//! A [`TimingPoint`] is one named phase of a clock, addressed through a
//! cheap handle. It carries the phase's synchronous subscriber list and its
//! one-shot work queue, and is the only sanctioned way to schedule "run
//! this at phase X": either awaiting one of the wait futures or posting a
//! callback.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;

use cadence_core::{CancelToken, EventSource, HookResult, SlotId, SubscriptionId};

use crate::clock::FrameClock;
use crate::error::{UsageError, WaitError};
use crate::timing::{CurrentTiming, FrameTiming};

/// One entry in a timing point's one-shot queue.
pub(crate) enum WorkItem {
    /// A posted callback.
    Callback(Box<dyn FnOnce() + Send>),
    /// Resolution of a pooled wait.
    Resolve(SlotId),
}

/// Per-phase state owned by the clock.
pub(crate) struct PointCore {
    listeners: EventSource<FrameTiming>,
    queue: Mutex<Vec<WorkItem>>,
}

impl PointCore {
    pub(crate) fn new() -> Self {
        Self {
            listeners: EventSource::new(),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn listeners(&self) -> &EventSource<FrameTiming> {
        &self.listeners
    }

    pub(crate) fn push(&self, item: WorkItem) {
        self.queue.lock().push(item);
    }

    /// Takes the whole queue. Items pushed while the snapshot runs land in
    /// the fresh queue, which for this phase means the next frame.
    pub(crate) fn take_queue(&self) -> Vec<WorkItem> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn clear(&self) {
        self.listeners.clear();
        self.queue.lock().clear();
    }
}

/// Handle to one phase of one clock.
#[derive(Clone)]
pub struct TimingPoint {
    clock: FrameClock,
    timing: FrameTiming,
}

impl TimingPoint {
    pub(crate) fn new(clock: FrameClock, timing: FrameTiming) -> Self {
        Self { clock, timing }
    }

    /// The phase this handle addresses.
    #[inline]
    #[must_use]
    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    /// The clock this handle belongs to.
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    fn core(&self) -> &PointCore {
        self.clock.point_core(self.timing)
    }

    /// Subscribes a listener invoked synchronously every time this phase
    /// occurs, before the phase's one-shot queue is drained. Errors are
    /// dispatched through the clock's error policy.
    pub fn subscribe(
        &self,
        listener: impl Fn(&FrameTiming) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.core().listeners().subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core().listeners().unsubscribe(id)
    }

    /// Queues a one-shot callback for this phase's next occurrence.
    ///
    /// Never suspends and may be called from any thread, so teardown paths
    /// and background workers can hand work back to the frame loop. A
    /// callback posted to the currently running phase runs next frame.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        self.core().push(WorkItem::Callback(Box::new(callback)));
    }

    /// Waits for the next occurrence of this phase.
    ///
    /// If the current phase ordinally equals or follows this one, the wait
    /// spans into the next frame; there is no same-tick fast path.
    #[must_use]
    pub fn next(&self) -> NextTiming {
        self.next_with(CancelToken::never())
    }

    /// [`TimingPoint::next`] observing a cancellation scope.
    #[must_use]
    pub fn next_with(&self, cancel: CancelToken) -> NextTiming {
        NextTiming {
            point: self.clone(),
            cancel,
            state: NextState::Unregistered,
        }
    }

    /// Resolves immediately when the loop is currently at this phase,
    /// otherwise behaves like [`TimingPoint::next`].
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn next_or_now(&self) -> Result<(), WaitError> {
        self.next_or_now_with(CancelToken::never()).await
    }

    /// [`TimingPoint::next_or_now`] observing a cancellation scope.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn next_or_now_with(&self, cancel: CancelToken) -> Result<(), WaitError> {
        if self.clock.current_timing() == CurrentTiming::At(self.timing) {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            return Ok(());
        }
        self.next_with(cancel).await
    }

    /// Waits for this phase in a frame after the current one.
    ///
    /// Out of the loop this is identical to [`TimingPoint::next`]. Inside a
    /// tick it first waits for the frame boundary, then for this phase, so
    /// the caller never resumes within the tick that scheduled the wait.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn next_frame(&self) -> Result<(), WaitError> {
        self.next_frame_with(CancelToken::never()).await
    }

    /// [`TimingPoint::next_frame`] observing a cancellation scope.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn next_frame_with(&self, cancel: CancelToken) -> Result<(), WaitError> {
        if self.clock.current_timing().is_out_of_loop() {
            return self.next_with(cancel).await;
        }
        self.clock
            .end_of_frame()
            .next_or_now_with(cancel.clone())
            .await?;
        self.next_with(cancel).await
    }

    /// Waits until `frames` further occurrences of this phase have passed,
    /// measured against the frame counter at the time of the call.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_frames(&self, frames: u64) -> Result<(), WaitError> {
        self.delay_frames_with(frames, CancelToken::never()).await
    }

    /// [`TimingPoint::delay_frames`] observing a cancellation scope.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_frames_with(&self, frames: u64, cancel: CancelToken) -> Result<(), WaitError> {
        let baseline = self.clock.frame();
        while self.clock.frame() < baseline.saturating_add(frames) {
            self.next_with(cancel.clone()).await?;
        }
        Ok(())
    }

    /// Waits until more than `duration` of simulated time has accumulated
    /// past the moment of the call.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_time(&self, duration: Duration) -> Result<(), WaitError> {
        self.delay_time_with(duration, CancelToken::never()).await
    }

    /// [`TimingPoint::delay_time`] observing a cancellation scope.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_time_with(
        &self,
        duration: Duration,
        cancel: CancelToken,
    ) -> Result<(), WaitError> {
        let baseline = self.clock.sim_time();
        while self.clock.sim_time().saturating_sub(baseline) <= duration {
            self.next_with(cancel.clone()).await?;
        }
        Ok(())
    }

    /// Like [`TimingPoint::delay_time`], but against real elapsed time.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_real_time(&self, duration: Duration) -> Result<(), WaitError> {
        self.delay_real_time_with(duration, CancelToken::never())
            .await
    }

    /// [`TimingPoint::delay_real_time`] observing a cancellation scope.
    ///
    /// # Errors
    ///
    /// See [`TimingPoint::next`].
    pub async fn delay_real_time_with(
        &self,
        duration: Duration,
        cancel: CancelToken,
    ) -> Result<(), WaitError> {
        let baseline = self.clock.real_time();
        while self.clock.real_time().saturating_sub(baseline) <= duration {
            self.next_with(cancel.clone()).await?;
        }
        Ok(())
    }
}

/// The full set of timing points of one clock.
#[derive(Clone)]
pub struct TimingPoints {
    clock: FrameClock,
}

impl TimingPoints {
    pub(crate) fn new(clock: FrameClock) -> Self {
        Self { clock }
    }

    /// Handle to an arbitrary phase.
    #[must_use]
    pub fn get(&self, timing: FrameTiming) -> TimingPoint {
        TimingPoint::new(self.clock.clone(), timing)
    }

    /// The `FrameInitializing` phase.
    #[must_use]
    pub fn frame_initializing(&self) -> TimingPoint {
        self.get(FrameTiming::FrameInitializing)
    }

    /// The `EarlyUpdate` phase.
    #[must_use]
    pub fn early_update(&self) -> TimingPoint {
        self.get(FrameTiming::EarlyUpdate)
    }

    /// The `Update` phase.
    #[must_use]
    pub fn update(&self) -> TimingPoint {
        self.get(FrameTiming::Update)
    }

    /// The `LateUpdate` phase.
    #[must_use]
    pub fn late_update(&self) -> TimingPoint {
        self.get(FrameTiming::LateUpdate)
    }

    /// The `BeforeRendering` phase.
    #[must_use]
    pub fn before_rendering(&self) -> TimingPoint {
        self.get(FrameTiming::BeforeRendering)
    }

    /// The `Rendering` phase.
    #[must_use]
    pub fn rendering(&self) -> TimingPoint {
        self.get(FrameTiming::Rendering)
    }

    /// The `AfterRendering` phase.
    #[must_use]
    pub fn after_rendering(&self) -> TimingPoint {
        self.get(FrameTiming::AfterRendering)
    }

    /// The `FrameFinalizing` phase.
    #[must_use]
    pub fn frame_finalizing(&self) -> TimingPoint {
        self.get(FrameTiming::FrameFinalizing)
    }
}

#[derive(Clone, Copy)]
enum NextState {
    Unregistered,
    Waiting(SlotId),
    Done,
}

/// Future returned by [`TimingPoint::next`] and [`TimingPoint::next_with`].
///
/// On first poll it checks the thread and clock, checks its cancellation
/// scope, then checks a pooled slot out and queues its resolution at the
/// target phase. Dropping the future releases the slot; a resolution still
/// queued for it then carries a stale handle and is ignored.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTiming {
    point: TimingPoint,
    cancel: CancelToken,
    state: NextState,
}

impl Future for NextTiming {
    type Output = Result<(), WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let clock = this.point.clock.clone();
        match this.state {
            NextState::Done => Poll::Pending,
            NextState::Unregistered => {
                if !clock.is_owner_thread() {
                    this.state = NextState::Done;
                    return Poll::Ready(Err(UsageError::WrongThread.into()));
                }
                if clock.is_dead() {
                    this.state = NextState::Done;
                    return Poll::Ready(Err(UsageError::ClockNotRunning.into()));
                }
                if this.cancel.is_cancelled() {
                    this.state = NextState::Done;
                    return Poll::Ready(Err(WaitError::Cancelled));
                }
                let id = clock.waits().register();
                clock.waits().set_waker(id, cx.waker());
                this.point.core().push(WorkItem::Resolve(id));
                this.state = NextState::Waiting(id);
                Poll::Pending
            }
            NextState::Waiting(id) => {
                if this.cancel.is_cancelled() {
                    clock.waits().release(id);
                    this.state = NextState::Done;
                    return Poll::Ready(Err(WaitError::Cancelled));
                }
                match clock.waits().is_resolved(id) {
                    Some(true) => {
                        clock.waits().release(id);
                        this.state = NextState::Done;
                        Poll::Ready(Ok(()))
                    }
                    Some(false) => {
                        if clock.is_dead() {
                            clock.waits().release(id);
                            this.state = NextState::Done;
                            return Poll::Ready(Err(UsageError::ClockNotRunning.into()));
                        }
                        clock.waits().set_waker(id, cx.waker());
                        Poll::Pending
                    }
                    // Slot vanished underneath us; the clock tore down.
                    None => {
                        this.state = NextState::Done;
                        Poll::Ready(Err(UsageError::ClockNotRunning.into()))
                    }
                }
            }
        }
    }
}

impl Drop for NextTiming {
    fn drop(&mut self) {
        if let NextState::Waiting(id) = self.state {
            self.point.clock.waits().release(id);
        }
    }
}
