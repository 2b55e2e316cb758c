//! # Frame Clock
//!
//! The owner of everything: timing points, the wait pool, the task slab,
//! the render pipeline, and the light registry. One logical thread drives
//! the clock through [`FrameClock::tick`]; all resolution, lifecycle
//! transitions, and buffered-collection applies happen there. A process may
//! run any number of independent clocks; nothing here is global.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;
use tracing::warn;

use cadence_core::{CancelSource, CancelToken, HookError};

use crate::config::{ClockConfig, DeltaMode, SystemTimeSource, TimeSource};
use crate::coroutine::{CoroutineHost, ReservationKey};
use crate::error::{ActivateError, CoroutineError, TickError, UsageError};
use crate::lifecycle::{activate_flow, terminate_flow, LifeState};
use crate::light::{Light, LightRegistry};
use crate::pipeline::{RenderPipeline, Stage};
use crate::point::{PointCore, TimingPoint, TimingPoints, WorkItem};
use crate::policy::ErrorPolicy;
use crate::render::{RenderBackend, RenderContext};
use crate::task::{TaskFuture, TaskSlab};
use crate::timing::{CurrentTiming, FrameTiming};
use crate::waits::WaitPool;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

struct ClockTimes {
    sim: Duration,
    last_real: Duration,
}

pub(crate) struct ClockCore {
    context_id: u64,
    owner_thread: ThreadId,
    policy: ErrorPolicy,
    delta: DeltaMode,
    state: Mutex<LifeState>,
    frame: AtomicU64,
    times: Mutex<ClockTimes>,
    time_source: Mutex<Box<dyn TimeSource>>,
    current: Mutex<CurrentTiming>,
    points: [PointCore; 9],
    waits: WaitPool,
    tasks: TaskSlab,
    reservations: Mutex<HashSet<(u64, ReservationKey)>>,
    pipeline: RenderPipeline,
    lights: LightRegistry,
    running: CancelSource,
    close_requested: AtomicBool,
    frame_errors: Mutex<Vec<HookError>>,
}

/// Handle to one frame clock. Cheap to clone; clones address the same
/// clock.
#[derive(Clone)]
pub struct FrameClock {
    core: Arc<ClockCore>,
}

impl FrameClock {
    /// Creates a clock owned by the calling thread, using the system time
    /// source.
    #[must_use]
    pub fn new(config: &ClockConfig) -> Self {
        Self::with_time_source(config, Box::new(SystemTimeSource::new()))
    }

    /// Creates a clock with an explicit time source (tests, replay).
    #[must_use]
    pub fn with_time_source(config: &ClockConfig, time_source: Box<dyn TimeSource>) -> Self {
        Self {
            core: Arc::new(ClockCore {
                context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                owner_thread: thread::current().id(),
                policy: config.policy,
                delta: config.delta,
                state: Mutex::new(LifeState::New),
                frame: AtomicU64::new(0),
                times: Mutex::new(ClockTimes {
                    sim: Duration::ZERO,
                    last_real: Duration::ZERO,
                }),
                time_source: Mutex::new(time_source),
                current: Mutex::new(CurrentTiming::OutOfLoop),
                points: [
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                    PointCore::new(),
                ],
                waits: WaitPool::with_capacity(config.wait_capacity),
                tasks: TaskSlab::new(),
                reservations: Mutex::new(HashSet::new()),
                pipeline: RenderPipeline::new(),
                lights: LightRegistry::new(),
                running: CancelSource::new(),
                close_requested: AtomicBool::new(false),
                frame_errors: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether two handles address the same clock.
    #[must_use]
    pub fn same(a: &FrameClock, b: &FrameClock) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }

    /// Unique id of this clock within the process.
    #[must_use]
    pub fn context_id(&self) -> u64 {
        self.core.context_id
    }

    /// The clock's error policy, fixed at construction.
    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        self.core.policy
    }

    /// The frame counter. Zero before the first tick; incremented at the
    /// start of each tick.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.core.frame.load(Ordering::Acquire)
    }

    /// Accumulated simulated time.
    #[must_use]
    pub fn sim_time(&self) -> Duration {
        self.core.times.lock().sim
    }

    /// Real elapsed time as reported by the clock's time source.
    #[must_use]
    pub fn real_time(&self) -> Duration {
        self.core.time_source.lock().now()
    }

    /// The clock's own lifecycle state. `Activating` is never used; the
    /// clock goes `New -> Alive` on its first tick.
    #[must_use]
    pub fn life_state(&self) -> LifeState {
        *self.core.state.lock()
    }

    /// Whether the clock still accepts new work (not shutting down).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.life_state() < LifeState::Terminating
    }

    /// Where the loop currently is. Reports out-of-loop from any thread
    /// other than the owner.
    #[must_use]
    pub fn current_timing(&self) -> CurrentTiming {
        if !self.is_owner_thread() {
            return CurrentTiming::OutOfLoop;
        }
        *self.core.current.lock()
    }

    /// The clock's timing points.
    #[must_use]
    pub fn timing_points(&self) -> TimingPoints {
        TimingPoints::new(self.clone())
    }

    /// Token tripped when the clock begins shutting down.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.core.running.token()
    }

    /// Snapshot of the live lights.
    #[must_use]
    pub fn lights(&self) -> Vec<Light> {
        self.core.lights.snapshot()
    }

    /// Number of stages in the pipeline's live view.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.core.pipeline.len()
    }

    /// Number of timing-point waits currently suspended.
    #[must_use]
    pub fn pending_wait_count(&self) -> usize {
        self.core.waits.pending_count()
    }

    /// Number of coroutines currently suspended in the task slab.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.core.tasks.len()
    }

    /// Number of lights in the registry's live view.
    #[must_use]
    pub fn light_count(&self) -> usize {
        self.core.lights.len()
    }

    /// Asks the loop to shut down. At the next `FrameInitializing` the
    /// clock cancels its running token and terminates every stage and
    /// light concurrently; [`FrameClock::tick`] reports `false` once the
    /// teardown has settled.
    pub fn request_close(&self) {
        self.core.close_requested.store(true, Ordering::Release);
    }

    /// Activates `stage` into the pipeline, settling `Alive` after the
    /// next occurrence of `timing` in a following frame.
    ///
    /// # Errors
    ///
    /// See [`SceneObject::activate`](crate::SceneObject::activate); the
    /// same flow runs, against the pipeline.
    pub async fn activate_stage(
        &self,
        stage: Arc<dyn Stage>,
        timing: FrameTiming,
    ) -> Result<(), ActivateError> {
        let point = self.timing_points().get(timing);
        let lifecycle = stage.core().lifecycle().clone();
        let core = Arc::clone(&self.core);
        let register = move || core.pipeline.add(stage);
        activate_flow(point, lifecycle, register).await
    }

    /// Terminates `stage`, cascading over everything it owns.
    ///
    /// # Errors
    ///
    /// The usual lifecycle violations.
    pub async fn terminate_stage(
        &self,
        stage: Arc<dyn Stage>,
        timing: FrameTiming,
    ) -> Result<(), UsageError> {
        let point = self.timing_points().get(timing);
        let lifecycle = stage.core().lifecycle().clone();
        let cascade = stage.cascade(&point);
        let core = Arc::clone(&self.core);
        let deregister = move || core.pipeline.remove(stage);
        terminate_flow(point, lifecycle, deregister, Some(cascade), || {}).await
    }

    /// Advances the clock by one frame, running every timing point in
    /// order. Returns `false` once the loop has fully shut down and no
    /// further ticks are expected.
    ///
    /// # Errors
    ///
    /// [`TickError::Usage`] off the owning thread, and
    /// [`TickError::HookFailures`] under the strict policy when user hooks
    /// failed during the frame.
    pub fn tick(&self, backend: &mut dyn RenderBackend) -> Result<bool, TickError> {
        let core = &self.core;
        if !self.is_owner_thread() {
            return Err(UsageError::WrongThread.into());
        }
        if self.is_dead() {
            return Ok(false);
        }

        let frame = core.frame.fetch_add(1, Ordering::AcqRel) + 1;
        self.advance_time();
        {
            let mut state = core.state.lock();
            if *state == LifeState::New {
                *state = LifeState::Alive;
                drop(state);
                info!(context = core.context_id, "frame loop started");
            }
        }

        // FrameInitializing: shutdown check, buffered adds, then the phase.
        if core.close_requested.load(Ordering::Acquire) && self.life_state() == LifeState::Alive {
            self.begin_shutdown();
        }
        core.pipeline.apply_add();
        core.lights.apply_add();
        self.run_point(FrameTiming::FrameInitializing);

        self.run_point(FrameTiming::EarlyUpdate);
        core.pipeline.early_update();

        self.run_point(FrameTiming::Update);
        core.pipeline.update();

        self.run_point(FrameTiming::LateUpdate);
        core.pipeline.late_update();

        backend.clear();
        self.run_point(FrameTiming::BeforeRendering);

        self.run_point(FrameTiming::Rendering);
        {
            let lights = core.lights.snapshot();
            let mut ctx = RenderContext::new(backend, self, lights);
            core.pipeline.render(&mut ctx);
        }

        self.run_point(FrameTiming::AfterRendering);

        self.run_point(FrameTiming::FrameFinalizing);
        core.pipeline.apply_remove();
        core.lights.apply_remove();

        self.run_point(FrameTiming::EndOfFrame);

        *core.current.lock() = CurrentTiming::OutOfLoop;

        if self.is_dead() {
            self.release_everything();
            info!(context = core.context_id, frame, "frame loop stopped");
            return Ok(false);
        }

        let errors = std::mem::take(&mut *core.frame_errors.lock());
        if errors.is_empty() {
            Ok(true)
        } else {
            Err(TickError::HookFailures { frame, errors })
        }
    }

    fn advance_time(&self) {
        let real = self.real_time();
        let mut times = self.core.times.lock();
        match self.core.delta {
            DeltaMode::Fixed { seconds } => {
                times.sim += Duration::from_secs_f64(seconds);
            }
            DeltaMode::Measured => {
                let last_real = times.last_real;
                times.sim += real.saturating_sub(last_real);
            }
        }
        times.last_real = real;
    }

    /// Runs one timing point: listeners first, then a snapshot of the
    /// one-shot queue, then every coroutine the drain woke. The snapshot is
    /// taken before the listeners run, so anything queued for this same
    /// point during the phase, by a listener or by the drain, lands in the
    /// next frame.
    fn run_point(&self, timing: FrameTiming) {
        let core = &self.core;
        *core.current.lock() = CurrentTiming::At(timing);
        let point = &core.points[timing.index()];
        let queue = point.take_queue();
        for error in point.listeners().raise(&timing) {
            self.report_user_error("timing listener", error);
        }
        for item in queue {
            match item {
                WorkItem::Callback(callback) => callback(),
                WorkItem::Resolve(id) => core.waits.resolve(id),
            }
        }
        self.run_ready();
    }

    fn run_ready(&self) {
        while let Some(id) = self.core.tasks.next_ready() {
            if let Some(result) = self.core.tasks.poll(id) {
                self.handle_task_result(result);
            }
        }
    }

    fn handle_task_result(&self, result: Result<(), CoroutineError>) {
        match result {
            Ok(()) | Err(CoroutineError::Cancelled) => {}
            Err(error) => self.report_user_error("coroutine", Box::new(error)),
        }
    }

    /// Cancels the running token and spawns the concurrent teardown of
    /// every stage and light. The clock settles `Dead` when the teardown
    /// task completes.
    fn begin_shutdown(&self) {
        *self.core.state.lock() = LifeState::Terminating;
        self.core.running.cancel();
        info!(context = self.core.context_id, "frame loop terminating");

        let clock = self.clone();
        self.spawn(Box::pin(async move {
            let stages = clock.core.pipeline.snapshot();
            let lights = clock.core.lights.snapshot();
            let point = clock.timing_points().update();

            let stage_branches: Vec<_> = stages
                .into_iter()
                .map(|stage| {
                    let clock = clock.clone();
                    async move {
                        if let Err(error) = clock.terminate_stage(stage, FrameTiming::Update).await
                        {
                            warn!(context = clock.core.context_id, %error, "stage teardown skipped");
                        }
                    }
                })
                .collect();
            let light_branches: Vec<_> = lights
                .into_iter()
                .map(|light| {
                    let point = point.clone();
                    async move {
                        let _ = light.terminate(&point).await;
                    }
                })
                .collect();
            let _ = futures::future::join_all(stage_branches).await;
            let _ = futures::future::join_all(light_branches).await;

            *clock.core.state.lock() = LifeState::Dead;
            Ok(())
        }));
    }

    /// Drops every queue, task, and collection after the loop has settled
    /// `Dead`.
    fn release_everything(&self) {
        let core = &self.core;
        core.tasks.clear();
        for point in &core.points {
            point.clear();
        }
        core.pipeline.clear();
        core.lights.clear();
        core.reservations.lock().clear();
        core.frame_errors.lock().clear();
    }

    /// Routes one user-code error through the clock's policy: swallow logs
    /// it, strict collects it for the tick result.
    pub(crate) fn report_user_error(&self, scope: &'static str, error: HookError) {
        match self.core.policy {
            ErrorPolicy::Swallow => {
                warn!(context = self.core.context_id, scope, %error, "user hook error swallowed");
            }
            ErrorPolicy::Strict => self.core.frame_errors.lock().push(error),
        }
    }

    pub(crate) fn spawn(&self, task: TaskFuture) {
        let id = self.core.tasks.insert(task);
        if let Some(result) = self.core.tasks.poll(id) {
            self.handle_task_result(result);
        }
    }

    pub(crate) fn point_core(&self, timing: FrameTiming) -> &PointCore {
        &self.core.points[timing.index()]
    }

    pub(crate) fn end_of_frame(&self) -> TimingPoint {
        TimingPoint::new(self.clone(), FrameTiming::EndOfFrame)
    }

    pub(crate) fn waits(&self) -> &WaitPool {
        &self.core.waits
    }

    pub(crate) fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.core.owner_thread
    }

    pub(crate) fn ensure_owner_thread(&self) -> Result<(), UsageError> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(UsageError::WrongThread)
        }
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.life_state() == LifeState::Dead
    }

    pub(crate) fn accepts_work(&self) -> bool {
        self.life_state() < LifeState::Terminating
    }

    pub(crate) fn try_reserve(&self, scope: u64, key: ReservationKey) -> bool {
        self.core.reservations.lock().insert((scope, key))
    }

    pub(crate) fn release_reservation(&self, scope: u64, key: ReservationKey) {
        let _ = self.core.reservations.lock().remove(&(scope, key));
    }

    pub(crate) fn add_light(&self, light: Light) {
        self.core.lights.add(light);
    }

    pub(crate) fn remove_light(&self, light: Light) {
        self.core.lights.remove(light);
    }
}

impl CoroutineHost for FrameClock {
    fn host_clock(&self) -> Option<FrameClock> {
        Some(self.clone())
    }

    fn host_life_state(&self) -> LifeState {
        self.life_state()
    }

    fn host_cancel_token(&self) -> CancelToken {
        self.core.running.token()
    }

    fn host_scope_id(&self) -> u64 {
        self.core.context_id
    }
}
