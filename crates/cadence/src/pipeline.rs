//! # Render Pipeline
//!
//! Stages are the coarse units the clock drives each frame: sorted by a
//! fixed sort number, activated and terminated through the shared lifecycle
//! flows, executed during `Rendering`. The built-in stage kind is
//! [`ObjectLayer`](crate::ObjectLayer); hosts add their own by implementing
//! [`Stage`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cadence_core::{BufferedList, HookResult, SubscriptionId};

use crate::lifecycle::{HookFuture, LifeState, Lifecycle};
use crate::point::TimingPoint;
use crate::render::RenderContext;

/// Which buffered-mutation step a stage should apply to its own member
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    /// Merge buffered additions (runs at `FrameInitializing`).
    Add,
    /// Apply buffered removals (runs at `FrameFinalizing`).
    Remove,
}

/// One pass of the render pipeline.
///
/// Implementations embed a [`StageCore`] and return it from
/// [`Stage::core`]; the clock uses it for ordering, enabling, and the
/// lifecycle flows. All other methods are phase hooks with no-op defaults.
pub trait Stage: Send + Sync + 'static {
    /// The shared per-stage state.
    fn core(&self) -> &StageCore;

    /// Executes the stage during the `Rendering` phase.
    fn on_execute(&self, ctx: &mut RenderContext<'_>);

    /// Runs during `EarlyUpdate`, after the phase's listeners and queue.
    fn early_update(&self) {}

    /// Runs during `Update`.
    fn update(&self) {}

    /// Runs during `LateUpdate`.
    fn late_update(&self) {}

    /// Applies one buffered-mutation step to member collections the stage
    /// owns.
    fn apply_members(&self, step: ApplyStep) {
        let _ = step;
    }

    /// Tears down everything the stage owns, before the stage's own
    /// terminating hooks run. Branch failures must be isolated inside the
    /// returned future.
    fn cascade(&self, timing: &TimingPoint) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let _ = timing;
        Box::pin(async {})
    }
}

type PostFn = Box<dyn for<'a> FnOnce(&mut RenderContext<'a>) + Send>;

/// Per-stage state shared by every [`Stage`] implementation.
pub struct StageCore {
    lifecycle: Lifecycle,
    sort_number: i32,
    enabled: AtomicBool,
    before: Mutex<Vec<PostFn>>,
    after: Mutex<Vec<PostFn>>,
}

impl StageCore {
    /// Creates a core with the given pipeline sort number. Lower numbers
    /// execute first; ties keep insertion order.
    #[must_use]
    pub fn new(sort_number: i32) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            sort_number,
            enabled: AtomicBool::new(true),
            before: Mutex::new(Vec::new()),
            after: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The stage's pipeline sort number.
    #[inline]
    #[must_use]
    pub fn sort_number(&self) -> i32 {
        self.sort_number
    }

    /// The stage's lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifeState {
        self.lifecycle.state()
    }

    /// Whether the stage executes. A disabled stage stays in the pipeline
    /// but is skipped by every phase fan-out.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the stage.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Registers a hook run once when the stage activates.
    pub fn on_activating<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.lifecycle
            .push_activating(Box::new(move || Box::pin(hook()) as HookFuture));
    }

    /// Registers a best-effort hook run once when the stage terminates.
    pub fn on_terminating<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.lifecycle
            .push_terminating(Box::new(move || Box::pin(hook()) as HookFuture));
    }

    /// Subscribes to the stage settling `Alive`.
    pub fn subscribe_alive(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.lifecycle.subscribe_alive(listener)
    }

    /// Subscribes to the stage settling `Dead`.
    pub fn subscribe_dead(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.lifecycle.subscribe_dead(listener)
    }

    /// Queues a one-shot callback to run just before this stage's next
    /// execution.
    pub fn post_before(&self, callback: impl for<'a> FnOnce(&mut RenderContext<'a>) + Send + 'static) {
        self.before.lock().push(Box::new(callback));
    }

    /// Queues a one-shot callback to run just after this stage's next
    /// execution.
    pub fn post_after(&self, callback: impl for<'a> FnOnce(&mut RenderContext<'a>) + Send + 'static) {
        self.after.lock().push(Box::new(callback));
    }

    fn drain_before(&self) -> Vec<PostFn> {
        std::mem::take(&mut *self.before.lock())
    }

    fn drain_after(&self) -> Vec<PostFn> {
        std::mem::take(&mut *self.after.lock())
    }
}

fn stage_eq(a: &Arc<dyn Stage>, b: &Arc<dyn Stage>) -> bool {
    std::ptr::eq(a.core(), b.core())
}

fn stage_sort(stage: &Arc<dyn Stage>) -> i64 {
    i64::from(stage.core().sort_number())
}

/// The clock's ordered stage list.
pub(crate) struct RenderPipeline {
    stages: BufferedList<Arc<dyn Stage>>,
}

impl RenderPipeline {
    pub(crate) fn new() -> Self {
        Self {
            stages: BufferedList::new(stage_eq).with_sort_key(stage_sort),
        }
    }

    pub(crate) fn add(&self, stage: Arc<dyn Stage>) {
        self.stages
            .add(stage, |stage| stage.core().lifecycle().settle_alive());
    }

    pub(crate) fn remove(&self, stage: Arc<dyn Stage>) {
        self.stages.remove(stage, |_| {});
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Stage>> {
        self.stages.snapshot()
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    /// Merges buffered stage additions, then lets every live stage apply
    /// its own member additions.
    pub(crate) fn apply_add(&self) {
        let _ = self.stages.apply_add();
        for stage in self.stages.snapshot() {
            stage.apply_members(ApplyStep::Add);
        }
    }

    /// Lets every live stage apply its member removals, then applies
    /// buffered stage removals.
    pub(crate) fn apply_remove(&self) {
        for stage in self.stages.snapshot() {
            stage.apply_members(ApplyStep::Remove);
        }
        let _ = self.stages.apply_remove();
    }

    fn for_each_runnable(&self, mut f: impl FnMut(&Arc<dyn Stage>)) {
        for stage in self.stages.snapshot() {
            let core = stage.core();
            if core.is_enabled() && core.state() == LifeState::Alive {
                f(&stage);
            }
        }
    }

    pub(crate) fn early_update(&self) {
        self.for_each_runnable(|stage| stage.early_update());
    }

    pub(crate) fn update(&self) {
        self.for_each_runnable(|stage| stage.update());
    }

    pub(crate) fn late_update(&self) {
        self.for_each_runnable(|stage| stage.late_update());
    }

    pub(crate) fn render(&self, ctx: &mut RenderContext<'_>) {
        self.for_each_runnable(|stage| {
            for callback in stage.core().drain_before() {
                callback(ctx);
            }
            stage.on_execute(ctx);
            for callback in stage.core().drain_after() {
                callback(ctx);
            }
        });
    }

    pub(crate) fn clear(&self) {
        self.stages.clear();
    }
}
