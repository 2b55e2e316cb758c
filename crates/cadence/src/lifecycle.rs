//! # Lifecycle State Machine
//!
//! Every schedulable entity (scene objects, object layers, pipeline stages,
//! lights) carries the same five-state machine and moves through it with
//! the same two flows. Activation and termination each straddle at least
//! one full frame boundary, so "becomes visible to the loop" and "stops
//! being visible" always line up with the buffered collections' apply
//! steps, never with mid-phase iteration.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use cadence_core::{CancelSource, CancelToken, EventSource, HookError, HookResult, SubscriptionId};

use crate::clock::FrameClock;
use crate::error::{ActivateError, UsageError, WaitError};
use crate::point::TimingPoint;

/// The lifecycle state of a schedulable entity.
///
/// Strictly ordered by progression; `Dead` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifeState {
    /// Created, never activated.
    New,
    /// The activating hook is running or the first frame boundary is
    /// pending.
    Activating,
    /// Visible to the frame loop.
    Alive,
    /// Termination has begun; the entity's cancellation scope is tripped.
    Terminating,
    /// Fully torn down. No transitions out.
    Dead,
}

/// A boxed asynchronous lifecycle hook body.
pub type HookFuture = Pin<Box<dyn Future<Output = HookResult> + Send>>;

pub(crate) type HookFn = Box<dyn FnOnce() -> HookFuture + Send>;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(0);

/// Shared lifecycle core embedded by every entity kind. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    id: u64,
    state: Mutex<LifeState>,
    running: CancelSource,
    activating: Mutex<Vec<HookFn>>,
    terminating: Mutex<Vec<HookFn>>,
    alive_event: EventSource<()>,
    dead_event: EventSource<()>,
    hook_running: AtomicBool,
    clock: Mutex<Option<FrameClock>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                id: NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(LifeState::New),
                running: CancelSource::new(),
                activating: Mutex::new(Vec::new()),
                terminating: Mutex::new(Vec::new()),
                alive_event: EventSource::new(),
                dead_event: EventSource::new(),
                hook_running: AtomicBool::new(false),
                clock: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn state(&self) -> LifeState {
        *self.inner.state.lock()
    }

    /// Token tripped when the entity enters `Terminating`.
    pub(crate) fn running_token(&self) -> CancelToken {
        self.inner.running.token()
    }

    /// The clock this entity was activated on, if any.
    pub(crate) fn clock(&self) -> Option<FrameClock> {
        self.inner.clock.lock().clone()
    }

    pub(crate) fn push_activating(&self, hook: HookFn) {
        self.inner.activating.lock().push(hook);
    }

    pub(crate) fn push_terminating(&self, hook: HookFn) {
        self.inner.terminating.lock().push(hook);
    }

    pub(crate) fn subscribe_alive(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.alive_event.subscribe(listener)
    }

    pub(crate) fn subscribe_dead(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dead_event.subscribe(listener)
    }

    /// `Activating -> Alive`, fired by the containing collection's apply
    /// step. A no-op when the entity already moved on to termination.
    pub(crate) fn settle_alive(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != LifeState::Activating {
                return;
            }
            *state = LifeState::Alive;
        }
        debug!(entity = self.inner.id, "alive");
        self.report_event_errors("alive listener", self.inner.alive_event.raise(&()));
    }

    fn settle_dead(&self) {
        *self.inner.state.lock() = LifeState::Dead;
        debug!(entity = self.inner.id, "dead");
        self.report_event_errors("dead listener", self.inner.dead_event.raise(&()));
    }

    fn report_event_errors(&self, scope: &'static str, errors: Vec<HookError>) {
        if let Some(clock) = self.clock() {
            for error in errors {
                clock.report_user_error(scope, error);
            }
        } else {
            for error in errors {
                warn!(entity = self.inner.id, scope, error = %error, "listener failed");
            }
        }
    }
}

/// Drives an entity from `New` to `Alive`.
///
/// `register` buffers the entity into its container's collection; the
/// collection's apply step settles the state to `Alive` through
/// [`Lifecycle::settle_alive`]. On hook failure the entity is rolled
/// forward through termination instead, and the policy decides whether the
/// caller sees the original error or a plain rollback marker.
pub(crate) async fn activate_flow(
    timing: TimingPoint,
    lifecycle: Lifecycle,
    register: impl FnOnce() + Send,
) -> Result<(), ActivateError> {
    let clock = timing.clock().clone();
    clock.ensure_owner_thread()?;
    if !clock.accepts_work() {
        return Err(UsageError::ClockNotRunning.into());
    }
    {
        let mut state = lifecycle.inner.state.lock();
        if *state != LifeState::New {
            return Err(UsageError::AlreadyActivated.into());
        }
        *state = LifeState::Activating;
    }
    *lifecycle.inner.clock.lock() = Some(clock.clone());
    debug!(entity = lifecycle.id(), "activating");

    let hooks = std::mem::take(&mut *lifecycle.inner.activating.lock());
    lifecycle.inner.hook_running.store(true, Ordering::SeqCst);
    let mut hook_error = None;
    for hook in hooks {
        if let Err(error) = hook().await {
            hook_error = Some(error);
            break;
        }
    }
    lifecycle.inner.hook_running.store(false, Ordering::SeqCst);

    if let Some(error) = hook_error {
        let teardown_error = roll_back(&timing, &lifecycle).await;
        return match clock.policy() {
            crate::policy::ErrorPolicy::Strict => Err(ActivateError::Hook {
                error,
                teardown_error,
            }),
            crate::policy::ErrorPolicy::Swallow => {
                warn!(entity = lifecycle.id(), error = %error, "activating hook failed, entity rolled back");
                Err(ActivateError::RolledBack)
            }
        };
    }

    register();
    match timing.next_frame_with(lifecycle.running_token()).await {
        // Cancellation here means the entity was terminated while settling
        // in; registration already happened, so the flow itself succeeded.
        Ok(()) | Err(WaitError::Cancelled) => Ok(()),
        Err(WaitError::Usage(usage)) => Err(usage.into()),
    }
}

/// Tears an entity that failed activation forward to `Dead` without it ever
/// having been registered. Returns the first teardown error, if any.
async fn roll_back(timing: &TimingPoint, lifecycle: &Lifecycle) -> Option<HookError> {
    *lifecycle.inner.state.lock() = LifeState::Terminating;
    lifecycle.inner.running.cancel();
    let mut first_error = None;
    let hooks = std::mem::take(&mut *lifecycle.inner.terminating.lock());
    for hook in hooks {
        if let Err(error) = hook().await {
            warn!(entity = lifecycle.id(), error = %error, "terminating hook failed");
            if first_error.is_none() {
                first_error = Some(error);
            }
        }
    }
    if !timing.clock().is_dead() {
        let _ = timing.next_frame_with(CancelToken::never()).await;
    }
    lifecycle.settle_dead();
    first_error
}

/// Drives an entity from `Alive` (or settled `Activating`) to `Dead`.
///
/// `deregister` buffers the entity's removal from its container; `cascade`
/// tears down anything the entity owns and is awaited before the entity's
/// own terminating hooks; `on_dead` runs last, after the state is `Dead`.
/// Terminating-hook errors are always logged and swallowed so the entity
/// still reaches `Dead`.
pub(crate) async fn terminate_flow(
    timing: TimingPoint,
    lifecycle: Lifecycle,
    deregister: impl FnOnce() + Send,
    cascade: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    on_dead: impl FnOnce() + Send,
) -> Result<(), UsageError> {
    let clock = timing.clock().clone();
    clock.ensure_owner_thread()?;
    if let Some(owner) = lifecycle.clock() {
        if !FrameClock::same(&owner, &clock) {
            return Err(UsageError::ContextMismatch);
        }
    }
    {
        let mut state = lifecycle.inner.state.lock();
        match *state {
            LifeState::New => return Err(UsageError::NotActivated),
            LifeState::Terminating | LifeState::Dead => {
                return Err(UsageError::AlreadyTerminated);
            }
            LifeState::Activating if lifecycle.inner.hook_running.load(Ordering::SeqCst) => {
                return Err(UsageError::ActivationInProgress);
            }
            LifeState::Activating | LifeState::Alive => *state = LifeState::Terminating,
        }
    }
    debug!(entity = lifecycle.id(), "terminating");
    lifecycle.inner.running.cancel();
    deregister();

    if let Some(cascade) = cascade {
        cascade.await;
    }
    let hooks = std::mem::take(&mut *lifecycle.inner.terminating.lock());
    for hook in hooks {
        if let Err(error) = hook().await {
            warn!(entity = lifecycle.id(), error = %error, "terminating hook failed");
        }
    }
    if !clock.is_dead() {
        let _ = timing.next_frame_with(CancelToken::never()).await;
    }
    lifecycle.settle_dead();
    on_dead();
    Ok(())
}
