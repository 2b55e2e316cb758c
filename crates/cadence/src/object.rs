//! # Scene Objects
//!
//! The leaf entities of the frame loop. A scene object lives inside an
//! [`ObjectLayer`](crate::ObjectLayer), exposes per-phase update events,
//! and may own child objects: children attach to exactly one parent, are
//! only ever terminated through the parent's cascade, and render through
//! their parent.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use cadence_core::{CancelToken, EventSource, HookResult, SubscriptionId};

use crate::error::{ActivateError, UsageError};
use crate::layer::ObjectLayer;
use crate::lifecycle::{activate_flow, terminate_flow, HookFuture, LifeState, Lifecycle};
use crate::point::TimingPoint;
use crate::render::RenderContext;

type RenderFn = Box<dyn for<'a> Fn(&SceneObject, &mut RenderContext<'a>) + Send + Sync>;

/// A frame-loop entity living in an object layer. Cheap to clone; clones
/// address the same object.
#[derive(Clone)]
pub struct SceneObject {
    inner: Arc<ObjectInner>,
}

pub(crate) struct ObjectInner {
    lifecycle: Lifecycle,
    name: Mutex<String>,
    frozen: AtomicBool,
    parent: Mutex<Weak<ObjectInner>>,
    children: Mutex<Vec<SceneObject>>,
    layer: Mutex<Option<ObjectLayer>>,
    early_updated: EventSource<SceneObject>,
    updated: EventSource<SceneObject>,
    late_updated: EventSource<SceneObject>,
    renderer: Mutex<Option<RenderFn>>,
}

pub(crate) fn object_eq(a: &SceneObject, b: &SceneObject) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
}

impl SceneObject {
    /// Creates an object in the `New` state.
    #[must_use]
    pub fn new() -> Self {
        Self::named("")
    }

    /// Creates an object with a debug name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                lifecycle: Lifecycle::new(),
                name: Mutex::new(name.into()),
                frozen: AtomicBool::new(false),
                parent: Mutex::new(Weak::new()),
                children: Mutex::new(Vec::new()),
                layer: Mutex::new(None),
                early_updated: EventSource::new(),
                updated: EventSource::new(),
                late_updated: EventSource::new(),
                renderer: Mutex::new(None),
            }),
        }
    }

    /// The object's debug name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.name.lock().clone()
    }

    /// Sets the debug name.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.lock() = name.into();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifeState {
        self.inner.lifecycle.state()
    }

    /// Token tripped when this object enters `Terminating`. Coroutines
    /// scoped to the object wait with it.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.lifecycle.running_token()
    }

    /// Whether update events are currently skipped for this object.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Freezes or unfreezes the object. A frozen object stays alive and
    /// renders, but its update events do not fire.
    pub fn set_frozen(&self, frozen: bool) {
        self.inner.frozen.store(frozen, Ordering::Release);
    }

    /// The object's parent, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<SceneObject> {
        self.inner
            .parent
            .lock()
            .upgrade()
            .map(|inner| SceneObject { inner })
    }

    /// Whether the object has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.parent.lock().upgrade().is_none()
    }

    /// Snapshot of the object's children.
    #[must_use]
    pub fn children(&self) -> Vec<SceneObject> {
        self.inner.children.lock().clone()
    }

    /// The layer the object was activated into, if any.
    #[must_use]
    pub fn layer(&self) -> Option<ObjectLayer> {
        self.inner.layer.lock().clone()
    }

    /// Attaches `child` to this object.
    ///
    /// # Errors
    ///
    /// [`UsageError::AlreadyHasParent`] when the child is attached
    /// elsewhere (or to this object already), and
    /// [`UsageError::AlreadyTerminated`] when either side has started
    /// terminating.
    pub fn add_child(&self, child: &SceneObject) -> Result<(), UsageError> {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            return Err(UsageError::AlreadyHasParent);
        }
        if self.state() >= LifeState::Terminating || child.state() >= LifeState::Terminating {
            return Err(UsageError::AlreadyTerminated);
        }
        {
            let mut parent = child.inner.parent.lock();
            if parent.upgrade().is_some() {
                return Err(UsageError::AlreadyHasParent);
            }
            *parent = Arc::downgrade(&self.inner);
        }
        self.inner.children.lock().push(child.clone());
        Ok(())
    }

    /// Registers a hook run once during activation. May suspend across
    /// frames.
    pub fn on_activating<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.inner
            .lifecycle
            .push_activating(Box::new(move || Box::pin(hook()) as HookFuture));
    }

    /// Registers a best-effort hook run once during termination.
    pub fn on_terminating<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.inner
            .lifecycle
            .push_terminating(Box::new(move || Box::pin(hook()) as HookFuture));
    }

    /// Subscribes to the object settling `Alive`.
    pub fn subscribe_alive(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.lifecycle.subscribe_alive(listener)
    }

    /// Subscribes to the object settling `Dead`.
    pub fn subscribe_dead(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.lifecycle.subscribe_dead(listener)
    }

    /// Subscribes to the `EarlyUpdate` phase for this object.
    pub fn subscribe_early_update(
        &self,
        listener: impl Fn(&SceneObject) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.early_updated.subscribe(listener)
    }

    /// Subscribes to the `Update` phase for this object.
    pub fn subscribe_update(
        &self,
        listener: impl Fn(&SceneObject) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.updated.subscribe(listener)
    }

    /// Subscribes to the `LateUpdate` phase for this object.
    pub fn subscribe_late_update(
        &self,
        listener: impl Fn(&SceneObject) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.late_updated.subscribe(listener)
    }

    /// Installs the object's render function, invoked during `Rendering`
    /// for the object and, recursively, under its root ancestor.
    pub fn set_renderer(
        &self,
        renderer: impl for<'a> Fn(&SceneObject, &mut RenderContext<'a>) + Send + Sync + 'static,
    ) {
        *self.inner.renderer.lock() = Some(Box::new(renderer));
    }

    /// Activates the object into `layer`, settling `Alive` after the next
    /// occurrence of `timing` in a following frame.
    ///
    /// # Errors
    ///
    /// [`ActivateError::Usage`] on contract violations (layer not
    /// activated, mismatched clock, already activated), and
    /// [`ActivateError::Hook`] / [`ActivateError::RolledBack`] when the
    /// activating hook fails.
    pub async fn activate(
        &self,
        layer: &ObjectLayer,
        timing: &TimingPoint,
    ) -> Result<(), ActivateError> {
        let layer_clock = layer.clock().ok_or(UsageError::NotActivated)?;
        if !crate::clock::FrameClock::same(&layer_clock, timing.clock()) {
            return Err(UsageError::ContextMismatch.into());
        }
        let this = self.clone();
        let layer = layer.clone();
        let register = move || {
            *this.inner.layer.lock() = Some(layer.clone());
            layer.add_object(this);
        };
        activate_flow(timing.clone(), self.inner.lifecycle.clone(), register).await
    }

    /// Terminates the object and, concurrently, its whole subtree.
    ///
    /// # Errors
    ///
    /// [`UsageError::NotRoot`] when the object has a parent (only the
    /// parent's cascade may reach it), plus the usual lifecycle violations.
    pub async fn terminate(&self, timing: &TimingPoint) -> Result<(), UsageError> {
        if !self.is_root() {
            return Err(UsageError::NotRoot);
        }
        let cascade = self.children_cascade(timing);
        let this = self.clone();
        let deregister = move || this.deregister();
        let this = self.clone();
        let on_dead = move || this.release();
        terminate_flow(
            timing.clone(),
            self.inner.lifecycle.clone(),
            deregister,
            Some(cascade),
            on_dead,
        )
        .await
    }

    /// Fan-out termination over the object's children, one branch per
    /// subtree, joined concurrently. Branch failures are isolated.
    fn children_cascade(&self, timing: &TimingPoint) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let branches: Vec<_> = self
            .children()
            .into_iter()
            .map(|child| child.subtree_terminate(timing.clone()))
            .collect();
        Box::pin(async move {
            let _ = futures::future::join_all(branches).await;
        })
    }

    /// Terminates this node and its subtree from a parent's cascade,
    /// bypassing the root check.
    fn subtree_terminate(self, timing: TimingPoint) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let cascade = self.children_cascade(&timing);
            let this = self.clone();
            let deregister = move || this.deregister();
            let this = self.clone();
            let on_dead = move || this.release();
            let result = terminate_flow(
                timing.clone(),
                self.inner.lifecycle.clone(),
                deregister,
                Some(cascade),
                on_dead,
            )
            .await;
            if let Err(error) = result {
                debug!(object = %self.name(), %error, "subtree branch skipped");
            }
        })
    }

    /// Buffers removal from the owning layer.
    fn deregister(&self) {
        if let Some(layer) = self.layer() {
            layer.remove_object(self.clone());
        }
    }

    /// Final cleanup once `Dead`: detach from the parent and drop owned
    /// storage.
    fn release(&self) {
        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .lock()
                .retain(|child| !object_eq(child, self));
        }
        *self.inner.parent.lock() = Weak::new();
        *self.inner.children.lock() = Vec::new();
        *self.inner.layer.lock() = None;
        *self.inner.renderer.lock() = None;
        self.inner.early_updated.clear();
        self.inner.updated.clear();
        self.inner.late_updated.clear();
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    pub(crate) fn raise_early_update(&self) -> Vec<cadence_core::HookError> {
        self.inner.early_updated.raise(self)
    }

    pub(crate) fn raise_update(&self) -> Vec<cadence_core::HookError> {
        self.inner.updated.raise(self)
    }

    pub(crate) fn raise_late_update(&self) -> Vec<cadence_core::HookError> {
        self.inner.late_updated.raise(self)
    }

    /// Renders this object and its children, depth-first.
    pub(crate) fn render_recursive(&self, ctx: &mut RenderContext<'_>) {
        if let Some(renderer) = &*self.inner.renderer.lock() {
            renderer(self, ctx);
        }
        for child in self.children() {
            child.render_recursive(ctx);
        }
    }
}

impl Default for SceneObject {
    fn default() -> Self {
        Self::new()
    }
}
