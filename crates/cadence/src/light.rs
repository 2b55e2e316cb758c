//! # Lights
//!
//! Lights are lifecycle entities living in the clock's own registry rather
//! than in a layer. Stages read a stable per-frame snapshot of them during
//! `Rendering`.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use cadence_core::{BufferedList, HookResult, SubscriptionId};

use crate::error::{ActivateError, UsageError};
use crate::lifecycle::{activate_flow, terminate_flow, HookFuture, LifeState, Lifecycle};
use crate::point::TimingPoint;

/// A light in the frame loop. Cheap to clone; clones address the same
/// light.
#[derive(Clone)]
pub struct Light {
    inner: Arc<LightInner>,
}

struct LightInner {
    lifecycle: Lifecycle,
    color: Mutex<[f32; 4]>,
    position: Mutex<[f32; 4]>,
}

fn light_eq(a: &Light, b: &Light) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
}

impl Light {
    /// Creates a white light at the origin, in the `New` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LightInner {
                lifecycle: Lifecycle::new(),
                color: Mutex::new([1.0, 1.0, 1.0, 1.0]),
                position: Mutex::new([0.0, 0.0, 0.0, 1.0]),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifeState {
        self.inner.lifecycle.state()
    }

    /// RGBA color.
    #[must_use]
    pub fn color(&self) -> [f32; 4] {
        *self.inner.color.lock()
    }

    /// Sets the RGBA color.
    pub fn set_color(&self, color: [f32; 4]) {
        *self.inner.color.lock() = color;
    }

    /// Homogeneous position; `w == 0` is a directional light.
    #[must_use]
    pub fn position(&self) -> [f32; 4] {
        *self.inner.position.lock()
    }

    /// Sets the homogeneous position.
    pub fn set_position(&self, position: [f32; 4]) {
        *self.inner.position.lock() = position;
    }

    /// Registers a hook run once during activation.
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

    /// Subscribes to the light settling `Dead`.
    pub fn subscribe_dead(
        &self,
        listener: impl Fn(&()) -> HookResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.lifecycle.subscribe_dead(listener)
    }

    /// Activates the light into its clock's registry.
    ///
    /// # Errors
    ///
    /// See [`SceneObject::activate`](crate::SceneObject::activate); the
    /// same flow runs, against the clock's light registry.
    pub async fn activate(&self, timing: &TimingPoint) -> Result<(), ActivateError> {
        let clock = timing.clock().clone();
        let this = self.clone();
        let register = move || clock.add_light(this);
        activate_flow(timing.clone(), self.inner.lifecycle.clone(), register).await
    }

    /// Terminates the light.
    ///
    /// # Errors
    ///
    /// The usual lifecycle violations ([`UsageError::NotActivated`],
    /// [`UsageError::AlreadyTerminated`]).
    pub async fn terminate(&self, timing: &TimingPoint) -> Result<(), UsageError> {
        let clock = timing.clock().clone();
        let this = self.clone();
        let deregister = move || clock.remove_light(this);
        terminate_flow(
            timing.clone(),
            self.inner.lifecycle.clone(),
            deregister,
            None,
            || {},
        )
        .await
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new()
    }
}

/// The clock's buffered light collection.
pub(crate) struct LightRegistry {
    lights: BufferedList<Light>,
}

impl LightRegistry {
    pub(crate) fn new() -> Self {
        Self {
            lights: BufferedList::new(light_eq),
        }
    }

    pub(crate) fn add(&self, light: Light) {
        self.lights
            .add(light, |light| light.lifecycle().settle_alive());
    }

    pub(crate) fn remove(&self, light: Light) {
        self.lights.remove(light, |_| {});
    }

    pub(crate) fn snapshot(&self) -> Vec<Light> {
        self.lights.snapshot()
    }

    pub(crate) fn len(&self) -> usize {
        self.lights.len()
    }

    pub(crate) fn apply_add(&self) {
        let _ = self.lights.apply_add();
    }

    pub(crate) fn apply_remove(&self) {
        let _ = self.lights.apply_remove();
    }

    pub(crate) fn clear(&self) {
        self.lights.clear();
    }
}
