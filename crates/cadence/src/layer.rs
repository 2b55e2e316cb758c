//! # Object Layers
//!
//! The built-in pipeline stage: a buffered collection of scene objects
//! fanned out per phase. Objects become visible at `FrameInitializing`'s
//! apply step and leave at `FrameFinalizing`'s, so each phase iterates a
//! stable working set.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cadence_core::BufferedList;

use crate::clock::FrameClock;
use crate::lifecycle::LifeState;
use crate::object::{object_eq, SceneObject};
use crate::pipeline::{ApplyStep, Stage, StageCore};
use crate::point::TimingPoint;
use crate::render::RenderContext;

/// A pipeline stage holding scene objects. Cheap to clone; clones address
/// the same layer.
#[derive(Clone)]
pub struct ObjectLayer {
    inner: Arc<LayerInner>,
}

struct LayerInner {
    core: StageCore,
    objects: BufferedList<SceneObject>,
}

impl ObjectLayer {
    /// Creates a layer with the given pipeline sort number.
    #[must_use]
    pub fn new(sort_number: i32) -> Self {
        Self {
            inner: Arc::new(LayerInner {
                core: StageCore::new(sort_number),
                objects: BufferedList::new(object_eq),
            }),
        }
    }

    /// The layer's stage core (lifecycle, sort number, enabled flag).
    #[must_use]
    pub fn stage_core(&self) -> &StageCore {
        &self.inner.core
    }

    /// The clock this layer was activated on, if any.
    #[must_use]
    pub fn clock(&self) -> Option<FrameClock> {
        self.inner.core.lifecycle().clock()
    }

    /// Number of objects in the live view.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner.objects.len()
    }

    /// Snapshot of the live objects.
    #[must_use]
    pub fn objects(&self) -> Vec<SceneObject> {
        self.inner.objects.snapshot()
    }

    pub(crate) fn add_object(&self, object: SceneObject) {
        self.inner
            .objects
            .add(object, |object| object.lifecycle().settle_alive());
    }

    pub(crate) fn remove_object(&self, object: SceneObject) {
        self.inner.objects.remove(object, |_| {});
    }

    fn for_each_runnable(&self, mut f: impl FnMut(&SceneObject)) {
        for object in self.inner.objects.snapshot() {
            if object.state() == LifeState::Alive && !object.is_frozen() {
                f(&object);
            }
        }
    }

    fn report(&self, scope: &'static str, errors: Vec<cadence_core::HookError>) {
        if let Some(clock) = self.clock() {
            for error in errors {
                clock.report_user_error(scope, error);
            }
        }
    }
}

impl Stage for ObjectLayer {
    fn core(&self) -> &StageCore {
        &self.inner.core
    }

    fn on_execute(&self, ctx: &mut RenderContext<'_>) {
        // Children render through their root ancestor.
        for object in self.inner.objects.snapshot() {
            if object.state() == LifeState::Alive && object.is_root() {
                object.render_recursive(ctx);
            }
        }
    }

    fn early_update(&self) {
        self.for_each_runnable(|object| {
            let errors = object.raise_early_update();
            self.report("early update", errors);
        });
    }

    fn update(&self) {
        self.for_each_runnable(|object| {
            let errors = object.raise_update();
            self.report("update", errors);
        });
    }

    fn late_update(&self) {
        self.for_each_runnable(|object| {
            let errors = object.raise_late_update();
            self.report("late update", errors);
        });
    }

    fn apply_members(&self, step: ApplyStep) {
        match step {
            ApplyStep::Add => {
                let _ = self.inner.objects.apply_add();
            }
            ApplyStep::Remove => {
                let _ = self.inner.objects.apply_remove();
            }
        }
    }

    fn cascade(&self, timing: &TimingPoint) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let roots: Vec<SceneObject> = self
            .inner
            .objects
            .snapshot()
            .into_iter()
            .filter(SceneObject::is_root)
            .collect();
        let timing = timing.clone();
        Box::pin(async move {
            let branches: Vec<_> = roots
                .into_iter()
                .map(|object| {
                    let timing = timing.clone();
                    async move {
                        // Branch failures stay in their branch.
                        let _ = object.terminate(&timing).await;
                    }
                })
                .collect();
            let _ = futures::future::join_all(branches).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_layer_is_empty_and_new() {
        let layer = ObjectLayer::new(10);
        assert_eq!(layer.object_count(), 0);
        assert_eq!(layer.stage_core().state(), LifeState::New);
        assert_eq!(layer.stage_core().sort_number(), 10);
        assert!(layer.clock().is_none());
    }

    #[test]
    fn test_added_object_invisible_until_apply() {
        let layer = ObjectLayer::new(0);
        let object = SceneObject::new();
        layer.add_object(object);
        assert_eq!(layer.object_count(), 0);
        layer.apply_members(ApplyStep::Add);
        assert_eq!(layer.object_count(), 1);
    }
}
