//! # Lifecycle Integration Test
//!
//! Drives scene objects, layers, and lights through the full state
//! machine: the activation round trip, hook failure rollback, terminate
//! races, cascading subtree teardown, and collection visibility timing.

use std::sync::Arc;

use parking_lot::Mutex;

use cadence::{
    ActivateError, ClockConfig, Coroutine, ErrorPolicy, FrameClock, FrameTiming, LifeState, Light,
    NullBackend, ObjectLayer, SceneObject, UsageError,
};

fn run_frames(clock: &FrameClock, backend: &mut NullBackend, frames: usize) {
    for _ in 0..frames {
        assert!(clock.tick(backend).unwrap());
    }
}

/// Activates a fresh layer on the clock and drives one frame so it is
/// Alive before the test body runs.
fn alive_layer(clock: &FrameClock, backend: &mut NullBackend) -> ObjectLayer {
    let layer = ObjectLayer::new(0);
    let stage = layer.clone();
    Coroutine::start(clock, move |co| async move {
        co.clock()
            .activate_stage(Arc::new(stage), FrameTiming::Update)
            .await?;
        Ok(())
    })
    .unwrap();
    run_frames(clock, backend, 1);
    assert_eq!(layer.stage_core().state(), LifeState::Alive);
    layer
}

/// Spawns an activation of `object` into `layer` at Update and records the
/// outcome.
fn spawn_activate(
    clock: &FrameClock,
    object: &SceneObject,
    layer: &ObjectLayer,
) -> Arc<Mutex<Option<Result<(), ActivateError>>>> {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let object = object.clone();
    let layer = layer.clone();
    Coroutine::start(clock, move |co| async move {
        let result = object.activate(&layer, &co.points().update()).await;
        *slot.lock() = Some(result);
        Ok(())
    })
    .unwrap();
    outcome
}

/// Spawns a termination of `object` at Update and records the outcome.
fn spawn_terminate(
    clock: &FrameClock,
    object: &SceneObject,
) -> Arc<Mutex<Option<Result<(), UsageError>>>> {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let object = object.clone();
    Coroutine::start(clock, move |co| async move {
        let result = object.terminate(&co.points().update()).await;
        *slot.lock() = Some(result);
        Ok(())
    })
    .unwrap();
    outcome
}

/// Test: an object walks New, Activating, Alive, Terminating, Dead in that
/// order, with every transition observed exactly once.
#[test]
fn test_state_sequence_over_full_round_trip() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let object = SceneObject::named("traveler");
    assert_eq!(object.state(), LifeState::New);

    let log = Arc::new(Mutex::new(vec![LifeState::New]));
    let seen = Arc::clone(&log);
    let probe = object.clone();
    object.on_activating(move || {
        seen.lock().push(probe.state());
        async { Ok(()) }
    });
    let seen = Arc::clone(&log);
    let probe = object.clone();
    object.subscribe_alive(move |_| {
        seen.lock().push(probe.state());
        Ok(())
    });
    let seen = Arc::clone(&log);
    let probe = object.clone();
    object.on_terminating(move || {
        seen.lock().push(probe.state());
        async { Ok(()) }
    });
    let seen = Arc::clone(&log);
    let probe = object.clone();
    object.subscribe_dead(move |_| {
        seen.lock().push(probe.state());
        Ok(())
    });

    let activated = spawn_activate(&clock, &object, &layer);
    assert_eq!(object.state(), LifeState::Activating);
    run_frames(&clock, &mut backend, 2);
    assert!(matches!(*activated.lock(), Some(Ok(()))));
    assert_eq!(object.state(), LifeState::Alive);

    let terminated = spawn_terminate(&clock, &object);
    run_frames(&clock, &mut backend, 2);
    assert!(matches!(*terminated.lock(), Some(Ok(()))));
    assert_eq!(object.state(), LifeState::Dead);
    assert!(object.layer().is_none());
    assert_eq!(layer.object_count(), 0);

    assert_eq!(
        *log.lock(),
        vec![
            LifeState::New,
            LifeState::Activating,
            LifeState::Alive,
            LifeState::Terminating,
            LifeState::Dead,
        ]
    );
}

/// Test: an object added this frame only becomes visible in the layer at
/// the next frame's apply step, and a removed one stays visible until the
/// frame-finalizing apply step of the frame that terminates it.
#[test]
fn test_membership_visibility_follows_apply_steps() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let object = SceneObject::new();
    spawn_activate(&clock, &object, &layer);
    // Buffered: registered but not yet applied.
    assert_eq!(layer.object_count(), 0);

    let counts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&counts);
    let watched = layer.clone();
    clock.timing_points().update().subscribe(move |_| {
        seen.lock().push(watched.object_count());
        Ok(())
    });

    run_frames(&clock, &mut backend, 2);
    assert_eq!(layer.object_count(), 1);

    spawn_terminate(&clock, &object);
    run_frames(&clock, &mut backend, 2);
    assert_eq!(layer.object_count(), 0);

    // Frames 2 and 3: visible at Update. Frame 4: the removal applied at
    // the previous frame's finalizing step.
    assert_eq!(*counts.lock(), vec![1, 1, 1, 0]);
}

/// Test: terminating while the activating hook is still suspended is
/// rejected without disturbing the activation.
#[test]
fn test_terminate_rejected_during_activating_hook() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let object = SceneObject::new();
    let hook_point = clock.timing_points().update();
    object.on_activating(move || {
        let hook_point = hook_point.clone();
        async move {
            hook_point.next().await?;
            Ok(())
        }
    });

    spawn_activate(&clock, &object, &layer);

    // EarlyUpdate runs before the hook's Update wait resolves, so the hook
    // is still mid-flight when this terminate lands.
    let race = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&race);
    let target = object.clone();
    Coroutine::start(&clock, move |co| async move {
        co.next(FrameTiming::EarlyUpdate).await?;
        *slot.lock() = Some(target.terminate(&co.points().update()).await);
        Ok(())
    })
    .unwrap();

    run_frames(&clock, &mut backend, 3);
    assert!(matches!(
        *race.lock(),
        Some(Err(UsageError::ActivationInProgress))
    ));
    assert_eq!(object.state(), LifeState::Alive);
}

/// Test: a failing activating hook rolls the object back to Dead; the
/// swallow policy reports `RolledBack`, the strict policy surfaces the
/// hook's own error.
#[test]
fn test_activation_hook_failure_rolls_back() {
    let swallow = FrameClock::new(&ClockConfig::default());
    let strict = FrameClock::new(&ClockConfig {
        policy: ErrorPolicy::Strict,
        ..ClockConfig::default()
    });
    let mut swallow_backend = NullBackend::new();
    let mut strict_backend = NullBackend::new();
    let swallow_layer = alive_layer(&swallow, &mut swallow_backend);
    let strict_layer = alive_layer(&strict, &mut strict_backend);

    let cases = [
        (&swallow, &mut swallow_backend, &swallow_layer, false),
        (&strict, &mut strict_backend, &strict_layer, true),
    ];
    for (clock, backend, layer, is_strict) in cases {
        let object = SceneObject::new();
        object.on_activating(|| async { Err("refused".into()) });
        let outcome = spawn_activate(clock, &object, layer);
        run_frames(clock, backend, 3);

        let outcome = outcome.lock();
        match outcome.as_ref() {
            Some(Err(ActivateError::RolledBack)) => assert!(!is_strict),
            Some(Err(ActivateError::Hook { error, .. })) => {
                assert!(is_strict);
                assert_eq!(error.to_string(), "refused");
            }
            other => panic!("unexpected activation outcome: {other:?}"),
        }
        assert_eq!(object.state(), LifeState::Dead);
        assert_eq!(layer.object_count(), 0);
    }
}

/// Test: the second terminate of the same object reports
/// `AlreadyTerminated`, both while the first is in flight and after it is
/// done; terminating a never-activated object reports `NotActivated`.
#[test]
fn test_repeat_terminate_is_rejected() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let object = SceneObject::new();
    spawn_activate(&clock, &object, &layer);
    run_frames(&clock, &mut backend, 2);
    assert_eq!(object.state(), LifeState::Alive);

    let first = spawn_terminate(&clock, &object);
    // The first terminate has already moved the state on its synchronous
    // prefix, so this one fails immediately.
    let second = spawn_terminate(&clock, &object);
    run_frames(&clock, &mut backend, 2);
    assert!(matches!(*first.lock(), Some(Ok(()))));
    assert!(matches!(
        *second.lock(),
        Some(Err(UsageError::AlreadyTerminated))
    ));

    let third = spawn_terminate(&clock, &object);
    run_frames(&clock, &mut backend, 1);
    assert!(matches!(
        *third.lock(),
        Some(Err(UsageError::AlreadyTerminated))
    ));

    let never_activated = SceneObject::new();
    let fourth = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&fourth);
    Coroutine::start(&clock, move |co| async move {
        *slot.lock() = Some(never_activated.terminate(&co.points().update()).await);
        Ok(())
    })
    .unwrap();
    run_frames(&clock, &mut backend, 1);
    assert!(matches!(
        *fourth.lock(),
        Some(Err(UsageError::NotActivated))
    ));
}

/// Test: a terminating hook may register further hooks on its own entity
/// without wedging the flow; termination still settles Dead.
#[test]
fn test_terminating_hook_may_reenter_hook_list() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let object = SceneObject::new();
    spawn_activate(&clock, &object, &layer);
    run_frames(&clock, &mut backend, 2);

    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let reentrant = object.clone();
    object.on_terminating(move || {
        // Late registration: the flow has already taken its hook batch.
        reentrant.on_terminating(|| async { Ok(()) });
        *flag.lock() = true;
        async { Ok(()) }
    });

    let outcome = spawn_terminate(&clock, &object);
    run_frames(&clock, &mut backend, 2);
    assert!(matches!(*outcome.lock(), Some(Ok(()))));
    assert!(*ran.lock());
    assert_eq!(object.state(), LifeState::Dead);
}

/// Test: terminating the root tears down the whole subtree; children reach
/// Dead, each one's terminating hook precedes its own Dead event, and
/// terminating a child directly is rejected.
#[test]
fn test_cascade_terminates_subtree() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let parent = SceneObject::named("parent");
    let left = SceneObject::named("left");
    let right = SceneObject::named("right");
    for object in [&parent, &left, &right] {
        spawn_activate(&clock, object, &layer);
    }
    run_frames(&clock, &mut backend, 2);
    parent.add_child(&left).unwrap();
    parent.add_child(&right).unwrap();
    assert!(!left.is_root());
    assert_eq!(layer.object_count(), 3);

    let log = Arc::new(Mutex::new(Vec::new()));
    for object in [&parent, &left, &right] {
        let seen = Arc::clone(&log);
        let name = object.name();
        object.on_terminating(move || {
            seen.lock().push(format!("hook:{name}"));
            async { Ok(()) }
        });
        let seen = Arc::clone(&log);
        let name = object.name();
        object.subscribe_dead(move |_| {
            seen.lock().push(format!("dead:{name}"));
            Ok(())
        });
    }

    // A child is not a root; only the cascade may reach it.
    let direct = spawn_terminate(&clock, &left);
    run_frames(&clock, &mut backend, 1);
    assert!(matches!(*direct.lock(), Some(Err(UsageError::NotRoot))));

    let outcome = spawn_terminate(&clock, &parent);
    run_frames(&clock, &mut backend, 4);
    assert!(matches!(*outcome.lock(), Some(Ok(()))));

    for object in [&parent, &left, &right] {
        assert_eq!(object.state(), LifeState::Dead);
    }
    assert!(parent.children().is_empty());
    assert!(left.parent().is_none());
    assert_eq!(layer.object_count(), 0);

    let log = log.lock();
    for name in ["parent", "left", "right"] {
        let hook = log.iter().position(|e| e == &format!("hook:{name}"));
        let dead = log.iter().position(|e| e == &format!("dead:{name}"));
        assert!(hook.is_some() && dead.is_some(), "missing events for {name}");
        assert!(hook < dead, "{name} died before its terminating hook");
    }
}

/// Test: an object cannot be attached under two parents or under itself,
/// and cannot be activated twice.
#[test]
fn test_attachment_and_activation_misuse() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();
    let layer = alive_layer(&clock, &mut backend);

    let a = SceneObject::new();
    let b = SceneObject::new();
    let c = SceneObject::new();
    assert!(matches!(a.add_child(&a), Err(UsageError::AlreadyHasParent)));
    a.add_child(&c).unwrap();
    assert!(matches!(b.add_child(&c), Err(UsageError::AlreadyHasParent)));

    spawn_activate(&clock, &a, &layer);
    let again = spawn_activate(&clock, &a, &layer);
    run_frames(&clock, &mut backend, 2);
    assert!(matches!(
        *again.lock(),
        Some(Err(ActivateError::Usage(UsageError::AlreadyActivated)))
    ));

    // An object belongs to the clock of the layer that activated it.
    let other_clock = FrameClock::new(&ClockConfig::default());
    let mismatch = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&mismatch);
    let foreign_point = other_clock.timing_points().update();
    let subject = a.clone();
    Coroutine::start(&clock, move |co| async move {
        let _ = co;
        *slot.lock() = Some(subject.terminate(&foreign_point).await);
        Ok(())
    })
    .unwrap();
    run_frames(&clock, &mut backend, 1);
    assert!(matches!(
        *mismatch.lock(),
        Some(Err(UsageError::ContextMismatch))
    ));
}

/// Test: lights go through the same lifecycle against the clock's own
/// light set, visible to the frame after registration.
#[test]
fn test_light_round_trip() {
    let clock = FrameClock::new(&ClockConfig::default());
    let mut backend = NullBackend::new();

    let light = Light::new();
    light.set_color([1.0, 0.5, 0.0, 1.0]);
    let subject = light.clone();
    Coroutine::start(&clock, move |co| async move {
        subject.activate(&co.points().update()).await?;
        Ok(())
    })
    .unwrap();
    assert_eq!(clock.light_count(), 0);
    run_frames(&clock, &mut backend, 2);
    assert_eq!(clock.light_count(), 1);
    assert_eq!(light.state(), LifeState::Alive);
    assert_eq!(clock.lights()[0].color(), [1.0, 0.5, 0.0, 1.0]);

    let subject = light.clone();
    Coroutine::start(&clock, move |co| async move {
        subject.terminate(&co.points().update()).await?;
        Ok(())
    })
    .unwrap();
    run_frames(&clock, &mut backend, 2);
    assert_eq!(light.state(), LifeState::Dead);
    assert_eq!(clock.light_count(), 0);
}
