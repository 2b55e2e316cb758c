//! # Cadence
//!
//! A real-time frame-loop cooperative scheduler. A [`FrameClock`] drives
//! nine ordered timing points once per tick; user logic spans frames as
//! coroutines whose only suspension points are awaits on those timing
//! points, and every schedulable entity (scene objects, object layers,
//! pipeline stages, lights) obeys one five-state lifecycle whose
//! transitions line up with the frame boundary.
//!
//! No general-purpose async runtime is involved: the clock carries its own
//! single-threaded executor, and suspended waits live in pooled,
//! token-guarded slots so the steady state allocates nothing per
//! suspension.
//!
//! ```no_run
//! use cadence::{ClockConfig, Coroutine, FrameClock, FrameTiming, NullBackend};
//!
//! let clock = FrameClock::new(&ClockConfig::default());
//! Coroutine::start(&clock, |co| async move {
//!     while co.can_run() {
//!         co.next(FrameTiming::Update).await?;
//!         // per-frame logic here
//!     }
//!     Ok(())
//! })
//! .unwrap();
//!
//! let mut backend = NullBackend::new();
//! while clock.tick(&mut backend).unwrap() {}
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod clock;
mod config;
mod coroutine;
mod error;
mod layer;
mod lifecycle;
mod light;
mod object;
mod pipeline;
mod point;
mod policy;
mod render;
mod task;
mod timing;
mod waits;

pub use clock::FrameClock;
pub use config::{ClockConfig, DeltaMode, ManualTime, SystemTimeSource, TimeSource};
pub use coroutine::{Coroutine, CoroutineHost, CoroutineState, ReservationKey};
pub use error::{
    ActivateError, ConfigError, CoroutineError, HookError, HookResult, TickError, UsageError,
    WaitError,
};
pub use layer::ObjectLayer;
pub use lifecycle::{HookFuture, LifeState};
pub use light::Light;
pub use object::SceneObject;
pub use pipeline::{ApplyStep, Stage, StageCore};
pub use point::{NextTiming, TimingPoint, TimingPoints};
pub use policy::ErrorPolicy;
pub use render::{NullBackend, RenderBackend, RenderContext, RenderTargetId};
pub use timing::{CurrentTiming, FrameTiming};

pub use cadence_core::{CancelSource, CancelToken, SubscriptionId};
