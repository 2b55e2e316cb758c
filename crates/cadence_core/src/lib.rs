//! # Cadence Core
//!
//! Allocation-conscious primitives underneath the Cadence frame scheduler:
//!
//! - [`SlotPool`]: a generational slot arena. Handles carry a 16-bit token;
//!   a stale handle can never touch a recycled slot.
//! - [`BufferedList`]: a deferred-mutation collection. Adds and removes are
//!   buffered and merged at an explicit apply step, so iteration never races
//!   with mutation requested mid-frame.
//! - [`EventSource`]: a plain subscriber list for synchronous listeners.
//! - [`CancelSource`] / [`CancelToken`]: a one-shot cooperative cancellation
//!   flag.
//!
//! Nothing in this crate knows about frames or timing points; the `cadence`
//! crate builds those on top.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod buffered;
mod cancel;
mod event;
mod pool;

pub use buffered::BufferedList;
pub use cancel::{CancelSource, CancelToken};
pub use event::{EventSource, HookError, HookResult, SubscriptionId};
pub use pool::{SlotId, SlotPool};
