//! # Frame Timings
//!
//! The named phases of one tick, in their fixed total order, plus the
//! globally readable "where is the loop right now" value.

/// A phase of one frame tick.
///
/// The derived ordering is the execution order within a tick. `EndOfFrame`
/// is an internal marker used to implement frame-boundary waits; it carries
/// no pipeline work of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameTiming {
    /// Start of the tick: shutdown checks and buffered-add application.
    FrameInitializing,
    /// First user phase, before the main update.
    EarlyUpdate,
    /// The main update phase.
    Update,
    /// After the main update, before rendering begins.
    LateUpdate,
    /// The frame buffer has been cleared; rendering has not started.
    BeforeRendering,
    /// Pipeline stages execute against the render backend.
    Rendering,
    /// Rendering has finished for this tick.
    AfterRendering,
    /// End of the tick's user phases; buffered removes apply here.
    FrameFinalizing,
    /// Internal frame-boundary marker. Runs after every other phase.
    EndOfFrame,
}

impl FrameTiming {
    /// Every timing in execution order.
    pub const ALL: [Self; 9] = [
        Self::FrameInitializing,
        Self::EarlyUpdate,
        Self::Update,
        Self::LateUpdate,
        Self::BeforeRendering,
        Self::Rendering,
        Self::AfterRendering,
        Self::FrameFinalizing,
        Self::EndOfFrame,
    ];

    /// Ordinal of this timing within [`FrameTiming::ALL`].
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this is the internal frame-boundary marker.
    #[inline]
    #[must_use]
    pub fn is_internal(self) -> bool {
        matches!(self, Self::EndOfFrame)
    }
}

/// Where the frame loop currently is.
///
/// Reads as [`CurrentTiming::OutOfLoop`] between ticks and from any thread
/// other than the clock's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentTiming {
    /// Not inside a tick.
    #[default]
    OutOfLoop,
    /// Inside a tick, at the given phase.
    At(FrameTiming),
}

impl CurrentTiming {
    /// The current phase, if inside a tick.
    #[inline]
    #[must_use]
    pub fn timing(self) -> Option<FrameTiming> {
        match self {
            Self::OutOfLoop => None,
            Self::At(timing) => Some(timing),
        }
    }

    /// Whether the loop is between ticks.
    #[inline]
    #[must_use]
    pub fn is_out_of_loop(self) -> bool {
        matches!(self, Self::OutOfLoop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_are_totally_ordered() {
        for pair in FrameTiming::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(FrameTiming::FrameInitializing.index(), 0);
        assert_eq!(FrameTiming::EndOfFrame.index(), 8);
    }

    #[test]
    fn test_only_end_of_frame_is_internal() {
        let internal: Vec<_> = FrameTiming::ALL
            .iter()
            .filter(|t| t.is_internal())
            .collect();
        assert_eq!(internal, vec![&FrameTiming::EndOfFrame]);
    }
}
