//! # Render Seam
//!
//! The narrow contract toward the graphics layer. The scheduler never
//! encodes GPU commands itself; during the `Rendering` phase it hands
//! stages a [`RenderContext`] wrapping whatever backend the host supplied.

use crate::clock::FrameClock;
use crate::light::Light;

/// Identifies a render target to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

/// Capability contract the host's graphics layer implements.
///
/// Invoked only from `BeforeRendering` (clear) and `Rendering` phase code
/// paths, on the clock's owning thread.
pub trait RenderBackend: Send {
    /// Current frame buffer size in pixels.
    fn frame_buffer_size(&self) -> (u32, u32);
    /// Clears the frame buffer.
    fn clear(&mut self);
    /// Binds a render target for subsequent draws.
    fn bind(&mut self, target: RenderTargetId);
    /// Draws `index_count` indices against the bound target.
    fn draw(&mut self, index_count: u32);
}

/// A backend that discards everything, counting calls.
///
/// Useful headless and in tests.
#[derive(Debug)]
pub struct NullBackend {
    size: (u32, u32),
    clears: u32,
    binds: u32,
    draws: u32,
}

impl NullBackend {
    /// Creates a backend reporting the given frame buffer size.
    #[must_use]
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            clears: 0,
            binds: 0,
            draws: 0,
        }
    }

    /// Creates a backend with a 1280x720 frame buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(1280, 720)
    }

    /// Number of `clear` calls seen.
    #[must_use]
    pub fn clears(&self) -> u32 {
        self.clears
    }

    /// Number of `bind` calls seen.
    #[must_use]
    pub fn binds(&self) -> u32 {
        self.binds
    }

    /// Number of `draw` calls seen.
    #[must_use]
    pub fn draws(&self) -> u32 {
        self.draws
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for NullBackend {
    fn frame_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn bind(&mut self, _target: RenderTargetId) {
        self.binds += 1;
    }

    fn draw(&mut self, index_count: u32) {
        let _ = index_count;
        self.draws += 1;
    }
}

/// Everything a pipeline stage sees while executing.
pub struct RenderContext<'a> {
    backend: &'a mut dyn RenderBackend,
    clock: &'a FrameClock,
    lights: Vec<Light>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        backend: &'a mut dyn RenderBackend,
        clock: &'a FrameClock,
        lights: Vec<Light>,
    ) -> Self {
        Self {
            backend,
            clock,
            lights,
        }
    }

    /// The graphics backend for this frame.
    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        self.backend
    }

    /// The driving clock.
    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        self.clock
    }

    /// The lights live at the start of this frame.
    #[must_use]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_counts_calls() {
        let mut backend = NullBackend::with_size(64, 64);
        backend.clear();
        backend.bind(RenderTargetId(3));
        backend.draw(36);
        backend.draw(12);
        assert_eq!(backend.frame_buffer_size(), (64, 64));
        assert_eq!(backend.clears(), 1);
        assert_eq!(backend.binds(), 1);
        assert_eq!(backend.draws(), 2);
    }
}
