// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue. Re-exports `winit` and turns its window events into
//! the backend-neutral [`WindowSignal`]s renderers understand.

pub use winit;

use vigor_render::WindowSignal;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Per-window decoder. winit has no dedicated minimize event, so a window is
/// treated as minimized while it is zero-sized or reported occluded.
#[derive(Debug, Default)]
pub struct SignalTranslator {
    zero_sized: bool,
    occluded: bool,
}

impl SignalTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_minimized(&self) -> bool {
        self.zero_sized || self.occluded
    }

    /// Signals for one event, in the order they should be applied.
    pub fn translate(&mut self, event: &WindowEvent) -> Vec<WindowSignal> {
        let was_minimized = self.is_minimized();
        let mut out = Vec::new();

        match event {
            WindowEvent::CloseRequested => {
                out.push(WindowSignal::Close);
                return out;
            }
            WindowEvent::Resized(size) => {
                self.zero_sized = size.width == 0 || size.height == 0;
                if !self.zero_sized {
                    out.push(WindowSignal::Resize {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::Occluded(occluded) => self.occluded = *occluded,
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape)
                {
                    out.push(WindowSignal::Quit);
                }
                return out;
            }
            _ => return out,
        }

        match (was_minimized, self.is_minimized()) {
            (false, true) => {
                tracing::debug!("window minimized");
                out.insert(0, WindowSignal::Minimize);
            }
            (true, false) => {
                tracing::debug!("window restored");
                out.insert(0, WindowSignal::Restore);
            }
            _ => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    fn resized(w: u32, h: u32) -> WindowEvent {
        WindowEvent::Resized(PhysicalSize::new(w, h))
    }

    #[test]
    fn plain_resize() {
        let mut t = SignalTranslator::new();
        assert_eq!(
            t.translate(&resized(800, 600)),
            vec![WindowSignal::Resize {
                width: 800,
                height: 600
            }]
        );
    }

    #[test]
    fn zero_size_minimizes_and_growth_restores() {
        let mut t = SignalTranslator::new();
        assert_eq!(t.translate(&resized(0, 0)), vec![WindowSignal::Minimize]);
        assert!(t.is_minimized());
        assert!(t.translate(&resized(0, 0)).is_empty());
        assert_eq!(
            t.translate(&resized(1024, 768)),
            vec![
                WindowSignal::Restore,
                WindowSignal::Resize {
                    width: 1024,
                    height: 768
                }
            ]
        );
        assert!(!t.is_minimized());
    }

    #[test]
    fn occlusion_toggles_pause() {
        let mut t = SignalTranslator::new();
        assert_eq!(
            t.translate(&WindowEvent::Occluded(true)),
            vec![WindowSignal::Minimize]
        );
        assert_eq!(
            t.translate(&WindowEvent::Occluded(false)),
            vec![WindowSignal::Restore]
        );
    }

    #[test]
    fn unoccluded_but_still_zero_sized_stays_minimized() {
        let mut t = SignalTranslator::new();
        t.translate(&WindowEvent::Occluded(true));
        t.translate(&resized(0, 0));
        assert!(t.translate(&WindowEvent::Occluded(false)).is_empty());
        assert!(t.is_minimized());
    }

    #[test]
    fn close_and_unrelated_events() {
        let mut t = SignalTranslator::new();
        assert_eq!(
            t.translate(&WindowEvent::CloseRequested),
            vec![WindowSignal::Close]
        );
        assert!(t.translate(&WindowEvent::Focused(true)).is_empty());
        assert!(t.translate(&WindowEvent::RedrawRequested).is_empty());
    }
}
