// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

mod assets;
mod shader;

pub use assets::{AssetError, MeshData, TextureData, Vertex};
pub use shader::{read_shader_bytes, ShaderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area drawable can't back a swapchain; renderers idle until it grows.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Window-system events after platform decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSignal {
    Resize { width: u32, height: u32 },
    Minimize,
    Restore,
    Close,
    Quit,
}

pub trait Renderer {
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_paused(&mut self, _paused: bool) {}

    /// Close and Quit are owner decisions (drop the renderer / stop the loop),
    /// so they're no-ops here.
    fn handle_signal(&mut self, signal: WindowSignal) -> Result<()> {
        match signal {
            WindowSignal::Resize { width, height } => self.resize(RenderSize { width, height }),
            WindowSignal::Minimize => {
                self.set_paused(true);
                Ok(())
            }
            WindowSignal::Restore => {
                self.set_paused(false);
                Ok(())
            }
            WindowSignal::Close | WindowSignal::Quit => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        sizes: Vec<RenderSize>,
        paused: bool,
        clear: [f32; 4],
    }

    impl Renderer for Probe {
        fn resize(&mut self, size: RenderSize) -> Result<()> {
            self.sizes.push(size);
            Ok(())
        }
        fn render(&mut self) -> Result<()> {
            Ok(())
        }
        fn set_clear_color(&mut self, rgba: [f32; 4]) {
            self.clear = rgba;
        }
        fn set_paused(&mut self, paused: bool) {
            self.paused = paused;
        }
    }

    #[test]
    fn signals_route_to_renderer_hooks() {
        let mut p = Probe::default();
        p.handle_signal(WindowSignal::Resize {
            width: 640,
            height: 480,
        })
        .unwrap();
        p.handle_signal(WindowSignal::Minimize).unwrap();
        assert!(p.paused);
        p.handle_signal(WindowSignal::Restore).unwrap();
        assert!(!p.paused);
        p.handle_signal(WindowSignal::Close).unwrap();
        p.set_clear_color([1.0, 0.0, 0.0, 1.0]);

        assert_eq!(p.sizes, vec![RenderSize::new(640, 480)]);
        assert_eq!(p.clear[0], 1.0);
    }

    #[test]
    fn empty_sizes() {
        assert!(RenderSize::new(0, 10).is_empty());
        assert!(RenderSize::new(10, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }
}
